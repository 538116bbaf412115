//! Frame ownership and the producer/consumer handoff.
//!
//! - `Frame`: an owned RGB pixel buffer tagged with its arrival order.
//! - `AnnotatedFrame`: the composited output handed to the downstream callback.
//! - `BoundedChannel` / `FrameChannel`: capacity-limited FIFO between the capture
//!   thread and the processing thread. When full, the oldest unread item is
//!   evicted so the producer never stalls on a slow consumer.
//!
//! Frames move by value: producer -> channel -> consumer. Nothing keeps a frame
//! after handing it downstream, so `Frame` deliberately does not implement `Clone`.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::classify::LabeledRegion;

/// Default handoff capacity (frames).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Owned RGB frame. Pixels are never mutated after construction.
pub struct Frame {
    image: RgbImage,
    /// Arrival order assigned by the capture source.
    pub sequence: u64,
    captured_at: Instant,
}

// Explicitly NOT implementing Clone: ownership transfers down the pipeline.

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Time since the source produced this frame.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Composited output of one processed frame.
pub struct AnnotatedFrame {
    /// Sequence of the source frame this output was rendered from.
    pub sequence: u64,
    /// Black canvas revealing only the kept regions, with outlines and labels.
    pub image: RgbImage,
    /// Regions that were rendered, in render order.
    pub regions: Vec<LabeledRegion>,
}

// ----------------------------------------------------------------------------
// BoundedChannel: overwrite-on-full handoff
// ----------------------------------------------------------------------------

struct ChannelState<T> {
    items: VecDeque<T>,
    closed: bool,
    evicted: u64,
    wakeups: u64,
}

/// Bounded FIFO with blocking receive and drop-oldest overflow.
///
/// All state lives behind one mutex; the condition variable covers the
/// empty -> non-empty transition. Emptiness is re-tested under the lock after
/// every wake-up, so a push that lands between a waiter's check and its
/// suspension is never missed.
///
/// `close()` is the cancellation signal: it wakes every waiter, refuses further
/// pushes, and lets receivers drain what is already queued.
pub struct BoundedChannel<T> {
    state: Mutex<ChannelState<T>>,
    ready: Condvar,
    capacity: usize,
}

/// The producer/consumer handoff used by the pipeline.
pub type FrameChannel = BoundedChannel<Frame>;

impl<T> BoundedChannel<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("channel capacity must be greater than zero"));
        }
        Ok(Self {
            state: Mutex::new(ChannelState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
                wakeups: 0,
            }),
            ready: Condvar::new(),
            capacity,
        })
    }

    // Every mutation leaves the queue consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert at the tail, evicting the head if the channel is full.
    ///
    /// Returns `false` (and drops `item`) once the channel has been closed.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        while state.items.len() >= self.capacity {
            state.items.pop_front();
            state.evicted += 1;
            log::debug!("channel full ({}), evicted oldest unread item", self.capacity);
        }
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Remove and return the head item, waiting while the channel is empty.
    ///
    /// Returns `None` only after `close()`, once every queued item has been taken.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.wakeups += 1;
        }
    }

    /// Non-blocking variant of `pop_blocking`.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Close the channel and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            log::debug!("channel closed with {} item(s) pending", state.items.len());
        }
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items discarded by overflow eviction since creation.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Times a blocked receiver was woken, including wake-ups that found nothing.
    pub fn wakeups(&self) -> u64 {
        self.lock().wakeups
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
