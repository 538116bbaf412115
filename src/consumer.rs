//! Consumer thread: drain the channel, process each frame, hand it downstream.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::{AnnotatedFrame, FrameChannel};
use crate::lifecycle::{StopSignal, Worker};
use crate::process::FrameProcessor;

/// Downstream sink, invoked on the consumer thread once per processed frame.
pub type FrameCallback = Box<dyn FnMut(AnnotatedFrame) + Send>;

pub struct FrameConsumer {
    parts: Option<(FrameProcessor, FrameCallback)>,
    channel: Arc<FrameChannel>,
    processed: Arc<AtomicU64>,
    worker: Option<Worker>,
}

impl FrameConsumer {
    pub fn new(processor: FrameProcessor, channel: Arc<FrameChannel>, on_frame: FrameCallback) -> Self {
        Self {
            parts: Some((processor, on_frame)),
            channel,
            processed: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        let (mut processor, mut on_frame) = self
            .parts
            .take()
            .ok_or_else(|| anyhow!("consumer already started"))?;
        let stop = StopSignal::new();
        let stop_thread = stop.clone();
        let channel = self.channel.clone();
        let processed = self.processed.clone();

        let worker = Worker::spawn("consumer", stop, move || {
            while !stop_thread.is_requested() {
                let Some(frame) = channel.pop_blocking() else {
                    log::info!("consumer: channel closed and drained");
                    break;
                };
                let sequence = frame.sequence;
                let queued_for = frame.age();
                match processor.process(frame) {
                    Ok(annotated) => {
                        log::debug!(
                            "frame {}: {} region(s), {} ms after capture",
                            annotated.sequence,
                            annotated.regions.len(),
                            queued_for.as_millis()
                        );
                        on_frame(annotated);
                        processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::error!("consumer failed on frame {}: {:#}", sequence, e);
                        channel.close();
                        break;
                    }
                }
            }
            log::info!(
                "consumer done: {} frame(s) processed",
                processed.load(Ordering::Relaxed)
            );
        })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Request stop, wake the thread if it is waiting on an empty channel, and join.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.as_mut() else {
            return Ok(());
        };
        self.channel.close();
        worker.stop()
    }

    /// Wait for the consumer to exit on its own (channel closed and drained).
    pub fn join(&mut self) -> Result<()> {
        match self.worker.as_mut() {
            Some(worker) => worker.join(),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, Worker::is_finished)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        // The thread may be parked on an empty channel; close it before joining.
        if let Err(e) = self.stop() {
            log::error!("consumer shutdown: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use std::time::Duration;

    fn gray_frame(seq: u64, w: u32, h: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(w, h, Rgb([60, 60, 60])), seq)
    }

    fn recorder() -> (FrameCallback, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: FrameCallback = Box::new(move |frame: AnnotatedFrame| {
            sink.lock().unwrap().push(frame.sequence);
        });
        (callback, seen)
    }

    #[test]
    fn drains_queue_in_order_then_exits_on_close() {
        let channel = Arc::new(FrameChannel::new(8).unwrap());
        for seq in 0..4 {
            channel.push(gray_frame(seq, 16, 16));
        }
        channel.close();

        let (callback, seen) = recorder();
        let mut consumer = FrameConsumer::new(FrameProcessor::default(), channel, callback);
        consumer.start().unwrap();
        consumer.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(consumer.processed(), 4);
    }

    #[test]
    fn stop_wakes_an_idle_consumer() {
        let channel = Arc::new(FrameChannel::new(2).unwrap());
        let (callback, seen) = recorder();
        let mut consumer = FrameConsumer::new(FrameProcessor::default(), channel, callback);
        consumer.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        consumer.stop().unwrap();
        assert!(consumer.is_finished());
        assert!(seen.lock().unwrap().is_empty());
        consumer.stop().unwrap();
    }

    #[test]
    fn dropping_a_started_consumer_does_not_hang() {
        let channel = Arc::new(FrameChannel::new(2).unwrap());
        let (callback, _seen) = recorder();
        let mut consumer = FrameConsumer::new(FrameProcessor::default(), channel.clone(), callback);
        consumer.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(consumer);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "drop did not return"
        );
        assert!(channel.is_closed());
    }

    #[test]
    fn processing_error_closes_channel() {
        let channel = Arc::new(FrameChannel::new(8).unwrap());
        channel.push(gray_frame(0, 16, 16));
        channel.push(gray_frame(1, 24, 24));
        channel.push(gray_frame(2, 16, 16));

        let (callback, seen) = recorder();
        let mut consumer = FrameConsumer::new(FrameProcessor::default(), channel.clone(), callback);
        consumer.start().unwrap();
        consumer.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert!(channel.is_closed());
        assert!(!channel.push(gray_frame(3, 16, 16)));
    }
}
