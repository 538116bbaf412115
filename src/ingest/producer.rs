//! Paced producer: capture -> push -> sleep out the rest of the frame interval.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::CaptureSource;
use crate::frame::FrameChannel;
use crate::lifecycle::{StopSignal, Worker};

/// Target spacing between frames, `None` when the rate is unknown or zero.
pub fn frame_interval(fps: Option<f64>) -> Option<Duration> {
    let fps = fps?;
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(1.0 / fps))
}

/// Time left in the interval after `elapsed` was spent capturing; never negative.
pub fn pacing_pause(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Reads a capture source on its own thread at the source's declared rate.
///
/// End of stream (or a read failure) ends the thread and closes the channel,
/// so the consumer drains what is queued and then winds down too.
pub struct PacedProducer {
    source: Option<Box<dyn CaptureSource>>,
    channel: Arc<FrameChannel>,
    worker: Option<Worker>,
}

impl PacedProducer {
    pub fn new(source: Box<dyn CaptureSource>, channel: Arc<FrameChannel>) -> Self {
        Self {
            source: Some(source),
            channel,
            worker: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| anyhow!("producer already started"))?;
        let interval = frame_interval(source.declared_frame_rate());
        match interval {
            Some(interval) => log::info!(
                "producer pacing {} at {:.1} ms/frame",
                source.describe(),
                interval.as_secs_f64() * 1000.0
            ),
            None => log::info!("producer reading {} unpaced (no declared fps)", source.describe()),
        }

        let stop = StopSignal::new();
        let stop_thread = stop.clone();
        let channel = self.channel.clone();
        let worker = Worker::spawn("producer", stop, move || {
            match run(source.as_mut(), &channel, &stop_thread, interval) {
                Ok(()) => {}
                Err(e) => log::error!("producer failed: {:#}", e),
            }
            log::info!(
                "producer done: {} frame(s) captured from {}",
                source.stats().frames_captured,
                source.describe()
            );
            channel.close();
        })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Request stop and join. Idempotent; a never-started producer is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        match self.worker.as_mut() {
            Some(worker) => worker.stop(),
            None => Ok(()),
        }
    }

    /// Wait for the producer to finish on its own (end of stream).
    pub fn join(&mut self) -> Result<()> {
        match self.worker.as_mut() {
            Some(worker) => worker.join(),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, Worker::is_finished)
    }
}

fn run(
    source: &mut dyn CaptureSource,
    channel: &FrameChannel,
    stop: &StopSignal,
    interval: Option<Duration>,
) -> Result<()> {
    while !stop.is_requested() {
        let started = Instant::now();

        let Some(frame) = source.read_next()? else {
            log::info!("producer reached end of stream");
            return Ok(());
        };
        let sequence = frame.sequence;
        if !channel.push(frame) {
            log::debug!("producer: channel closed, dropping frame {}", sequence);
            return Ok(());
        }
        log::trace!("producer pushed frame {}", sequence);

        if let Some(interval) = interval {
            if stop.sleep(pacing_pause(interval, started.elapsed())) {
                break;
            }
        }
    }
    log::debug!("producer observed stop request");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::ingest::SourceStats;
    use image::RgbImage;

    struct Scripted {
        remaining: Option<u64>,
        next: u64,
        fps: Option<f64>,
        fail_at: Option<u64>,
    }

    impl Scripted {
        fn finite(frames: u64) -> Self {
            Self {
                remaining: Some(frames),
                next: 0,
                fps: None,
                fail_at: None,
            }
        }
    }

    impl CaptureSource for Scripted {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn read_next(&mut self) -> Result<Option<Frame>> {
            if self.fail_at == Some(self.next) {
                return Err(anyhow!("decoder exploded"));
            }
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
            }
            let frame = Frame::new(RgbImage::new(4, 4), self.next);
            self.next += 1;
            Ok(Some(frame))
        }

        fn declared_frame_rate(&self) -> Option<f64> {
            self.fps
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.next,
            }
        }
    }

    #[test]
    fn interval_from_fps() {
        assert_eq!(frame_interval(Some(25.0)), Some(Duration::from_millis(40)));
        assert_eq!(frame_interval(Some(0.0)), None);
        assert_eq!(frame_interval(Some(f64::NAN)), None);
        assert_eq!(frame_interval(None), None);
    }

    #[test]
    fn pause_never_negative() {
        let interval = Duration::from_millis(40);
        assert_eq!(pacing_pause(interval, Duration::from_millis(15)), Duration::from_millis(25));
        assert_eq!(pacing_pause(interval, Duration::from_millis(90)), Duration::ZERO);
    }

    #[test]
    fn end_of_stream_ends_thread_and_closes_channel() {
        let channel = Arc::new(FrameChannel::new(8).unwrap());
        let mut producer = PacedProducer::new(Box::new(Scripted::finite(3)), channel.clone());
        producer.start().unwrap();
        producer.join().unwrap();

        assert!(producer.is_finished());
        assert!(channel.is_closed());
        let sequences: Vec<u64> = std::iter::from_fn(|| channel.pop_blocking())
            .map(|f| f.sequence)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn stop_interrupts_pacing_sleep() {
        let channel = Arc::new(FrameChannel::new(2).unwrap());
        let source = Scripted {
            remaining: None,
            next: 0,
            fps: Some(0.2),
            fail_at: None,
        };
        let mut producer = PacedProducer::new(Box::new(source), channel.clone());
        producer.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        producer.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(producer.is_finished());
        producer.stop().unwrap();
    }

    #[test]
    fn read_failure_is_terminal() {
        let channel = Arc::new(FrameChannel::new(8).unwrap());
        let source = Scripted {
            fail_at: Some(2),
            ..Scripted::finite(10)
        };
        let mut producer = PacedProducer::new(Box::new(source), channel.clone());
        producer.start().unwrap();
        producer.join().unwrap();

        assert!(channel.is_closed());
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn start_twice_is_rejected() {
        let channel = Arc::new(FrameChannel::new(1).unwrap());
        let mut producer = PacedProducer::new(Box::new(Scripted::finite(0)), channel);
        producer.start().unwrap();
        assert!(producer.start().is_err());
        producer.stop().unwrap();
    }
}
