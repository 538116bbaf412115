//! Capture sources and the paced producer.
//!
//! This module provides the sources frames are read from:
//! - Synthetic scenes (`stub://`), for demos and tests
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! and `PacedProducer`, the thread that reads a source at its declared rate and
//! pushes frames into the handoff channel.
//!
//! A source reports end of stream as `Ok(None)`. That is a normal terminal
//! signal, not an error, and is never retried.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub mod file_ffmpeg;
pub mod producer;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use file::open_file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::FfmpegFileSource;
pub use producer::PacedProducer;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Counters reported by a source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
}

/// A video frame source driven by the producer thread.
pub trait CaptureSource: Send {
    /// Human-readable identifier used in logs.
    fn describe(&self) -> String;

    /// Read the next frame, `Ok(None)` at end of stream.
    fn read_next(&mut self) -> Result<Option<Frame>>;

    /// Frame rate declared by the source, if known and non-zero.
    fn declared_frame_rate(&self) -> Option<f64>;

    fn stats(&self) -> SourceStats;
}

/// Open a capture source from its identifier.
///
/// - `stub://<scene>[?frames=N&fps=F&width=W&height=H&seed=S]`: synthetic scene
/// - a local path: video file (requires the ingest-file-ffmpeg feature)
///
/// Any other URL scheme is rejected.
pub fn open_source(identifier: &str) -> Result<Box<dyn CaptureSource>> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(anyhow!("capture source identifier is empty"));
    }
    if identifier.starts_with("stub://") {
        let config = SyntheticConfig::from_url(identifier)?;
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if let Some((scheme, _)) = identifier.split_once("://") {
        return Err(anyhow!("unsupported capture source scheme '{}'", scheme));
    }
    open_file(identifier)
}
