//! Local file frame source.
//!
//! The file source is responsible for:
//! - Refusing anything that is not an existing local path
//! - Decoding video frames in-memory to RGB
//! - Reporting the container's declared frame rate for pacing
//! - Signalling end of stream as `Ok(None)`
//!
//! Decoding is provided by FFmpeg behind the ingest-file-ffmpeg feature.

use anyhow::{anyhow, Result};
use std::path::Path;

use super::CaptureSource;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;

/// Open a local video file. Failure here is fatal to pipeline construction.
pub fn open_file(path: &str) -> Result<Box<dyn CaptureSource>> {
    if !is_local_file_path(path) {
        return Err(anyhow!(
            "file ingestion only supports local paths (no URL schemes)"
        ));
    }
    if !Path::new(path).is_file() {
        return Err(anyhow!("video file '{}' does not exist", path));
    }
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        let source = FfmpegFileSource::open(path)?;
        log::info!(
            "FileSource: opened {} (ffmpeg, declared fps {:?})",
            path,
            source.declared_frame_rate()
        );
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!(
            "cannot open '{}': file ingestion requires the ingest-file-ffmpeg feature",
            path
        ))
    }
}

pub(crate) fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
