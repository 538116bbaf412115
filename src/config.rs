use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::DEFAULT_CHANNEL_CAPACITY;
use crate::process::MIN_REGION_AREA;
use crate::render::DEFAULT_FONT_PATH;
use crate::segment::{DEFAULT_FOREGROUND_THRESHOLD, DEFAULT_LEARNING_RATE};

const DEFAULT_SOURCE: &str = "stub://walkers";
const DEFAULT_OUTPUT_EVERY_N: u64 = 1;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    source: Option<String>,
    buffer_capacity: Option<usize>,
    min_region_area: Option<f64>,
    font_path: Option<PathBuf>,
    output: Option<OutputConfigFile>,
    segmentation: Option<SegmentationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    every_n: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SegmentationConfigFile {
    threshold: Option<f32>,
    learning_rate: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture source identifier (`stub://...` or a local video path).
    pub source: String,
    pub buffer_capacity: usize,
    pub min_region_area: f64,
    /// Label font. Labels are skipped when it cannot be loaded.
    pub font_path: Option<PathBuf>,
    pub output: OutputSettings,
    pub segmentation: SegmentationSettings,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Write annotated frames here as PNG; `None` disables writing.
    pub dir: Option<PathBuf>,
    /// Write every Nth processed frame.
    pub every_n: u64,
}

#[derive(Debug, Clone)]
pub struct SegmentationSettings {
    pub threshold: f32,
    pub learning_rate: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Load from `SILHOUETTE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SILHOUETTE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let source = file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let output = OutputSettings {
            dir: file.output.as_ref().and_then(|output| output.dir.clone()),
            every_n: file
                .output
                .as_ref()
                .and_then(|output| output.every_n)
                .unwrap_or(DEFAULT_OUTPUT_EVERY_N),
        };
        let segmentation = SegmentationSettings {
            threshold: file
                .segmentation
                .as_ref()
                .and_then(|seg| seg.threshold)
                .unwrap_or(DEFAULT_FOREGROUND_THRESHOLD),
            learning_rate: file
                .segmentation
                .as_ref()
                .and_then(|seg| seg.learning_rate)
                .unwrap_or(DEFAULT_LEARNING_RATE),
        };
        Self {
            source,
            buffer_capacity: file.buffer_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            min_region_area: file.min_region_area.unwrap_or(MIN_REGION_AREA),
            font_path: Some(
                file.font_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_PATH)),
            ),
            output,
            segmentation,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("SILHOUETTE_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(capacity) = std::env::var("SILHOUETTE_BUFFER_CAPACITY") {
            self.buffer_capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("SILHOUETTE_BUFFER_CAPACITY must be a positive integer"))?;
        }
        if let Ok(area) = std::env::var("SILHOUETTE_MIN_AREA") {
            self.min_region_area = area
                .trim()
                .parse()
                .map_err(|_| anyhow!("SILHOUETTE_MIN_AREA must be a number"))?;
        }
        if let Ok(dir) = std::env::var("SILHOUETTE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output.dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(font) = std::env::var("SILHOUETTE_FONT") {
            self.font_path = match font.trim() {
                "" | "none" => None,
                path => Some(PathBuf::from(path)),
            };
        }
        Ok(())
    }

    /// Check the settings. Called by `load`; callers that edit a loaded
    /// config (CLI overrides) call it again.
    pub fn validate(&self) -> Result<()> {
        let source = self.source.trim();
        if source.is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if crate::ingest::file::is_local_file_path(source) && !Path::new(source).is_file() {
            return Err(anyhow!("video file '{}' does not exist", source));
        }
        if self.buffer_capacity == 0 {
            return Err(anyhow!("buffer_capacity must be greater than zero"));
        }
        if !self.min_region_area.is_finite() || self.min_region_area < 0.0 {
            return Err(anyhow!("min_region_area must be a non-negative number"));
        }
        if self.output.every_n == 0 {
            return Err(anyhow!("output.every_n must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.segmentation.learning_rate) {
            return Err(anyhow!("segmentation.learning_rate must be within 0..=1"));
        }
        if !(0.0..=255.0).contains(&self.segmentation.threshold) {
            return Err(anyhow!("segmentation.threshold must be within 0..=255"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.source, DEFAULT_SOURCE);
        assert_eq!(cfg.buffer_capacity, 10);
        assert_eq!(cfg.min_region_area, 500.0);
        assert_eq!(cfg.output.every_n, 1);
        assert!(cfg.output.dir.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_capacity_and_missing_file() {
        let mut cfg = PipelineConfig::default();
        cfg.buffer_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.source = "/missing/clip.mp4".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let mut cfg = PipelineConfig::default();
        cfg.min_region_area = -1.0;
        assert!(cfg.validate().is_err());
    }
}
