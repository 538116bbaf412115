//! silhouetted - silhouette pipeline daemon
//!
//! This daemon:
//! 1. Opens a capture source (synthetic `stub://` scene or a local video file)
//! 2. Reads it at the source's declared frame rate on a producer thread
//! 3. Segments, splits, classifies and composites each frame on a consumer thread
//! 4. Logs per-frame label counts and optionally writes annotated frames as PNG
//! 5. Runs until the source ends or Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use silhouette_pipeline::{AnnotatedFrame, FrameCallback, Pipeline, PipelineConfig};

#[path = "../ui.rs"]
mod ui;

const STATUS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(
    name = "silhouetted",
    about = "Isolate, split and label moving silhouettes in a video stream"
)]
struct Args {
    /// Config file (JSON, or TOML by .toml extension)
    #[arg(long, env = "SILHOUETTE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Capture source: stub://<scene>[?frames=N&fps=F] or a local video path
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Handoff buffer capacity in frames
    #[arg(long, value_name = "N")]
    capacity: Option<usize>,

    /// Write annotated frames into this directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Write every Nth annotated frame
    #[arg(long, value_name = "N")]
    every: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = PipelineConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(capacity) = args.capacity {
        config.buffer_capacity = capacity;
    }
    if let Some(dir) = args.output_dir {
        config.output.dir = Some(dir);
    }
    if let Some(every) = args.every {
        config.output.every_n = every;
    }
    config.validate()?;

    if let Some(dir) = &config.output.dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        log::info!(
            "writing every {} annotated frame(s) to {}",
            config.output.every_n,
            dir.display()
        );
    }

    let sink = frame_sink(config.output.dir.clone(), config.output.every_n);
    let mut pipeline = Pipeline::new(&config, sink)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let ui = ui::Ui::new(ui::UiMode::parse(&args.ui), std::io::stderr().is_terminal());
    pipeline.start()?;
    log::info!("silhouetted running on {} (Ctrl-C to stop)", config.source);

    {
        let mut meter = ui.frames(&config.source, 100);
        loop {
            match rx.recv_timeout(STATUS_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    log::info!("shutdown signal received, stopping pipeline...");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            meter.update(pipeline.stats());
            if pipeline.is_finished() {
                log::info!("source finished");
                pipeline.wait()?;
                break;
            }
        }
        pipeline.stop()?;
        meter.update(pipeline.stats());
    }

    let stats = pipeline.stats();
    log::info!(
        "silhouetted done: {} frame(s) processed, {} dropped",
        stats.processed,
        stats.evicted
    );
    Ok(())
}

/// Per-frame downstream: log label counts and write every Nth frame.
fn frame_sink(dir: Option<PathBuf>, every_n: u64) -> FrameCallback {
    Box::new(move |frame: AnnotatedFrame| {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for region in &frame.regions {
            *counts.entry(region.class.label()).or_default() += 1;
        }
        if !counts.is_empty() {
            log::debug!("frame {}: {:?}", frame.sequence, counts);
        }

        if let Some(dir) = &dir {
            if frame.sequence % every_n == 0 {
                if let Err(e) = save_frame(dir, &frame) {
                    log::warn!("frame {}: {:#}", frame.sequence, e);
                }
            }
        }
    })
}

fn save_frame(dir: &Path, frame: &AnnotatedFrame) -> Result<()> {
    let path = dir.join(format!("frame_{:06}.png", frame.sequence));
    frame
        .image
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))
}
