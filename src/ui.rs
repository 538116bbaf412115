use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use silhouette_pipeline::PipelineStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: &str) -> Self {
        match flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Stderr status line for a running pipeline.
#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, stderr_is_tty: bool) -> Self {
        let pretty = stderr_is_tty && mode != UiMode::Plain;
        Self { pretty }
    }

    /// Live frame counter. Plain mode logs a summary line every `plain_every` frames.
    pub fn frames(&self, source: &str, plain_every: u64) -> FrameMeter {
        let spinner = self.pretty.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {elapsed_precise} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{source}: waiting for frames"));
            spinner
        });
        FrameMeter {
            source: source.to_string(),
            started: Instant::now(),
            spinner,
            plain_every: plain_every.max(1),
            last_reported: 0,
            last: PipelineStats::default(),
        }
    }
}

pub struct FrameMeter {
    source: String,
    started: Instant,
    spinner: Option<ProgressBar>,
    plain_every: u64,
    last_reported: u64,
    last: PipelineStats,
}

impl FrameMeter {
    pub fn update(&mut self, stats: PipelineStats) {
        let message = format!(
            "{}: {} processed, {} dropped, {} queued",
            self.source, stats.processed, stats.evicted, stats.queued
        );
        match &self.spinner {
            Some(spinner) => spinner.set_message(message),
            None if stats.processed >= self.last_reported + self.plain_every => {
                eprintln!("==> {message}");
                self.last_reported = stats.processed;
            }
            None => {}
        }
        self.last = stats;
    }
}

impl Drop for FrameMeter {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.last.processed as f64 / elapsed
        } else {
            0.0
        };
        let message = format!(
            "✔ {}: {} frame(s) in {:.2}s ({:.1} fps, {} dropped)",
            self.source, self.last.processed, elapsed, rate, self.last.evicted
        );
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}
