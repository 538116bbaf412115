//! Pipeline orchestrator: one source, one channel, one producer, one consumer.

use anyhow::Result;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::consumer::{FrameCallback, FrameConsumer};
use crate::frame::FrameChannel;
use crate::ingest::{open_source, CaptureSource, PacedProducer};
use crate::process::FrameProcessor;
use crate::render::Renderer;
use crate::segment::{RunningAverageModel, Segmenter};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames dropped unread because the channel was full.
    pub evicted: u64,
    /// Frames handed to the callback.
    pub processed: u64,
    /// Frames currently waiting in the channel.
    pub queued: usize,
}

pub struct Pipeline {
    channel: Arc<FrameChannel>,
    producer: PacedProducer,
    consumer: FrameConsumer,
    running: bool,
}

impl Pipeline {
    /// Build a pipeline from configuration. A source that cannot be opened is
    /// an error here; the pipeline never starts.
    pub fn new(config: &PipelineConfig, on_frame: FrameCallback) -> Result<Self> {
        let source = open_source(&config.source)?;
        let model = RunningAverageModel::new(
            config.segmentation.threshold,
            config.segmentation.learning_rate,
        );
        let processor = FrameProcessor::new(
            Segmenter::new(Box::new(model)),
            Renderer::from_font_path(config.font_path.as_deref()),
        )
        .with_min_area(config.min_region_area);
        Self::with_source(source, config.buffer_capacity, processor, on_frame)
    }

    /// Build a pipeline from a source identifier and buffer capacity, with every
    /// other setting (label font included) at its default.
    pub fn open(identifier: &str, capacity: usize, on_frame: FrameCallback) -> Result<Self> {
        let config = PipelineConfig {
            source: identifier.to_string(),
            buffer_capacity: capacity,
            ..PipelineConfig::default()
        };
        Self::new(&config, on_frame)
    }

    pub fn with_source(
        source: Box<dyn CaptureSource>,
        capacity: usize,
        processor: FrameProcessor,
        on_frame: FrameCallback,
    ) -> Result<Self> {
        let channel = Arc::new(FrameChannel::new(capacity)?);
        log::info!(
            "pipeline: source {} buffer {}",
            source.describe(),
            channel.capacity()
        );
        Ok(Self {
            producer: PacedProducer::new(source, channel.clone()),
            consumer: FrameConsumer::new(processor, channel.clone(), on_frame),
            channel,
            running: false,
        })
    }

    /// Spawn both worker threads. Starting twice is an error.
    pub fn start(&mut self) -> Result<()> {
        self.consumer.start()?;
        if let Err(e) = self.producer.start() {
            self.channel.close();
            self.consumer.stop()?;
            return Err(e);
        }
        self.running = true;
        log::info!("pipeline started");
        Ok(())
    }

    /// Stop the producer, then the consumer, and join both.
    ///
    /// Idempotent. Both workers are always stopped; the first failure is returned.
    pub fn stop(&mut self) -> Result<()> {
        let producer = self.producer.stop();
        let consumer = self.consumer.stop();
        if std::mem::take(&mut self.running) {
            log::info!("pipeline stopped ({:?})", self.stats());
        }
        producer.and(consumer)
    }

    /// Block until both workers exit on their own, as they do once a finite
    /// source reaches end of stream and the queue has drained.
    pub fn wait(&mut self) -> Result<()> {
        let producer = self.producer.join();
        let consumer = self.consumer.join();
        producer.and(consumer)
    }

    pub fn is_finished(&self) -> bool {
        self.producer.is_finished() && self.consumer.is_finished()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            evicted: self.channel.evicted(),
            processed: self.consumer.processed(),
            queued: self.channel.len(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("pipeline shutdown: {:#}", e);
        }
    }
}
