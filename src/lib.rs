//! Silhouette pipeline
//!
//! A two-thread video pipeline that captures frames at the source's native rate
//! and, on a separate thread, isolates moving silhouettes from a static
//! background, splits vertically stacked subjects apart, labels each region by
//! its bounding-box shape and composites an annotated frame.
//!
//! # Architecture
//!
//! ```text
//! CaptureSource -> PacedProducer -> FrameChannel -> FrameConsumer -> on_frame
//!                  (thread 1)       (bounded,       (thread 2)
//!                                    drop-oldest)
//! ```
//!
//! The channel is the only shared mutable state. When it is full the oldest
//! unread frame is evicted, so the consumer always works on the freshest frames
//! and may skip some under sustained backpressure, but never sees them out of
//! order.
//!
//! # Module Structure
//!
//! - `frame`: Frame, AnnotatedFrame, the bounded handoff channel
//! - `lifecycle`: stop signal and worker thread handle
//! - `ingest`: capture sources (synthetic `stub://`, local files) and the paced producer
//! - `segment`: background model, noise removal, boundary extraction
//! - `region`: Region geometry and the stacked-subject splitter
//! - `classify`: aspect-ratio classification
//! - `render`: output compositing
//! - `process`: the per-frame procedure
//! - `consumer`, `pipeline`: consumer thread and orchestration
//! - `config`: file and environment configuration

pub mod classify;
pub mod config;
pub mod consumer;
pub mod frame;
pub mod ingest;
pub mod lifecycle;
pub mod pipeline;
pub mod process;
pub mod region;
pub mod render;
pub mod segment;

pub use classify::{
    classify_aspect, classify_contour, AspectRatioClassifier, Classification, LabeledRegion,
    RegionLabeler,
};
pub use config::PipelineConfig;
pub use consumer::{FrameCallback, FrameConsumer};
pub use frame::{AnnotatedFrame, BoundedChannel, Frame, FrameChannel, DEFAULT_CHANNEL_CAPACITY};
pub use ingest::{open_source, CaptureSource, PacedProducer, SourceStats};
pub use lifecycle::{StopSignal, Worker};
pub use pipeline::{Pipeline, PipelineStats};
pub use process::{passes_area_filter, FrameProcessor, MIN_REGION_AREA};
pub use region::{cut_contour_at_y, find_split_point, split_region, BoundingBox, Region, Split};
pub use render::Renderer;
pub use segment::{BackgroundModel, RunningAverageModel, Segmenter};
