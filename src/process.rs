//! Per-frame procedure run by the consumer thread.
//!
//! segment -> area filter -> split -> classify -> area filter -> composite.

use anyhow::Result;

use crate::classify::{AspectRatioClassifier, LabeledRegion, RegionLabeler};
use crate::frame::{AnnotatedFrame, Frame};
use crate::region::{split_region, Region, Split};
use crate::render::Renderer;
use crate::segment::Segmenter;

/// Regions must enclose strictly more than this area to be kept.
pub const MIN_REGION_AREA: f64 = 500.0;

/// Strict `>` area filter applied before and after splitting.
pub fn passes_area_filter(region: &Region, min_area: f64) -> bool {
    region.area() > min_area
}

pub struct FrameProcessor {
    segmenter: Segmenter,
    labeler: Box<dyn RegionLabeler>,
    renderer: Renderer,
    min_area: f64,
}

impl FrameProcessor {
    pub fn new(segmenter: Segmenter, renderer: Renderer) -> Self {
        Self {
            segmenter,
            labeler: Box::new(AspectRatioClassifier),
            renderer,
            min_area: MIN_REGION_AREA,
        }
    }

    pub fn with_labeler(mut self, labeler: Box<dyn RegionLabeler>) -> Self {
        self.labeler = labeler;
        self
    }

    pub fn with_min_area(mut self, min_area: f64) -> Self {
        self.min_area = min_area;
        self
    }

    pub fn min_area(&self) -> f64 {
        self.min_area
    }

    /// Run the full procedure on one frame.
    pub fn process(&mut self, frame: Frame) -> Result<AnnotatedFrame> {
        let raw = self.segmenter.segment(&frame)?;
        let raw_count = raw.len();
        let kept = self.keep_renderable(self.label_regions(raw));

        log::trace!(
            "frame {}: {} raw region(s), {} rendered",
            frame.sequence,
            raw_count,
            kept.len()
        );

        let image = self.renderer.compose(frame.image(), &kept);
        Ok(AnnotatedFrame {
            sequence: frame.sequence,
            image,
            regions: kept,
        })
    }

    /// Area-filter raw regions, split stacked subjects, and classify each result.
    pub fn label_regions(&self, raw: Vec<Region>) -> Vec<LabeledRegion> {
        let mut labeled = Vec::new();
        for region in raw
            .into_iter()
            .filter(|r| passes_area_filter(r, self.min_area))
        {
            match split_region(region) {
                Split::Pair(upper, lower) => {
                    for part in [upper, lower] {
                        let class = self.labeler.classify(&part);
                        labeled.push(LabeledRegion {
                            region: part,
                            class,
                        });
                    }
                }
                Split::Whole(region) => {
                    let class = self.labeler.classify(&region);
                    labeled.push(LabeledRegion { region, class });
                }
            }
        }
        labeled
    }

    /// Second area pass with the same threshold: split halves can fall under it.
    pub fn keep_renderable(&self, labeled: Vec<LabeledRegion>) -> Vec<LabeledRegion> {
        labeled
            .into_iter()
            .filter(|l| passes_area_filter(&l.region, self.min_area))
            .collect()
    }
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new(Segmenter::default(), Renderer::default())
    }
}
