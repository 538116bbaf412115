//! Silhouette classification from bounding-box aspect ratio.
//!
//! This is a fixed calibration for one camera framing, not a learned model.
//! The pipeline only talks to `RegionLabeler`, so another classifier can be
//! swapped in without touching the frame loop.

use crate::region::Region;

/// Aspect ratio (width / height) ranges, inclusive, checked in this order.
const ADULT_RANGE: (f64, f64) = (0.10, 0.20);
const CHILD_RANGE: (f64, f64) = (0.20, 0.40);
const ANIMAL_RANGE: (f64, f64) = (0.40, 2.50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    Adult,
    Child,
    Animal,
    Unknown,
}

impl Classification {
    /// Text drawn next to the region.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Adult => "adult",
            Classification::Child => "child",
            Classification::Animal => "animal",
            Classification::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A region paired with the label it carries for one frame's rendering.
#[derive(Clone, Debug)]
pub struct LabeledRegion {
    pub region: Region,
    pub class: Classification,
}

/// Map a width-to-height ratio to a label. Shared boundaries resolve to the
/// earlier range (0.20 is Adult, 0.40 is Child).
pub fn classify_aspect(aspect: f64) -> Classification {
    let within = |(lo, hi): (f64, f64)| aspect >= lo && aspect <= hi;
    if within(ADULT_RANGE) {
        Classification::Adult
    } else if within(CHILD_RANGE) {
        Classification::Child
    } else if within(ANIMAL_RANGE) {
        Classification::Animal
    } else {
        Classification::Unknown
    }
}

/// Classify a region by its bounding box. Zero-height boxes are `Unknown`.
pub fn classify_contour(region: &Region) -> Classification {
    region
        .bounding_box()
        .aspect_ratio()
        .map_or(Classification::Unknown, classify_aspect)
}

/// Labeling seam used by the frame processor.
pub trait RegionLabeler: Send {
    fn name(&self) -> &'static str;

    fn classify(&self, region: &Region) -> Classification;
}

/// Default labeler: the aspect-ratio table above.
#[derive(Clone, Copy, Debug, Default)]
pub struct AspectRatioClassifier;

impl RegionLabeler for AspectRatioClassifier {
    fn name(&self) -> &'static str {
        "aspect-ratio"
    }

    fn classify(&self, region: &Region) -> Classification {
        classify_contour(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::point::Point;

    fn rect(width: i32, height: i32) -> Region {
        Region::new(vec![
            Point::new(0, 0),
            Point::new(width - 1, 0),
            Point::new(width - 1, height - 1),
            Point::new(0, height - 1),
        ])
    }

    #[test]
    fn aspect_table() {
        assert_eq!(classify_aspect(0.15), Classification::Adult);
        assert_eq!(classify_aspect(0.30), Classification::Child);
        assert_eq!(classify_aspect(1.0), Classification::Animal);
        assert_eq!(classify_aspect(5.0), Classification::Unknown);
        assert_eq!(classify_aspect(0.05), Classification::Unknown);
    }

    #[test]
    fn shared_boundaries_resolve_to_earlier_label() {
        assert_eq!(classify_aspect(0.20), Classification::Adult);
        assert_eq!(classify_aspect(0.40), Classification::Child);
        assert_eq!(classify_aspect(2.50), Classification::Animal);
        assert_eq!(classify_aspect(0.10), Classification::Adult);
    }

    #[test]
    fn contour_uses_bounding_box() {
        assert_eq!(classify_contour(&rect(20, 100)), Classification::Adult);
        assert_eq!(classify_contour(&rect(30, 100)), Classification::Child);
        assert_eq!(classify_contour(&rect(80, 50)), Classification::Animal);
        assert_eq!(classify_contour(&rect(500, 20)), Classification::Unknown);
        assert_eq!(AspectRatioClassifier.classify(&rect(15, 100)), Classification::Adult);
    }

    #[test]
    fn empty_region_is_unknown() {
        assert_eq!(classify_contour(&Region::new(vec![])), Classification::Unknown);
    }
}
