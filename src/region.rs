//! Foreground regions and the stacked-subject splitter.
//!
//! A `Region` is the closed boundary polygon of one foreground blob for one frame.
//! Regions are never mutated; splitting replaces one region with two successors.

use imageproc::point::Point;

/// Gap multiplier over the baseline density that marks a split candidate.
pub const SPLIT_GAP_FACTOR: f64 = 1.5;

/// Share of the smallest Y gaps averaged into the baseline density.
pub const BASELINE_GAP_SHARE: f64 = 0.2;

/// Axis-aligned bounding box, inclusive of both edge pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Width-to-height ratio, `None` for a zero-height box.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.height == 0 {
            return None;
        }
        Some(self.width as f64 / self.height as f64)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    points: Vec<Point<i32>>,
    bounds: BoundingBox,
}

impl Region {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        let bounds = bounding_box(&points);
        Self { points, bounds }
    }

    pub fn points(&self) -> &[Point<i32>] {
        &self.points
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    /// Enclosed polygon area (shoelace formula), always non-negative.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();
        twice.abs() as f64 / 2.0
    }
}

fn bounding_box(points: &[Point<i32>]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x.abs_diff(min_x).saturating_add(1),
        height: max_y.abs_diff(min_y).saturating_add(1),
    }
}

// ----------------------------------------------------------------------------
// Splitting
// ----------------------------------------------------------------------------

/// Outcome of running the splitter over one region.
#[derive(Clone, Debug, PartialEq)]
pub enum Split {
    Whole(Region),
    Pair(Region, Region),
}

/// Find the Y position where the boundary's vertical point density drops sharply.
///
/// Distinct Y values are sorted and their consecutive gaps measured. The mean of
/// the smallest 20% of gaps (at least one) is the baseline; every Y whose gap to
/// the next distinct Y exceeds 1.5x the baseline is a candidate, and the split
/// is the mean of all candidates. Returns `None` when there is no candidate or
/// fewer than two distinct Y values.
pub fn find_split_point(region: &Region) -> Option<f64> {
    let mut ys: Vec<i32> = region.points().iter().map(|p| p.y).collect();
    ys.sort_unstable();
    ys.dedup();
    if ys.len() < 2 {
        return None;
    }

    let gaps: Vec<f64> = ys.windows(2).map(|w| (w[1] - w[0]) as f64).collect();

    let mut smallest = gaps.clone();
    smallest.sort_by(|a, b| a.total_cmp(b));
    let take = ((smallest.len() as f64 * BASELINE_GAP_SHARE) as usize).max(1);
    let baseline = smallest[..take].iter().sum::<f64>() / take as f64;

    let candidates: Vec<f64> = ys
        .iter()
        .zip(&gaps)
        .filter(|(_, gap)| **gap > SPLIT_GAP_FACTOR * baseline)
        .map(|(y, _)| *y as f64)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates.iter().sum::<f64>() / candidates.len() as f64)
}

/// Partition a region's points into "at or above" and "strictly below" `split_y`.
///
/// A degenerate cut (either side empty) returns the region unchanged.
pub fn cut_contour_at_y(region: &Region, split_y: f64) -> Split {
    let (upper, lower): (Vec<Point<i32>>, Vec<Point<i32>>) = region
        .points()
        .iter()
        .copied()
        .partition(|p| p.y as f64 <= split_y);
    if upper.is_empty() || lower.is_empty() {
        return Split::Whole(region.clone());
    }
    Split::Pair(Region::new(upper), Region::new(lower))
}

/// Run split detection and, when a non-zero split Y is found, cut the region.
pub fn split_region(region: Region) -> Split {
    match find_split_point(&region) {
        Some(split_y) if split_y != 0.0 => {
            log::trace!(
                "splitting region at y={:.1} (bbox {:?})",
                split_y,
                region.bounding_box()
            );
            cut_contour_at_y(&region, split_y)
        }
        _ => Split::Whole(region),
    }
}
