//! Foreground segmentation: background model, noise removal, boundary extraction.
//!
//! The background model is an owned, stateful instance held by the frame
//! processor. It is seeded by the first frame it sees; every later frame must
//! have the same geometry.

use anyhow::{bail, Result};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::point::Point;

use crate::frame::Frame;
use crate::region::Region;

/// Default luma difference (0..255) above which a pixel is foreground.
pub const DEFAULT_FOREGROUND_THRESHOLD: f32 = 25.0;

/// Default per-frame blend factor pulling the background toward the current frame.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Radius of the disk used for close/open (a 5x5 elliptical neighbourhood).
const NOISE_KERNEL_RADIUS: u8 = 2;

const FOREGROUND: u8 = 255;

/// Stateful per-pixel foreground classifier.
pub trait BackgroundModel: Send {
    fn name(&self) -> &'static str;

    /// Classify each pixel of `frame`, updating the model. Foreground pixels are 255.
    fn apply(&mut self, frame: &Frame) -> Result<GrayImage>;
}

/// Running-average background subtraction on luma.
pub struct RunningAverageModel {
    background: Vec<f32>,
    width: u32,
    height: u32,
    threshold: f32,
    learning_rate: f32,
}

impl RunningAverageModel {
    pub fn new(threshold: f32, learning_rate: f32) -> Self {
        Self {
            background: Vec::new(),
            width: 0,
            height: 0,
            threshold,
            learning_rate: learning_rate.clamp(0.0, 1.0),
        }
    }

    pub fn is_seeded(&self) -> bool {
        !self.background.is_empty()
    }
}

impl Default for RunningAverageModel {
    fn default() -> Self {
        Self::new(DEFAULT_FOREGROUND_THRESHOLD, DEFAULT_LEARNING_RATE)
    }
}

fn luma(p: &image::Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

impl BackgroundModel for RunningAverageModel {
    fn name(&self) -> &'static str {
        "running-average"
    }

    fn apply(&mut self, frame: &Frame) -> Result<GrayImage> {
        let (width, height) = (frame.width(), frame.height());
        let mut mask = GrayImage::new(width, height);

        if !self.is_seeded() {
            self.background = frame.image().pixels().map(luma).collect();
            self.width = width;
            self.height = height;
            log::debug!("background model seeded at {}x{}", width, height);
            return Ok(mask);
        }

        if (width, height) != (self.width, self.height) {
            bail!(
                "precondition violated: frame {} is {}x{} but the background model was seeded at {}x{}",
                frame.sequence,
                width,
                height,
                self.width,
                self.height
            );
        }

        let rate = self.learning_rate;
        for ((pixel, bg), out) in frame
            .image()
            .pixels()
            .zip(self.background.iter_mut())
            .zip(mask.pixels_mut())
        {
            let value = luma(pixel);
            if (value - *bg).abs() > self.threshold {
                *out = Luma([FOREGROUND]);
            }
            *bg += rate * (value - *bg);
        }
        Ok(mask)
    }
}

/// Morphological close then open with a radius-2 disk.
pub fn remove_noise(mask: &GrayImage) -> GrayImage {
    let closed = morphology::close(mask, Norm::L2, NOISE_KERNEL_RADIUS);
    morphology::open(&closed, Norm::L2, NOISE_KERNEL_RADIUS)
}

/// Outermost boundaries of the mask's foreground blobs, chain-simplified.
pub fn extract_outer_boundaries(mask: &GrayImage) -> Vec<Region> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Region::new(simplify_chain(&c.points)))
        .collect()
}

/// Drop boundary points lying inside straight horizontal, vertical or diagonal
/// runs, keeping only the run endpoints. The input is a closed chain.
pub fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut chain: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &p in points {
        if chain.last() != Some(&p) {
            chain.push(p);
        }
    }
    while chain.len() > 1 && chain.first() == chain.last() {
        chain.pop();
    }
    let n = chain.len();
    if n < 3 {
        return chain;
    }

    let step = |a: Point<i32>, b: Point<i32>| ((b.x - a.x).signum(), (b.y - a.y).signum());
    (0..n)
        .filter(|&i| {
            let prev = chain[(i + n - 1) % n];
            let next = chain[(i + 1) % n];
            step(prev, chain[i]) != step(chain[i], next)
        })
        .map(|i| chain[i])
        .collect()
}

/// Background subtraction -> noise removal -> boundary extraction.
pub struct Segmenter {
    model: Box<dyn BackgroundModel>,
}

impl Segmenter {
    pub fn new(model: Box<dyn BackgroundModel>) -> Self {
        log::info!("segmenter using {} background model", model.name());
        Self { model }
    }

    pub fn segment(&mut self, frame: &Frame) -> Result<Vec<Region>> {
        let mask = self.model.apply(frame)?;
        let cleaned = remove_noise(&mask);
        Ok(extract_outer_boundaries(&cleaned))
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(Box::new(RunningAverageModel::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_box(seq: u64, boxed: Option<(u32, u32, u32, u32)>) -> Frame {
        let mut image = RgbImage::from_pixel(64, 64, Rgb([20, 20, 20]));
        if let Some((x0, y0, w, h)) = boxed {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    image.put_pixel(x, y, Rgb([220, 220, 220]));
                }
            }
        }
        Frame::new(image, seq)
    }

    #[test]
    fn first_frame_seeds_and_reports_no_foreground() {
        let mut model = RunningAverageModel::default();
        let mask = model.apply(&frame_with_box(0, Some((5, 5, 10, 10)))).unwrap();
        assert!(model.is_seeded());
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn changed_pixels_become_foreground() {
        let mut model = RunningAverageModel::default();
        model.apply(&frame_with_box(0, None)).unwrap();
        let mask = model.apply(&frame_with_box(1, Some((10, 10, 8, 4)))).unwrap();
        let lit = mask.pixels().filter(|p| p[0] == FOREGROUND).count();
        assert_eq!(lit, 32);
        assert_eq!(mask.get_pixel(10, 10)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn geometry_change_is_a_precondition_error() {
        let mut model = RunningAverageModel::default();
        model.apply(&frame_with_box(0, None)).unwrap();
        let other = Frame::new(RgbImage::new(32, 32), 1);
        let err = model.apply(&other).unwrap_err();
        assert!(err.to_string().contains("precondition violated"));
    }

    #[test]
    fn speckles_are_removed() {
        let mut mask = GrayImage::new(40, 40);
        mask.put_pixel(3, 3, Luma([FOREGROUND]));
        mask.put_pixel(30, 12, Luma([FOREGROUND]));
        let cleaned = remove_noise(&mask);
        assert!(cleaned.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn simplify_keeps_rectangle_corners() {
        let mut ring = Vec::new();
        for x in 0..5 {
            ring.push(Point::new(x, 0));
        }
        for y in 1..4 {
            ring.push(Point::new(4, y));
        }
        for x in (0..5).rev() {
            ring.push(Point::new(x, 4));
        }
        for y in (1..4).rev() {
            ring.push(Point::new(0, y));
        }
        let simplified = simplify_chain(&ring);
        assert_eq!(
            simplified,
            vec![
                Point::new(0, 0),
                Point::new(4, 0),
                Point::new(4, 4),
                Point::new(0, 4)
            ]
        );
    }

    #[test]
    fn solid_block_yields_one_outer_boundary() {
        let mut mask = GrayImage::new(60, 60);
        for y in 10..40 {
            for x in 20..32 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        let regions = extract_outer_boundaries(&mask);
        assert_eq!(regions.len(), 1);
        let bbox = regions[0].bounding_box();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (20, 10, 12, 30));
    }

    #[test]
    fn segmenter_finds_moving_block() {
        let mut segmenter = Segmenter::default();
        assert!(segmenter.segment(&frame_with_box(0, None)).unwrap().is_empty());
        let regions = segmenter
            .segment(&frame_with_box(1, Some((20, 8, 12, 40))))
            .unwrap();
        assert_eq!(regions.len(), 1);
        let bbox = regions[0].bounding_box();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (20, 8, 12, 40));
    }
}
