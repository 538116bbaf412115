//! Output compositing: mask-and-copy reveal, boundary outlines, labels.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_polygon_mut, draw_text_mut, BresenhamLineIter};
use imageproc::point::Point;
use std::path::Path;

use crate::classify::LabeledRegion;

pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OUTLINE_THICKNESS: u32 = 2;
pub const LABEL_SCALE_PX: f32 = 18.0;
/// Gap between the label baseline and the region's top edge.
pub const LABEL_OFFSET_PX: i32 = 10;
/// Label font used when none is configured.
pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Renders annotated frames. Labels are skipped when no font is loaded.
pub struct Renderer {
    font: Option<FontVec>,
    color: Rgb<u8>,
    thickness: u32,
    label_scale: PxScale,
}

impl Renderer {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            color: OUTLINE_COLOR,
            thickness: OUTLINE_THICKNESS,
            label_scale: PxScale::from(LABEL_SCALE_PX),
        }
    }

    /// Load a TrueType/OpenType font from disk.
    pub fn load_font(path: &Path) -> Result<FontVec> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
    }

    /// Build a renderer from an optional font path, degrading to outline-only.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        let font = path.and_then(|path| match Self::load_font(path) {
            Ok(font) => Some(font),
            Err(e) => {
                log::warn!("labels disabled: {:#}", e);
                None
            }
        });
        Self::new(font)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Black canvas revealing only the pixels inside `regions`, then outlines and labels.
    pub fn compose(&self, source: &RgbImage, regions: &[LabeledRegion]) -> RgbImage {
        let (width, height) = source.dimensions();

        let mut mask = GrayImage::new(width, height);
        for labeled in regions {
            let poly = polygon(labeled.region.points());
            if poly.len() >= 3 {
                draw_polygon_mut(&mut mask, &poly, Luma([255]));
            }
        }

        let mut canvas = RgbImage::new(width, height);
        for (x, y, m) in mask.enumerate_pixels() {
            if m[0] > 0 {
                canvas.put_pixel(x, y, *source.get_pixel(x, y));
            }
        }

        for labeled in regions {
            self.draw_outline(&mut canvas, labeled.region.points());
            self.draw_label(&mut canvas, labeled);
        }
        canvas
    }

    fn draw_outline(&self, canvas: &mut RgbImage, points: &[Point<i32>]) {
        let n = points.len();
        if n == 0 {
            return;
        }
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            let line = BresenhamLineIter::new((a.x as f32, a.y as f32), (b.x as f32, b.y as f32));
            for (x, y) in line {
                self.stamp(canvas, x, y);
            }
        }
    }

    // Square brush centred on (x, y), clipped to the canvas.
    fn stamp(&self, canvas: &mut RgbImage, x: i32, y: i32) {
        let half = (self.thickness / 2) as i32;
        for dy in 0..self.thickness as i32 {
            for dx in 0..self.thickness as i32 {
                let (px, py) = (x + dx - half, y + dy - half);
                if px >= 0 && py >= 0 && (px as u32) < canvas.width() && (py as u32) < canvas.height() {
                    canvas.put_pixel(px as u32, py as u32, self.color);
                }
            }
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, labeled: &LabeledRegion) {
        let Some(font) = &self.font else {
            return;
        };
        let bbox = labeled.region.bounding_box();
        let top = bbox.y - LABEL_OFFSET_PX - self.label_scale.y.ceil() as i32;
        let max_y = canvas.height() as i32 - self.label_scale.y.ceil() as i32;
        let y = top.clamp(0, max_y.max(0));
        let x = bbox.x.clamp(0, canvas.width().saturating_sub(1) as i32);
        draw_text_mut(
            canvas,
            self.color,
            x,
            y,
            self.label_scale,
            font,
            labeled.class.label(),
        );
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Polygon vertices with repeated neighbours removed and the ring left open,
/// which is the form the fill routine expects.
fn polygon(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &p in points {
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    poly
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::region::Region;

    fn labeled(points: &[(i32, i32)]) -> LabeledRegion {
        LabeledRegion {
            region: Region::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect()),
            class: Classification::Animal,
        }
    }

    #[test]
    fn reveals_only_inside_regions() {
        let source = RgbImage::from_pixel(50, 50, Rgb([200, 100, 50]));
        let regions = vec![labeled(&[(10, 10), (30, 10), (30, 30), (10, 30)])];
        let out = Renderer::default().compose(&source, &regions);

        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(*out.get_pixel(20, 20), Rgb([200, 100, 50]));
        assert_eq!(*out.get_pixel(2, 2), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(45, 45), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(10, 20), OUTLINE_COLOR);
    }

    #[test]
    fn no_regions_gives_black_canvas() {
        let source = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
        let out = Renderer::default().compose(&source, &[]);
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn outline_is_clipped_at_canvas_edge() {
        let source = RgbImage::new(20, 20);
        let regions = vec![labeled(&[(0, 0), (19, 0), (19, 19), (0, 19)])];
        let out = Renderer::default().compose(&source, &regions);
        assert_eq!(*out.get_pixel(0, 0), OUTLINE_COLOR);
        assert_eq!(*out.get_pixel(19, 19), OUTLINE_COLOR);
    }

    #[test]
    fn polygon_drops_closing_duplicate() {
        let pts: Vec<Point<i32>> = [(0, 0), (0, 0), (4, 0), (4, 4), (0, 0)]
            .iter()
            .map(|&(x, y)| Point::new(x, y))
            .collect();
        assert_eq!(
            polygon(&pts),
            vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 4)]
        );
    }

    // Anti-aliased glyph edges blend toward black, so match any pure-green shade.
    fn green_rows(image: &RgbImage, rows: std::ops::Range<u32>) -> usize {
        image
            .enumerate_pixels()
            .filter(|(_, y, p)| rows.contains(y) && p[0] == 0 && p[1] > 0 && p[2] == 0)
            .count()
    }

    #[test]
    fn label_is_drawn_above_region_when_font_loads() {
        let font_path = Path::new(DEFAULT_FONT_PATH);
        if !font_path.is_file() {
            eprintln!("skipping: {} not installed", font_path.display());
            return;
        }
        let renderer = Renderer::from_font_path(Some(font_path));
        assert!(renderer.has_font());

        let source = RgbImage::from_pixel(200, 200, Rgb([90, 90, 90]));
        let regions = vec![labeled(&[(60, 100), (90, 100), (90, 190), (60, 190)])];
        let with_font = renderer.compose(&source, &regions);
        let without_font = Renderer::default().compose(&source, &regions);

        // The outline never reaches above y=99; anything green higher up is text.
        assert!(green_rows(&with_font, 0..98) > 0);
        assert_eq!(green_rows(&without_font, 0..98), 0);
    }

    #[test]
    fn missing_font_disables_labels() {
        let renderer = Renderer::from_font_path(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!renderer.has_font());
    }
}
