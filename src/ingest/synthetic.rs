//! Synthetic scene source (`stub://`).
//!
//! Renders a static backdrop with three silhouettes walking across it: an
//! adult-sized figure, a child-sized figure and a low, wide animal. Frame 0
//! is the empty backdrop so the background model seeds cleanly. A handful of
//! isolated speckle pixels per frame exercise the noise filter. Output is
//! deterministic for a given seed.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CaptureSource, SourceStats};
use crate::frame::Frame;

const DEFAULT_FPS: f64 = 15.0;
const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const SPECKLES_PER_FRAME: usize = 12;

/// Parsed `stub://` identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub scene: String,
    /// Stop after this many frames; `None` runs forever.
    pub frames: Option<u64>,
    /// Declared rate; zero disables pacing.
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            scene: "walkers".to_string(),
            frames: None,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            seed: 7,
        }
    }
}

impl SyntheticConfig {
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source URL must start with stub://"))?;
        let (scene, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut config = Self::default();
        if !scene.is_empty() {
            config.scene = scene.to_string();
        }
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let bad = || anyhow!("invalid value '{}' for stub parameter '{}'", value, key);
            match key {
                "frames" => config.frames = Some(value.parse().map_err(|_| bad())?),
                "fps" => config.fps = value.parse().map_err(|_| bad())?,
                "width" => config.width = value.parse().map_err(|_| bad())?,
                "height" => config.height = value.parse().map_err(|_| bad())?,
                "seed" => config.seed = value.parse().map_err(|_| bad())?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }

        if config.width < 64 || config.height < 64 {
            return Err(anyhow!(
                "synthetic frames must be at least 64x64 (got {}x{})",
                config.width,
                config.height
            ));
        }
        if !config.fps.is_finite() || config.fps < 0.0 {
            return Err(anyhow!("synthetic fps must be a non-negative number"));
        }
        Ok(config)
    }
}

/// A figure drawn as a head on top of a rectangular body.
struct Walker {
    body_w: u32,
    body_h: u32,
    head_r: i32,
    speed: i32,
    start_x: i32,
    color: Rgb<u8>,
}

impl Walker {
    /// Left edge at `sequence`, wrapping around a track `span` pixels long
    /// that starts 40 pixels left of the frame.
    fn left_edge(&self, sequence: u64, span: i32) -> i32 {
        let span = i64::from(span.max(1));
        let steps = (sequence % span as u64) as i64;
        let travelled = i64::from(self.start_x) + i64::from(self.speed) * steps;
        travelled.rem_euclid(span) as i32 - 40
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    backdrop: RgbImage,
    walkers: Vec<Walker>,
    rng: StdRng,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let backdrop = render_backdrop(config.width, config.height);
        let h = config.height;
        let walkers = vec![
            // Adult: body+head about 0.16 wide-to-tall.
            Walker {
                body_w: h / 10,
                body_h: h * 55 / 100,
                head_r: (h / 24) as i32,
                speed: 3,
                start_x: 10,
                color: Rgb([210, 190, 170]),
            },
            // Child.
            Walker {
                body_w: h / 10,
                body_h: h / 4,
                head_r: (h / 30) as i32,
                speed: -2,
                start_x: config.width as i32 * 2 / 3,
                color: Rgb([240, 220, 120]),
            },
            // Animal: long low body.
            Walker {
                body_w: h / 4,
                body_h: h / 8,
                head_r: 0,
                speed: 4,
                start_x: config.width as i32 / 3,
                color: Rgb([150, 110, 230]),
            },
        ];
        log::info!(
            "SyntheticSource: scene '{}' {}x{} @ {} fps ({})",
            config.scene,
            config.width,
            config.height,
            config.fps,
            config
                .frames
                .map_or("unbounded".to_string(), |n| format!("{} frames", n))
        );
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            backdrop,
            walkers,
            rng,
            frame_count: 0,
        }
    }

    fn render(&mut self, sequence: u64) -> RgbImage {
        let mut image = self.backdrop.clone();
        if sequence == 0 {
            return image;
        }

        let (width, height) = (self.config.width as i32, self.config.height as i32);
        let ground = height - height / 12;
        let span = width + 80;
        for walker in &self.walkers {
            let x = walker.left_edge(sequence, span);
            let top = ground - walker.body_h as i32;
            draw_filled_rect_mut(
                &mut image,
                Rect::at(x, top).of_size(walker.body_w, walker.body_h),
                walker.color,
            );
            if walker.head_r > 0 {
                let cx = x + walker.body_w as i32 / 2;
                draw_filled_circle_mut(
                    &mut image,
                    (cx, top - walker.head_r),
                    walker.head_r,
                    walker.color,
                );
            }
        }

        for _ in 0..SPECKLES_PER_FRAME {
            let sx = self.rng.gen_range(0..self.config.width);
            let sy = self.rng.gen_range(0..self.config.height);
            image.put_pixel(sx, sy, Rgb([255, 255, 255]));
        }
        image
    }
}

impl CaptureSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.config.scene)
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        if self.config.frames.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let sequence = self.frame_count;
        let image = self.render(sequence);
        self.frame_count += 1;
        Ok(Some(Frame::new(image, sequence)))
    }

    fn declared_frame_rate(&self) -> Option<f64> {
        (self.config.fps > 0.0).then_some(self.config.fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
        }
    }
}

/// Dim left-to-right gradient with a darker floor band.
fn render_backdrop(width: u32, height: u32) -> RgbImage {
    let floor = height - height / 12;
    RgbImage::from_fn(width, height, |x, y| {
        if y >= floor {
            Rgb([35, 35, 40])
        } else {
            let shade = 50 + (x * 30 / width) as u8;
            Rgb([shade, shade, shade + 10])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stub_parameters() {
        let config =
            SyntheticConfig::from_url("stub://park?frames=30&fps=0&width=160&height=120&seed=3")
                .unwrap();
        assert_eq!(config.scene, "park");
        assert_eq!(config.frames, Some(30));
        assert_eq!(config.fps, 0.0);
        assert_eq!((config.width, config.height), (160, 120));
        assert_eq!(config.seed, 3);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SyntheticConfig::from_url("stub://x?frames=abc").is_err());
        assert!(SyntheticConfig::from_url("stub://x?colour=red").is_err());
        assert!(SyntheticConfig::from_url("stub://x?width=10").is_err());
        assert!(SyntheticConfig::from_url("stub://x?fps").is_err());
    }

    #[test]
    fn zero_fps_declares_no_rate() {
        let source = SyntheticSource::new(SyntheticConfig::from_url("stub://x?fps=0").unwrap());
        assert_eq!(source.declared_frame_rate(), None);
    }

    #[test]
    fn first_frame_is_empty_backdrop_then_figures_appear() {
        let config = SyntheticConfig::from_url("stub://x?frames=3").unwrap();
        let backdrop = render_backdrop(config.width, config.height);
        let mut source = SyntheticSource::new(config);

        let first = source.read_next().unwrap().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.image(), &backdrop);

        let second = source.read_next().unwrap().unwrap();
        assert_eq!(second.sequence, 1);
        assert_ne!(second.image(), &backdrop);
    }

    #[test]
    fn walkers_wrap_for_any_sequence_number() {
        let config = SyntheticConfig::default();
        let span = config.width as i32 + 80;
        let mut source = SyntheticSource::new(config);
        for walker in &source.walkers {
            assert_eq!(walker.left_edge(1, span), walker.left_edge(1 + span as u64, span));
            let far = walker.left_edge(u64::MAX, span);
            assert!((-40..span - 40).contains(&far));
        }
        let image = source.render(u64::MAX);
        assert_eq!(image.dimensions(), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }

    #[test]
    fn same_seed_same_frames() {
        let url = "stub://x?frames=4&seed=11";
        let mut a = SyntheticSource::new(SyntheticConfig::from_url(url).unwrap());
        let mut b = SyntheticSource::new(SyntheticConfig::from_url(url).unwrap());
        while let (Some(fa), Some(fb)) = (a.read_next().unwrap(), b.read_next().unwrap()) {
            assert_eq!(fa.image(), fb.image());
        }
    }
}
