//! Color target tracker.
//!
//! Per frame: segment the target color, take the largest outer blob and turn its centroid
//! into an offset from the frame center. The center is fixed by the first frame's dimensions
//! and kept for the tracker's lifetime, even if later frames change size.

use anyhow::Result;

use super::annotate::{draw_arrow, draw_circle, fill_circle, CIRCLE_COLOR, MARKER_COLOR};
use super::backend::Segmenter;
use super::backends::CpuSegmenter;
use super::color::HsvBounds;
use super::result::{Offset, Target, TargetStatus, TrackResult};
use crate::frame::RawFrame;

pub const DEFAULT_MIN_RADIUS: f64 = 30.0;

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub bounds: HsvBounds,
    /// Enclosing-circle radius below which a target counts as noise.
    pub min_radius: f64,
    /// Draw overlays onto the returned frame.
    pub annotate: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bounds: HsvBounds::green(),
            min_radius: DEFAULT_MIN_RADIUS,
            annotate: true,
        }
    }
}

/// Tracker state carried between frames.
#[derive(Clone, Debug)]
pub struct TrackState {
    pub bounds: HsvBounds,
    center: Option<(i32, i32)>,
    first_dims: Option<(u32, u32)>,
    geometry_warned: bool,
    pub offset: Offset,
}

impl TrackState {
    /// Frame center `(midx, midy)`, fixed by the first frame.
    pub fn center(&self) -> Option<(i32, i32)> {
        self.center
    }
}

pub struct Tracker {
    config: TrackerConfig,
    state: TrackState,
    segmenter: Box<dyn Segmenter>,
}

impl Tracker {
    /// Tracker on the pure-Rust segmentation backend.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_segmenter(config, Box::new(CpuSegmenter))
    }

    pub fn with_segmenter(config: TrackerConfig, segmenter: Box<dyn Segmenter>) -> Self {
        let state = TrackState {
            bounds: config.bounds,
            center: None,
            first_dims: None,
            geometry_warned: false,
            offset: Offset::ZERO,
        };
        Self {
            config,
            state,
            segmenter,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.segmenter.name()
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Track one frame.
    pub fn track(&mut self, frame: &RawFrame) -> Result<TrackResult> {
        let (midx, midy) = self.fix_center(frame.width(), frame.height());
        let rgb = frame.to_rgb_image()?;

        let blob = self.segmenter.largest_blob(&rgb, &self.state.bounds)?;

        let status = match blob {
            None => TargetStatus::NotFound,
            Some(blob) => match blob.moments.centroid() {
                None => TargetStatus::Degenerate,
                Some((cx, cy)) => {
                    let circle = blob.circle;
                    if circle.radius < self.config.min_radius {
                        TargetStatus::TooSmall {
                            radius: circle.radius,
                        }
                    } else {
                        TargetStatus::Locked(Target {
                            circle,
                            centroid: (cx as i32, cy as i32),
                        })
                    }
                }
            },
        };

        let offset = match status.target() {
            Some(target) => Offset::new(target.centroid.0 - midx, midy - target.centroid.1),
            None => Offset::ZERO,
        };
        self.state.offset = offset;

        let annotated = if self.config.annotate {
            let mut canvas = rgb;
            if let Some(target) = status.target() {
                draw_circle(
                    &mut canvas,
                    (target.circle.x as i32, target.circle.y as i32),
                    target.circle.radius as i32,
                    CIRCLE_COLOR,
                    2,
                );
                fill_circle(&mut canvas, target.centroid, 5, MARKER_COLOR);
            }
            if offset != Offset::ZERO {
                draw_arrow(
                    &mut canvas,
                    (midx, midy),
                    (midx + offset.x, midy - offset.y),
                    MARKER_COLOR,
                    5,
                );
            }
            canvas
        } else {
            rgb
        };

        Ok(TrackResult {
            offset,
            status,
            annotated: RawFrame::from_rgb_image(annotated, frame.index())?,
        })
    }

    fn fix_center(&mut self, width: u32, height: u32) -> (i32, i32) {
        if let Some(center) = self.state.center {
            if self.state.first_dims != Some((width, height)) && !self.state.geometry_warned {
                log::warn!(
                    "Tracker: frame size changed to {}x{}; keeping center {:?} from first frame",
                    width,
                    height,
                    center
                );
                self.state.geometry_warned = true;
            }
            return center;
        }
        let center = ((width / 2) as i32, (height / 2) as i32);
        self.state.center = Some(center);
        self.state.first_dims = Some((width, height));
        center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use image::{Rgb, RgbImage};

    const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    fn scene(width: u32, height: u32, discs: &[(i32, i32, i32)], index: u64) -> RawFrame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let hit = discs.iter().any(|&(cx, cy, r)| {
                let dx = x as i32 - cx;
                let dy = y as i32 - cy;
                dx * dx + dy * dy <= r * r
            });
            if hit {
                GREEN
            } else {
                BACKGROUND
            }
        });
        RawFrame::from_rgb_image(image, index).unwrap()
    }

    #[test]
    fn empty_scene_yields_zero_offset() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let result = tracker.track(&scene(200, 150, &[], 0)).unwrap();
        assert_eq!(result.offset, Offset::ZERO);
        assert_eq!(result.status, TargetStatus::NotFound);
    }

    #[test]
    fn small_target_yields_zero_offset() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let result = tracker.track(&scene(320, 240, &[(60, 50, 15)], 0)).unwrap();
        assert_eq!(result.offset, Offset::ZERO);
        match result.status {
            TargetStatus::TooSmall { radius } => assert!(radius < 30.0),
            other => panic!("expected TooSmall, got {:?}", other),
        }
    }

    #[test]
    fn disc_offset_is_relative_to_center_with_y_up() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let (w, h) = (320, 240);
        let (cx, cy) = (220, 70);
        let result = tracker.track(&scene(w, h, &[(cx, cy, 40)], 0)).unwrap();

        let expected = (cx - w as i32 / 2, h as i32 / 2 - cy);
        assert!((result.offset.x - expected.0).abs() <= 1, "{:?}", result.offset);
        assert!((result.offset.y - expected.1).abs() <= 1, "{:?}", result.offset);
        let target = result.status.target().expect("locked");
        assert!(target.circle.radius >= 40.0 && target.circle.radius < 48.0);
        assert_eq!(tracker.state().offset, result.offset);
    }

    #[test]
    fn largest_blob_wins() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let result = tracker
            .track(&scene(400, 300, &[(80, 80, 35), (300, 220, 55)], 0))
            .unwrap();
        let target = result.status.target().expect("locked");
        assert!((target.centroid.0 - 300).abs() <= 1);
        assert!((target.centroid.1 - 220).abs() <= 1);
    }

    #[test]
    fn lost_target_resets_offset() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let locked = tracker.track(&scene(320, 240, &[(100, 100, 40)], 0)).unwrap();
        assert_ne!(locked.offset, Offset::ZERO);
        let lost = tracker.track(&scene(320, 240, &[], 1)).unwrap();
        assert_eq!(lost.offset, Offset::ZERO);
        assert_eq!(tracker.state().offset, Offset::ZERO);
    }

    #[test]
    fn center_stays_fixed_after_geometry_change() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.track(&scene(320, 240, &[], 0)).unwrap();
        assert_eq!(tracker.state().center(), Some((160, 120)));

        let result = tracker.track(&scene(200, 200, &[(150, 60, 40)], 1)).unwrap();
        assert_eq!(tracker.state().center(), Some((160, 120)));
        assert!((result.offset.x - (150 - 160)).abs() <= 1);
        assert!((result.offset.y - (120 - 60)).abs() <= 1);
    }

    #[test]
    fn annotation_does_not_change_offset() {
        let frame = scene(320, 240, &[(200, 160, 45)], 3);
        let mut plain = Tracker::new(TrackerConfig {
            annotate: false,
            ..TrackerConfig::default()
        });
        let mut drawn = Tracker::new(TrackerConfig::default());

        let a = plain.track(&frame).unwrap();
        let b = drawn.track(&frame).unwrap();
        assert_eq!(a.offset, b.offset);
        assert_eq!(b.annotated.index(), 3);
        assert_ne!(
            a.annotated.to_rgb_image().unwrap(),
            b.annotated.to_rgb_image().unwrap()
        );
    }

    #[test]
    fn odd_dimensions_use_integer_center() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.track(&scene(321, 241, &[], 0)).unwrap();
        assert_eq!(tracker.state().center(), Some((160, 120)));
    }

    #[test]
    fn radius_threshold_separates_small_and_large_discs() {
        // Thresholding widens a disc by about two pixels, so 24 stays below 30 and 32 clears it.
        for (radius, locked) in [(20, false), (24, false), (32, true), (36, true)] {
            let mut tracker = Tracker::new(TrackerConfig::default());
            let result = tracker
                .track(&scene(320, 240, &[(200, 80, radius)], 0))
                .unwrap();
            assert_eq!(result.status.target().is_some(), locked, "radius {}", radius);
            if locked {
                let Offset { x, y } = result.offset;
                assert!((x - 40).abs() <= 1 && (y - 40).abs() <= 1, "radius {}", radius);
            } else {
                assert_eq!(result.offset, Offset::ZERO, "radius {}", radius);
            }
        }
    }

    #[test]
    fn pixel_layouts_give_the_same_offset() {
        let rgb = scene(320, 240, &[(200, 80, 40)], 0);
        let bgr: Vec<u8> = rgb
            .to_rgb_image()
            .unwrap()
            .pixels()
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect();
        let bgr = RawFrame::new(320, 240, PixelFormat::Bgr24, vec![bgr], 0).unwrap();
        let planes = rgb.to_yuv420p().unwrap().to_vec();
        let yuv = RawFrame::new(320, 240, PixelFormat::Yuv420p, planes, 0).unwrap();

        let mut offsets = Vec::new();
        for frame in [&rgb, &bgr, &yuv] {
            let mut tracker = Tracker::new(TrackerConfig::default());
            offsets.push(tracker.track(frame).unwrap().offset);
        }
        assert!((offsets[0].x - 40).abs() <= 1 && (offsets[0].y - 40).abs() <= 1);
        assert_eq!(offsets[1], offsets[0]);
        assert!((offsets[2].x - offsets[0].x).abs() <= 1, "{:?}", offsets);
        assert!((offsets[2].y - offsets[0].y).abs() <= 1, "{:?}", offsets);
    }

    #[test]
    fn default_tracker_uses_cpu_backend() {
        assert_eq!(Tracker::new(TrackerConfig::default()).backend_name(), "cpu");
    }
}
