use anyhow::{anyhow, Result};
use image::RgbImage;

use super::color::HsvBounds;
use super::geometry::{Circle, Moments};

/// Gaussian kernel width of the pre-threshold blur.
pub const BLUR_KERNEL: i32 = 11;
/// Sigma that OpenCV derives for an 11-tap kernel when none is given.
pub const BLUR_SIGMA: f32 = 2.0;
/// Erosions, then dilations, applied with a 3x3 square element.
pub const MORPH_ITERATIONS: u8 = 2;

/// Largest color blob found in a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    pub area: f64,
    pub moments: Moments,
    pub circle: Circle,
}

/// Color segmentation: blur, HSV threshold, open the mask and pick the largest outer contour.
pub trait Segmenter: Send {
    fn name(&self) -> &'static str;

    fn largest_blob(&mut self, image: &RgbImage, bounds: &HsvBounds) -> Result<Option<Blob>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmenterKind {
    /// Pure Rust, built on `imageproc`.
    #[default]
    Cpu,
    /// OpenCV `imgproc` (feature: track-opencv).
    OpenCv,
}

impl SegmenterKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(SegmenterKind::Cpu),
            "opencv" => Ok(SegmenterKind::OpenCv),
            other => Err(anyhow!(
                "unknown tracker backend '{}' (expected cpu|opencv)",
                other
            )),
        }
    }

    pub fn create(&self) -> Result<Box<dyn Segmenter>> {
        match self {
            SegmenterKind::Cpu => Ok(Box::new(super::backends::CpuSegmenter)),
            #[cfg(feature = "track-opencv")]
            SegmenterKind::OpenCv => Ok(Box::new(super::backends::OpenCvSegmenter::new())),
            #[cfg(not(feature = "track-opencv"))]
            SegmenterKind::OpenCv => Err(anyhow!(
                "opencv tracking requires the track-opencv feature"
            )),
        }
    }
}
