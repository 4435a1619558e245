#![cfg(feature = "track-opencv")]

use anyhow::{Context, Result};
use image::RgbImage;
use opencv::core::{self, Mat, Point, Point2f, Scalar, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::track::backend::{Blob, Segmenter, BLUR_KERNEL, MORPH_ITERATIONS};
use crate::track::color::{Hsv, HsvBounds};
use crate::track::geometry::{Circle, Moments};

/// Segmentation on OpenCV `imgproc`. Intermediate buffers are reused across frames.
pub struct OpenCvSegmenter {
    blurred: Mat,
    hsv: Mat,
    mask: Mat,
    eroded: Mat,
}

impl OpenCvSegmenter {
    pub fn new() -> Self {
        Self {
            blurred: Mat::default(),
            hsv: Mat::default(),
            mask: Mat::default(),
            eroded: Mat::default(),
        }
    }
}

impl Default for OpenCvSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar(hsv: Hsv) -> Scalar {
    Scalar::new(hsv.h as f64, hsv.s as f64, hsv.v as f64, 0.0)
}

impl Segmenter for OpenCvSegmenter {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn largest_blob(&mut self, image: &RgbImage, bounds: &HsvBounds) -> Result<Option<Blob>> {
        let (width, height) = image.dimensions();
        let data = image.as_raw();
        // The header borrows `image` and is dropped before it.
        let src = unsafe {
            Mat::new_rows_cols_with_data_unsafe(
                height as i32,
                width as i32,
                core::CV_8UC3,
                data.as_ptr() as *mut _,
                core::Mat_AUTO_STEP,
            )
        }
        .context("wrap frame for opencv")?;

        imgproc::gaussian_blur(
            &src,
            &mut self.blurred,
            Size::new(BLUR_KERNEL, BLUR_KERNEL),
            0.0,
            0.0,
            core::BORDER_DEFAULT,
            core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;
        imgproc::cvt_color(
            &self.blurred,
            &mut self.hsv,
            imgproc::COLOR_RGB2HSV,
            0,
            core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;
        core::in_range(
            &self.hsv,
            &scalar(bounds.lower()),
            &scalar(bounds.upper()),
            &mut self.mask,
        )?;

        let kernel = Mat::default();
        let border = imgproc::morphology_default_border_value()?;
        imgproc::erode(
            &self.mask,
            &mut self.eroded,
            &kernel,
            Point::new(-1, -1),
            MORPH_ITERATIONS as i32,
            core::BORDER_CONSTANT,
            border,
        )?;
        imgproc::dilate(
            &self.eroded,
            &mut self.mask,
            &kernel,
            Point::new(-1, -1),
            MORPH_ITERATIONS as i32,
            core::BORDER_CONSTANT,
            border,
        )?;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours(
            &self.mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut largest: Option<(f64, Vector<Point>)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if largest.as_ref().map_or(true, |(best, _)| area > *best) {
                largest = Some((area, contour));
            }
        }
        let Some((area, contour)) = largest else {
            return Ok(None);
        };

        let m = imgproc::moments(&contour, false)?;
        let mut center = Point2f::default();
        let mut radius = 0f32;
        imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;
        Ok(Some(Blob {
            area,
            moments: Moments {
                m00: m.m00,
                m10: m.m10,
                m01: m.m01,
            },
            circle: Circle {
                x: center.x as f64,
                y: center.y as f64,
                radius: radius as f64,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::backends::CpuSegmenter;
    use image::Rgb;

    #[test]
    fn agrees_with_cpu_backend_on_a_disc() {
        let image = RgbImage::from_fn(320, 240, |x, y| {
            let (dx, dy) = (x as i32 - 200, y as i32 - 80);
            if dx * dx + dy * dy <= 40 * 40 {
                Rgb([0, 255, 0])
            } else {
                Rgb([30, 30, 30])
            }
        });
        let bounds = HsvBounds::green();
        let cv = OpenCvSegmenter::new()
            .largest_blob(&image, &bounds)
            .unwrap()
            .expect("opencv blob");
        let cpu = CpuSegmenter
            .largest_blob(&image, &bounds)
            .unwrap()
            .expect("cpu blob");

        let (a, b) = (cv.moments.centroid().unwrap(), cpu.moments.centroid().unwrap());
        assert!((a.0 - b.0).abs() < 1.0 && (a.1 - b.1).abs() < 1.0);
        assert!((cv.circle.radius - cpu.circle.radius).abs() < 2.0);
    }
}
