use anyhow::Result;
use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::open;
use imageproc::point::Point;

use crate::track::backend::{Blob, Segmenter, BLUR_SIGMA, MORPH_ITERATIONS};
use crate::track::color::{in_range, HsvBounds};
use crate::track::geometry::{Circle, Moments};

/// Segmentation on `imageproc`. Needs no native libraries.
pub struct CpuSegmenter;

impl Segmenter for CpuSegmenter {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn largest_blob(&mut self, image: &RgbImage, bounds: &HsvBounds) -> Result<Option<Blob>> {
        let blurred = gaussian_blur_f32(image, BLUR_SIGMA);
        let mask = open(&in_range(&blurred, bounds), Norm::LInf, MORPH_ITERATIONS);

        // Outer borders without a parent: regions inside another region's hole are skipped.
        let mut largest: Option<(Moments, Vec<Point<i32>>)> = None;
        for contour in find_contours::<i32>(&mask) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            let moments = Moments::of_polygon(&contour.points);
            if largest
                .as_ref()
                .map_or(true, |(best, _)| moments.m00 > best.m00)
            {
                largest = Some((moments, contour.points));
            }
        }

        Ok(largest.map(|(moments, points)| Blob {
            area: moments.m00,
            moments,
            circle: Circle::enclosing(&points),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    fn paint(width: u32, height: u32, inside: impl Fn(i32, i32) -> bool) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if inside(x as i32, y as i32) {
                GREEN
            } else {
                BACKGROUND
            }
        })
    }

    #[test]
    fn blank_frame_has_no_blob() {
        let image = paint(64, 48, |_, _| false);
        let blob = CpuSegmenter
            .largest_blob(&image, &HsvBounds::green())
            .unwrap();
        assert!(blob.is_none());
    }

    #[test]
    fn opening_removes_specks() {
        let image = paint(64, 48, |x, y| (x, y) == (10, 10) || (x, y) == (40, 30));
        let blob = CpuSegmenter
            .largest_blob(&image, &HsvBounds::green())
            .unwrap();
        assert!(blob.is_none());
    }

    #[test]
    fn disc_blob_is_centered_with_matching_radius() {
        let image = paint(160, 120, |x, y| (x - 90).pow(2) + (y - 50).pow(2) <= 25 * 25);
        let blob = CpuSegmenter
            .largest_blob(&image, &HsvBounds::green())
            .unwrap()
            .expect("blob");
        let (cx, cy) = blob.moments.centroid().unwrap();
        assert!((cx - 90.0).abs() < 1.0 && (cy - 50.0).abs() < 1.0);
        // The blur widens the thresholded disc by a few pixels.
        assert!(blob.circle.radius >= 25.0 && blob.circle.radius < 30.0, "{:?}", blob.circle);
        assert!(blob.area > 1900.0 && blob.area < 2800.0, "{}", blob.area);
    }

    #[test]
    fn regions_inside_holes_are_ignored() {
        // Thick green ring around a smaller green square sitting in its hole.
        let image = paint(120, 120, |x, y| {
            let ring = (10..110).contains(&x)
                && (10..110).contains(&y)
                && !((25..95).contains(&x) && (25..95).contains(&y));
            let core = (45..75).contains(&x) && (45..75).contains(&y);
            ring || core
        });
        let blob = CpuSegmenter
            .largest_blob(&image, &HsvBounds::green())
            .unwrap()
            .expect("blob");
        assert!(blob.circle.radius > 60.0, "{:?}", blob.circle);
        let (cx, cy) = blob.moments.centroid().unwrap();
        assert!((cx - 59.5).abs() < 1.5 && (cy - 59.5).abs() < 1.5);
    }
}
