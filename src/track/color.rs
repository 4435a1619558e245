use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;
use serde::{Deserialize, Serialize};

/// 8-bit HSV triple. Hue is in half-degrees (0..=179), saturation and value in 0..=255.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

/// Inclusive lower/upper HSV bounds of the target color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvBounds {
    lower: Hsv,
    upper: Hsv,
}

impl HsvBounds {
    pub fn new(lower: Hsv, upper: Hsv) -> Result<Self> {
        if lower.h > 179 || upper.h > 179 {
            return Err(anyhow!("hue bounds must be within 0..=179"));
        }
        if lower.h > upper.h || lower.s > upper.s || lower.v > upper.v {
            return Err(anyhow!(
                "lower bound {:?} exceeds upper bound {:?}",
                lower,
                upper
            ));
        }
        Ok(Self { lower, upper })
    }

    /// Bright green target.
    pub const fn green() -> Self {
        Self {
            lower: Hsv::new(50, 50, 50),
            upper: Hsv::new(70, 255, 255),
        }
    }

    pub fn lower(&self) -> Hsv {
        self.lower
    }

    pub fn upper(&self) -> Hsv {
        self.upper
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&hsv.h)
            && (self.lower.s..=self.upper.s).contains(&hsv.s)
            && (self.lower.v..=self.upper.v).contains(&hsv.v)
    }
}

impl Default for HsvBounds {
    fn default() -> Self {
        Self::green()
    }
}

/// Convert one pixel to 8-bit HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = (max - min) as f32;

    let s = if max == 0 {
        0
    } else {
        (255.0 * diff / max as f32).round() as u8
    };
    if diff == 0.0 {
        return Hsv::new(0, s, max);
    }

    let (r, g, b) = (r as f32, g as f32, b as f32);
    let mut degrees = if max as f32 == r {
        60.0 * (g - b) / diff
    } else if max as f32 == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if degrees < 0.0 {
        degrees += 360.0;
    }
    let h = (degrees / 2.0).round() as u32 % 180;
    Hsv::new(h as u8, s, max)
}

/// Binary mask (255 = inside) of pixels whose HSV value lies within `bounds`.
pub fn in_range(image: &RgbImage, bounds: &HsvBounds) -> GrayImage {
    map_colors(image, |Rgb([r, g, b])| {
        if bounds.contains(rgb_to_hsv(r, g, b)) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_map_to_expected_hues() {
        assert_eq!(rgb_to_hsv(255, 0, 0), Hsv::new(0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), Hsv::new(60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), Hsv::new(120, 255, 255));
        assert_eq!(rgb_to_hsv(255, 0, 255), Hsv::new(150, 255, 255));
    }

    #[test]
    fn gray_has_no_saturation() {
        assert_eq!(rgb_to_hsv(30, 30, 30), Hsv::new(0, 0, 30));
        assert_eq!(rgb_to_hsv(0, 0, 0), Hsv::new(0, 0, 0));
    }

    #[test]
    fn bounds_are_inclusive() {
        let bounds = HsvBounds::green();
        assert!(bounds.contains(Hsv::new(50, 50, 50)));
        assert!(bounds.contains(Hsv::new(70, 255, 255)));
        assert!(!bounds.contains(Hsv::new(49, 255, 255)));
        assert!(!bounds.contains(Hsv::new(60, 49, 255)));
    }

    #[test]
    fn bounds_validate_ordering() {
        assert!(HsvBounds::new(Hsv::new(70, 0, 0), Hsv::new(50, 255, 255)).is_err());
        assert!(HsvBounds::new(Hsv::new(0, 0, 0), Hsv::new(180, 255, 255)).is_err());
        assert!(HsvBounds::new(Hsv::new(29, 86, 6), Hsv::new(64, 255, 255)).is_ok());
    }

    #[test]
    fn in_range_selects_green_pixels() {
        let mut image = RgbImage::from_pixel(4, 1, image::Rgb([30, 30, 30]));
        image.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        image.put_pixel(2, 0, image::Rgb([0, 0, 255]));
        let mask = in_range(&image, &HsvBounds::green());
        assert_eq!(mask.into_raw(), vec![0, 255, 0, 0]);
    }
}
