//! Display overlays drawn onto a copy of the tracked frame.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

pub const CIRCLE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Circle outline, `thickness` pixels wide, growing outwards.
pub fn draw_circle(
    image: &mut RgbImage,
    center: (i32, i32),
    radius: i32,
    color: Rgb<u8>,
    thickness: i32,
) {
    for ring in 0..thickness.max(1) {
        draw_hollow_circle_mut(image, center, radius + ring, color);
    }
}

pub fn fill_circle(image: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    draw_filled_circle_mut(image, center, radius, color);
}

/// Line stamped with a square brush.
pub fn draw_line(
    image: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    color: Rgb<u8>,
    thickness: i32,
) {
    let brush = (thickness.max(1) - 1) / 2;
    for dy in -brush..=brush {
        for dx in -brush..=brush {
            draw_line_segment_mut(
                image,
                ((from.0 + dx) as f32, (from.1 + dy) as f32),
                ((to.0 + dx) as f32, (to.1 + dy) as f32),
                color,
            );
        }
    }
}

/// Line with two tip strokes at 45 degrees, each a tenth of the line length.
pub fn draw_arrow(
    image: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    color: Rgb<u8>,
    thickness: i32,
) {
    draw_line(image, from, to, color, thickness);
    let (fx, fy) = (from.0 as f64, from.1 as f64);
    let (tx, ty) = (to.0 as f64, to.1 as f64);
    let tip = ((fx - tx).powi(2) + (fy - ty).powi(2)).sqrt() * 0.1;
    let angle = (fy - ty).atan2(fx - tx);
    for side in [std::f64::consts::FRAC_PI_4, -std::f64::consts::FRAC_PI_4] {
        let end = (
            (tx + tip * (angle + side).cos()).round() as i32,
            (ty + tip * (angle + side).sin()).round() as i32,
        );
        draw_line(image, to, end, color, thickness);
    }
}
