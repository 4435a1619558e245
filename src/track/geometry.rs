//! Shape measures of a traced contour: polygon moments and the minimum enclosing circle.

use imageproc::geometry::convex_hull;
use imageproc::point::Point;

/// Spatial moments of a contour polygon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Polygon moments via Green's theorem, normalized to a positive `m00`.
    pub fn of_polygon(points: &[Point<i32>]) -> Self {
        let n = points.len();
        if n < 3 {
            return Self::default();
        }
        let (mut a, mut mx, mut my) = (0f64, 0f64, 0f64);
        for i in 0..n {
            let p0 = points[i];
            let p1 = points[(i + 1) % n];
            let (x0, y0, x1, y1) = (p0.x as f64, p0.y as f64, p1.x as f64, p1.y as f64);
            let cross = x0 * y1 - x1 * y0;
            a += cross;
            mx += (x0 + x1) * cross;
            my += (y0 + y1) * cross;
        }
        let sign = if a < 0.0 { -1.0 } else { 1.0 };
        Self {
            m00: sign * a / 2.0,
            m10: sign * mx / 6.0,
            m01: sign * my / 6.0,
        }
    }

    /// Area-weighted center, `None` for a degenerate (zero-area) shape.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Circle {
    /// Smallest circle containing every point.
    pub fn enclosing(points: &[Point<i32>]) -> Self {
        let hull: Vec<(f64, f64)> = convex_hull(points)
            .into_iter()
            .map(|p| (p.x as f64, p.y as f64))
            .collect();
        min_enclosing_circle(&hull)
    }

    fn contains(&self, p: (f64, f64)) -> bool {
        let dx = p.0 - self.x;
        let dy = p.1 - self.y;
        (dx * dx + dy * dy).sqrt() <= self.radius + 1e-7
    }
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> Circle {
    let x = (a.0 + b.0) / 2.0;
    let y = (a.1 + b.1) / 2.0;
    let radius = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() / 2.0;
    Circle { x, y, radius }
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Circle {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-12 {
        // Collinear: the widest pair spans the others.
        return [circle_from_two(a, c), circle_from_two(b, c)]
            .into_iter()
            .fold(circle_from_two(a, b), |best, c| {
                if c.radius > best.radius {
                    c
                } else {
                    best
                }
            });
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let x = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let y = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    let radius = ((a.0 - x).powi(2) + (a.1 - y).powi(2)).sqrt();
    Circle { x, y, radius }
}

/// Incremental minimum enclosing circle over a fixed pseudo-random permutation.
fn min_enclosing_circle(points: &[(f64, f64)]) -> Circle {
    let Some(&first) = points.first() else {
        return Circle {
            x: 0.0,
            y: 0.0,
            radius: 0.0,
        };
    };

    let mut pts = points.to_vec();
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in (1..pts.len()).rev() {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        pts.swap(i, (seed % (i as u64 + 1)) as usize);
    }

    let mut circle = Circle {
        x: first.0,
        y: first.1,
        radius: 0.0,
    };
    for i in 0..pts.len() {
        if circle.contains(pts[i]) {
            continue;
        }
        circle = Circle {
            x: pts[i].0,
            y: pts[i].1,
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(pts[j]) {
                continue;
            }
            circle = circle_from_two(pts[i], pts[j]);
            for k in 0..j {
                if !circle.contains(pts[k]) {
                    circle = circle_from_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    circle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(raw: &[(i32, i32)]) -> Vec<Point<i32>> {
        raw.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn square_moments() {
        let square = points(&[(1, 1), (4, 1), (4, 4), (1, 4)]);
        let m = Moments::of_polygon(&square);
        assert_eq!(m.m00, 9.0);
        let (cx, cy) = m.centroid().unwrap();
        assert!((cx - 2.5).abs() < 1e-9 && (cy - 2.5).abs() < 1e-9);
    }

    #[test]
    fn winding_does_not_change_sign() {
        let cw = points(&[(0, 0), (0, 2), (2, 2), (2, 0)]);
        let ccw = points(&[(0, 0), (2, 0), (2, 2), (0, 2)]);
        assert_eq!(Moments::of_polygon(&cw), Moments::of_polygon(&ccw));
    }

    #[test]
    fn lines_and_points_are_degenerate() {
        assert!(Moments::of_polygon(&points(&[(3, 3)])).centroid().is_none());
        let line = points(&[(0, 0), (1, 0), (2, 0), (3, 0), (2, 0), (1, 0)]);
        assert!(Moments::of_polygon(&line).centroid().is_none());
    }

    #[test]
    fn enclosing_circle_of_square() {
        let circle = Circle::enclosing(&points(&[(0, 0), (4, 0), (4, 4), (0, 4)]));
        assert!((circle.x - 2.0).abs() < 1e-9);
        assert!((circle.y - 2.0).abs() < 1e-9);
        assert!((circle.radius - 8f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn enclosing_circle_of_collinear_points() {
        let circle = min_enclosing_circle(&[(0.0, 0.0), (1.0, 0.0), (4.0, 0.0), (2.0, 0.0)]);
        assert!((circle.x - 2.0).abs() < 1e-9);
        assert!((circle.radius - 2.0).abs() < 1e-9);
    }

    #[test]
    fn enclosing_circle_covers_all_points() {
        let raw: Vec<(i32, i32)> = (0..50).map(|i| ((i * 7) % 23, (i * 11) % 17)).collect();
        let circle = Circle::enclosing(&points(&raw));
        for (x, y) in raw {
            assert!(circle.contains((x as f64, y as f64)));
        }
    }

    #[test]
    fn empty_input_gives_zero_circle() {
        assert_eq!(Circle::enclosing(&[]).radius, 0.0);
    }
}
