// dfngen - A Rust implementation of a layered fracture network growth model
// Copyright (C) 2026 Julian Jeggle, Raphael Wittkowski

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Geometric primitives: points, fracture-plane frames, polygon construction
//! and the azimuth arithmetic shared by the implicit and explicit phases.
//!
//! Azimuths are angles in radians measured counterclockwise from the grid
//! x-axis. Fracture *strike* azimuths are line orientations, i.e. only defined
//! modulo pi.

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

/// A point (or displacement) in grid coordinates, z up, metres
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Point3 {
        Point3 { x, y, z }
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        let d = *other - *self;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    pub fn distance_xy(&self, other: &Point3) -> f64 {
        let (dx, dy) = (other.x - self.x, other.y - self.y);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point3) -> Point3 {
        Point3::new(
            0.5 * (self.x + other.x),
            0.5 * (self.y + other.y),
            0.5 * (self.z + other.z),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;
    fn mul(self, s: f64) -> Point3 {
        Point3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Horizontal unit vector along a strike azimuth
pub fn strike_vector(azimuth: f64) -> Point3 {
    Point3::new(azimuth.cos(), azimuth.sin(), 0.)
}

/// Horizontal unit normal of a vertical plane with the given strike azimuth
pub fn normal_vector(azimuth: f64) -> Point3 {
    Point3::new(-azimuth.sin(), azimuth.cos(), 0.)
}

/// Fold an angle into `[0, pi)` (line orientations are defined modulo pi)
pub fn fold_azimuth(azimuth: f64) -> f64 {
    let mut a = azimuth % PI;
    if a < 0. {
        a += PI;
    }
    a
}

/// Smallest angle between two line orientations, in `[0, pi/2]`
pub fn azimuth_difference(a: f64, b: f64) -> f64 {
    let d = (fold_azimuth(a) - fold_azimuth(b)).abs();
    d.min(PI - d)
}

/// Average a set of line orientations
///
/// Angles are folded one by one into a half-turn window centred on the
/// dominant direction of the already-accumulated samples (x-axis while the
/// cosine sum dominates, y-axis otherwise) and the mean is then
/// `atan(sum sin / sum cos)`. Non-finite samples are skipped; returns `None`
/// if no finite sample exists.
pub fn mean_azimuth(samples: &[f64]) -> Option<f64> {
    let mut sum_sin: f64 = 0.;
    let mut sum_cos: f64 = 0.;
    let mut count = 0usize;
    for &raw in samples {
        if !raw.is_finite() {
            continue;
        }
        let centre = if count == 0 || sum_cos.abs() >= sum_sin.abs() {
            0.
        } else {
            0.5 * PI
        };
        // Fold into [centre - pi/2, centre + pi/2)
        let mut a = raw;
        while a < centre - 0.5 * PI {
            a += PI;
        }
        while a >= centre + 0.5 * PI {
            a -= PI;
        }
        sum_sin += a.sin();
        sum_cos += a.cos();
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let mean = if sum_cos.abs() < 1e-300 {
        0.5 * PI
    } else {
        (sum_sin / sum_cos).atan()
    };
    Some(fold_azimuth(mean))
}

/// Cornerpoints of a penny-shaped fracture in a vertical plane
///
/// Samples `n` points counterclockwise around the circle, starting on the
/// strike axis. `n < 3` yields an empty list (centre + radius representation).
pub fn circle_cornerpoints(centre: Point3, radius: f64, strike_azimuth: f64, n: usize) -> Vec<Point3> {
    if n < 3 {
        return Vec::new();
    }
    let u = strike_vector(strike_azimuth);
    (0..n)
        .map(|k| {
            let phi = 2. * PI * (k as f64) / (n as f64);
            centre + u * (radius * phi.cos()) + Point3::new(0., 0., radius * phi.sin())
        })
        .collect()
}

/// Split a quadrilateral into two triangles sharing the 0-2 diagonal
pub fn triangulate_quad(corners: &[Point3; 4]) -> [[Point3; 3]; 2] {
    [
        [corners[0], corners[1], corners[2]],
        [corners[0], corners[2], corners[3]],
    ]
}

/// Fan triangulation of a polygon around its centre point
pub fn fan_triangles(centre: Point3, ring: &[Point3]) -> Vec<[Point3; 3]> {
    let n = ring.len();
    (0..n).map(|i| [centre, ring[i], ring[(i + 1) % n]]).collect()
}

/// Intersection of two segments in map view
///
/// Returns the parameter along `p1->p2` and the intersection point (with z
/// interpolated along the first segment) if the segments cross strictly
/// within both spans.
pub fn segment_intersection_xy(p1: Point3, p2: Point3, q1: Point3, q2: Point3) -> Option<(f64, Point3)> {
    let r = (p2.x - p1.x, p2.y - p1.y);
    let s = (q2.x - q1.x, q2.y - q1.y);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() < 1e-300 {
        return None;
    }
    let qp = (q1.x - p1.x, q1.y - p1.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
    if t < 0. || t > 1. || u < 0. || u > 1. {
        return None;
    }
    Some((t, p1 + (p2 - p1) * t))
}

/// Perpendicular (normal-direction) distance between a point and the trace of
/// a vertical fracture through `origin` with the given strike azimuth
pub fn normal_distance_xy(point: Point3, origin: Point3, strike_azimuth: f64) -> f64 {
    let n = normal_vector(strike_azimuth);
    ((point.x - origin.x) * n.x + (point.y - origin.y) * n.y).abs()
}

/// Signed coordinate of a point along a strike direction from an origin
pub fn along_strike_xy(point: Point3, origin: Point3, strike_azimuth: f64) -> f64 {
    let u = strike_vector(strike_azimuth);
    (point.x - origin.x) * u.x + (point.y - origin.y) * u.y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_and_difference() {
        assert!((fold_azimuth(-0.25 * PI) - 0.75 * PI).abs() < 1e-12);
        assert!((azimuth_difference(0.1, PI + 0.1)).abs() < 1e-12);
        assert!((azimuth_difference(0., 0.5 * PI) - 0.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn mean_azimuth_simple() {
        let m = mean_azimuth(&[0.1, 0.2, 0.3]).unwrap();
        assert!((m - 0.2).abs() < 1e-12);
    }

    #[test]
    fn mean_azimuth_wraps_around_pi() {
        // Orientations clustered around the x-axis from both sides of the
        // fold must not average to pi/2.
        let m = mean_azimuth(&[0.05, PI - 0.05]).unwrap();
        assert!(m < 0.1 || m > PI - 0.1, "mean was {}", m);
    }

    #[test]
    fn mean_azimuth_skips_non_finite() {
        let m = mean_azimuth(&[f64::NAN, 0.4, f64::INFINITY]).unwrap();
        assert!((m - 0.4).abs() < 1e-12);
        assert!(mean_azimuth(&[f64::NAN]).is_none());
        assert!(mean_azimuth(&[]).is_none());
    }

    #[test]
    fn circle_cornerpoints_stay_in_plane() {
        let c = Point3::new(10., 5., -1000.);
        let az = 0.3;
        let pts = circle_cornerpoints(c, 2., az, 8);
        assert_eq!(pts.len(), 8);
        let n = normal_vector(az);
        for p in &pts {
            let d = (p.x - c.x) * n.x + (p.y - c.y) * n.y;
            assert!(d.abs() < 1e-12);
            assert!((p.distance(&c) - 2.).abs() < 1e-12);
        }
        assert!(circle_cornerpoints(c, 2., az, 0).is_empty());
    }

    #[test]
    fn segment_intersection() {
        let p1 = Point3::new(0., 0., 0.);
        let p2 = Point3::new(2., 0., 0.);
        let q1 = Point3::new(1., -1., 0.);
        let q2 = Point3::new(1., 1., 0.);
        let (t, ix) = segment_intersection_xy(p1, p2, q1, q2).unwrap();
        assert!((t - 0.5).abs() < 1e-12);
        assert!((ix.x - 1.).abs() < 1e-12);
        // Parallel segments do not intersect
        assert!(segment_intersection_xy(p1, p2, Point3::new(0., 1., 0.), Point3::new(2., 1., 0.)).is_none());
        // Out-of-span crossing is rejected
        assert!(segment_intersection_xy(p1, p2, Point3::new(5., -1., 0.), Point3::new(5., 1., 0.)).is_none());
    }

    #[test]
    fn triangulation_covers_quad() {
        let q = [
            Point3::new(0., 0., 0.),
            Point3::new(1., 0., 0.),
            Point3::new(1., 1., 0.),
            Point3::new(0., 1., 0.),
        ];
        let tris = triangulate_quad(&q);
        assert_eq!(tris[0][2], tris[1][1]);
        let ring = circle_cornerpoints(Point3::new(0., 0., 0.), 1., 0., 6);
        assert_eq!(fan_triangles(Point3::new(0., 0., 0.), &ring).len(), 6);
    }
}
