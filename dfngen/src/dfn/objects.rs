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

//! Explicit DFN object model: microfracture polygons, macrofracture segment
//! chains, relay zones and the per-stage network container
//!
//! Fracture segments refer to their parent by position in the stage's
//! macrofracture list; relay zones link two macrofractures by index pair.

use crate::dipset::FractureMode;
use crate::geometry::{fan_triangles, triangulate_quad, Point3};

/// Terminal state of one macrofracture tip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TipState {
    /// Still propagating at the stage time
    Active,
    /// Entered the stress shadow of a parallel fracture
    RelayTerminated,
    /// Crossed a non-parallel fracture
    IntersectTerminated,
    /// Stopped at a faulted or inconsistent cell boundary
    BoundaryCropped,
    /// Ran out of propagation history while still active
    Completed,
}

/// One polygonal or triangular patch with its mean aperture
#[derive(Clone, Debug)]
pub struct Patch {
    pub vertices: Vec<Point3>,
    pub aperture: f64,
}

/// One quadrilateral macrofracture segment
///
/// Corner order is top-near, top-far, base-far, base-near, where "near" is
/// the side closer to the nucleation point.
#[derive(Clone, Debug)]
pub struct FractureSegment {
    pub corners: [Point3; 4],
    pub aperture: f64,
    /// Cell the segment lies in
    pub cell: (usize, usize),
    /// Simulation time at which the far edge was reached, s
    pub emitted_time: f64,
}

/// A penny-shaped microfracture
#[derive(Clone, Debug)]
pub struct MicrofractureObject {
    pub centre: Point3,
    pub radius: f64,
    pub orientation: usize,
    pub mode: FractureMode,
    pub strike_azimuth: f64,
    pub aperture: f64,
    /// Sampled polygon ring; empty when only centre + radius are recorded
    pub cornerpoints: Vec<Point3>,
    pub cell: (usize, usize),
}

impl MicrofractureObject {
    /// Output patches (polygon ring or centre-fan triangles)
    pub fn patches(&self, triangular: bool) -> Vec<Patch> {
        if self.cornerpoints.is_empty() {
            return Vec::new();
        }
        if triangular {
            fan_triangles(self.centre, &self.cornerpoints)
                .into_iter()
                .map(|t| Patch { vertices: t.to_vec(), aperture: self.aperture })
                .collect()
        } else {
            vec![Patch { vertices: self.cornerpoints.clone(), aperture: self.aperture }]
        }
    }
}

/// A layer-bound macrofracture as an ordered chain of segments per
/// propagation direction
#[derive(Clone, Debug)]
pub struct MacrofractureObject {
    pub orientation: usize,
    pub mode: FractureMode,
    pub nucleation_time: f64,
    pub nucleation_cell: (usize, usize),
    pub nucleation_point: Point3,
    pub strike_azimuth: f64,
    /// Segment chains for the two propagation directions
    pub segments: [Vec<FractureSegment>; 2],
    pub tips: [TipState; 2],
    /// Tip positions at the stage time
    pub tip_positions: [Point3; 2],
}

impl MacrofractureObject {
    /// Tip-to-tip centreline polyline through the nucleation point
    pub fn centreline(&self) -> Vec<Point3> {
        let far_mid =
            |s: &FractureSegment| s.corners[1].midpoint(&s.corners[2]);
        let mut line: Vec<Point3> = self.segments[0].iter().rev().map(far_mid).collect();
        line.push(self.nucleation_point);
        line.extend(self.segments[1].iter().map(far_mid));
        line
    }

    /// Tip-to-tip length in map view, m
    pub fn total_length(&self) -> f64 {
        self.segments
            .iter()
            .flatten()
            .map(|s| {
                let near = s.corners[0].midpoint(&s.corners[3]);
                let far = s.corners[1].midpoint(&s.corners[2]);
                near.distance_xy(&far)
            })
            .sum()
    }

    /// Output patches of all segments
    pub fn patches(&self, triangular: bool) -> Vec<Patch> {
        let mut out = Vec::new();
        for segment in self.segments.iter().flatten() {
            if triangular {
                for t in triangulate_quad(&segment.corners).iter() {
                    out.push(Patch { vertices: t.to_vec(), aperture: segment.aperture });
                }
            } else {
                out.push(Patch {
                    vertices: segment.corners.to_vec(),
                    aperture: segment.aperture,
                });
            }
        }
        out
    }
}

/// Relay-zone patch topologically linking two shadow-interacting fractures
#[derive(Clone, Debug)]
pub struct RelayZone {
    pub corners: [Point3; 4],
    pub aperture: f64,
    /// Index of the relay-terminated fracture in the stage's list
    pub from_fracture: usize,
    /// Index of the fracture whose shadow was entered
    pub to_fracture: usize,
}

/// The explicit fracture network at one growth stage
#[derive(Clone, Debug)]
pub struct GlobalDFN {
    /// Simulation time of this stage, s
    pub stage_time: f64,
    pub microfractures: Vec<MicrofractureObject>,
    pub macrofractures: Vec<MacrofractureObject>,
    pub relay_zones: Vec<RelayZone>,
    /// Whether patches are emitted as triangles
    pub triangular: bool,
}

impl GlobalDFN {
    pub fn fracture_count(&self) -> usize {
        self.microfractures.len() + self.macrofractures.len()
    }

    /// Total macrofracture area (both faces counted once), m^2
    pub fn total_macrofracture_area(&self) -> f64 {
        self.macrofractures
            .iter()
            .map(|f| {
                f.segments
                    .iter()
                    .flatten()
                    .map(|s| {
                        let w = s.corners[0].distance_xy(&s.corners[1]);
                        let h = s.corners[0].z - s.corners[3].z;
                        w * h
                    })
                    .sum::<f64>()
            })
            .sum()
    }

    /// All patches of every fracture in deterministic order
    pub fn patches(&self) -> Vec<Patch> {
        let mut out = Vec::new();
        for f in &self.microfractures {
            out.extend(f.patches(self.triangular));
        }
        for f in &self.macrofractures {
            out.extend(f.patches(self.triangular));
        }
        for r in &self.relay_zones {
            if self.triangular {
                for t in triangulate_quad(&r.corners).iter() {
                    out.push(Patch { vertices: t.to_vec(), aperture: r.aperture });
                }
            } else {
                out.push(Patch { vertices: r.corners.to_vec(), aperture: r.aperture });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(x0: f64, x1: f64) -> [Point3; 4] {
        [
            Point3::new(x0, 0., 0.),
            Point3::new(x1, 0., 0.),
            Point3::new(x1, 0., -10.),
            Point3::new(x0, 0., -10.),
        ]
    }

    fn fracture() -> MacrofractureObject {
        MacrofractureObject {
            orientation: 0,
            mode: FractureMode::Mode1,
            nucleation_time: 1.,
            nucleation_cell: (0, 0),
            nucleation_point: Point3::new(0., 0., -5.),
            strike_azimuth: 0.,
            segments: [
                vec![FractureSegment {
                    corners: quad(0., -4.),
                    aperture: 1e-4,
                    cell: (0, 0),
                    emitted_time: 2.,
                }],
                vec![FractureSegment {
                    corners: quad(0., 6.),
                    aperture: 1e-4,
                    cell: (0, 0),
                    emitted_time: 2.,
                }],
            ],
            tips: [TipState::Active, TipState::Active],
            tip_positions: [Point3::new(-4., 0., -5.), Point3::new(6., 0., -5.)],
        }
    }

    #[test]
    fn length_and_area() {
        let f = fracture();
        assert!((f.total_length() - 10.).abs() < 1e-9);
        let dfn = GlobalDFN {
            stage_time: 10.,
            microfractures: vec![],
            macrofractures: vec![f],
            relay_zones: vec![],
            triangular: false,
        };
        assert!((dfn.total_macrofracture_area() - 100.).abs() < 1e-9);
        assert_eq!(dfn.fracture_count(), 1);
    }

    #[test]
    fn centreline_spans_both_directions() {
        let f = fracture();
        let line = f.centreline();
        assert_eq!(line.len(), 3);
        // Ordered tip of direction 0 -> nucleation -> tip of direction 1
        let xs: Vec<f64> = line.iter().map(|p| p.x).collect();
        assert!(xs.contains(&-4.) && xs.contains(&0.) && xs.contains(&6.));
    }

    #[test]
    fn triangulation_doubles_quads() {
        let f = fracture();
        assert_eq!(f.patches(false).len(), 2);
        assert_eq!(f.patches(true).len(), 4);
        for p in f.patches(true) {
            assert_eq!(p.vertices.len(), 3);
        }
    }
}
