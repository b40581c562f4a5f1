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

//! One cell of the fracture grid: geometry, resolved properties, the owned
//! stress state and fracture sets, and the per-cell implicit solver loop.
//!
//! Cell footprints are convex quadrilaterals given by four top and four base
//! cornerpoints in counterclockwise order (SW, SE, NE, NW). Edge `i` connects
//! footprint corner `i` to corner `i+1`: 0 south, 1 east, 2 north, 3 west.

use std::f64::consts::PI;

use log::{debug, warn};
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::dipset::{FractureDipSet, FractureMode, NucleationPolicy, ShadowContext, TerminationReason, TimestepRecord};
use crate::error::{DfnError, Result};
use crate::fracture_set::GridblockFractureSet;
use crate::geometry::{mean_azimuth, Point3};
use crate::properties::{ApertureModel, MechanicalProperties};
use crate::stress::{StressDistribution, StressStrainState};

/// Eight cornerpoints of a cell (four top, four base)
#[derive(Clone, Debug)]
pub struct CellGeometry {
    pub top_corners: [Point3; 4],
    pub base_corners: [Point3; 4],
}

impl CellGeometry {
    pub fn new(top_corners: [Point3; 4], base_corners: [Point3; 4]) -> CellGeometry {
        CellGeometry { top_corners, base_corners }
    }

    /// Mean vertical separation of the four top/base pairs, m
    pub fn thickness(&self) -> f64 {
        self.top_corners
            .iter()
            .zip(self.base_corners.iter())
            .map(|(t, b)| t.z - b.z)
            .sum::<f64>()
            / 4.
    }

    /// Mean depth of the layer midplane below datum, m (positive down)
    pub fn depth(&self) -> f64 {
        let mid: f64 = self
            .top_corners
            .iter()
            .zip(self.base_corners.iter())
            .map(|(t, b)| 0.5 * (t.z + b.z))
            .sum::<f64>()
            / 4.;
        -mid
    }

    pub fn mean_top_z(&self) -> f64 {
        self.top_corners.iter().map(|p| p.z).sum::<f64>() / 4.
    }

    pub fn mean_base_z(&self) -> f64 {
        self.base_corners.iter().map(|p| p.z).sum::<f64>() / 4.
    }

    /// Map-view footprint area by the shoelace formula, m^2
    pub fn footprint_area(&self) -> f64 {
        let c = &self.top_corners;
        let mut sum = 0.;
        for i in 0..4 {
            let j = (i + 1) % 4;
            sum += c[i].x * c[j].y - c[j].x * c[i].y;
        }
        0.5 * sum.abs()
    }

    pub fn volume(&self) -> f64 {
        self.footprint_area() * self.thickness()
    }

    /// In-plane extent: square root of the footprint area, m
    pub fn extent(&self) -> f64 {
        self.footprint_area().sqrt()
    }

    pub fn centre_xy(&self) -> (f64, f64) {
        let c = &self.top_corners;
        (
            c.iter().map(|p| p.x).sum::<f64>() / 4.,
            c.iter().map(|p| p.y).sum::<f64>() / 4.,
        )
    }

    /// Bilinear interpolation of the footprint for `u, v` in `[0, 1]`
    pub fn point_at(&self, u: f64, v: f64) -> (f64, f64) {
        let c = &self.top_corners;
        let x = (1. - u) * (1. - v) * c[0].x
            + u * (1. - v) * c[1].x
            + u * v * c[2].x
            + (1. - u) * v * c[3].x;
        let y = (1. - u) * (1. - v) * c[0].y
            + u * (1. - v) * c[1].y
            + u * v * c[2].y
            + (1. - u) * v * c[3].y;
        (x, y)
    }

    /// Point-in-convex-quad test in map view
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        let c = &self.top_corners;
        let mut sign = 0.;
        for i in 0..4 {
            let j = (i + 1) % 4;
            let cross = (c[j].x - c[i].x) * (y - c[i].y) - (c[j].y - c[i].y) * (x - c[i].x);
            if cross.abs() < 1e-12 {
                continue;
            }
            if sign == 0. {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// First footprint edge crossed by the segment `from -> to`, with the
    /// crossing parameter along the segment and the crossing point
    pub fn exit_edge(&self, from: (f64, f64), to: (f64, f64)) -> Option<(usize, f64, (f64, f64))> {
        let c = &self.top_corners;
        let mut best: Option<(usize, f64, (f64, f64))> = None;
        for i in 0..4 {
            let j = (i + 1) % 4;
            let (e1, e2) = ((c[i].x, c[i].y), (c[j].x, c[j].y));
            let r = (to.0 - from.0, to.1 - from.1);
            let s = (e2.0 - e1.0, e2.1 - e1.1);
            let denom = r.0 * s.1 - r.1 * s.0;
            if denom.abs() < 1e-300 {
                continue;
            }
            let qp = (e1.0 - from.0, e1.1 - from.1);
            let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
            let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
            if t > 1e-12 && t <= 1. && u >= 0. && u <= 1. {
                let pt = (from.0 + r.0 * t, from.1 + r.1 * t);
                if best.map(|(_, bt, _)| t < bt).unwrap_or(true) {
                    best = Some((i, t, pt));
                }
            }
        }
        best
    }

    /// Degeneracy check: all corners finite and thickness above the minimum
    pub fn validity_error(&self, min_thickness: f64) -> Option<String> {
        for p in self.top_corners.iter().chain(self.base_corners.iter()) {
            if !p.is_finite() {
                return Some("undefined cornerpoint".to_string());
            }
        }
        let h = self.thickness();
        if h <= 0. {
            return Some(format!("non-positive layer thickness {}", h));
        }
        if h < min_thickness {
            return Some(format!(
                "layer thickness {} below minimum {}",
                h, min_thickness
            ));
        }
        if self.footprint_area() <= 0. {
            return Some("degenerate footprint".to_string());
        }
        None
    }
}

/// Neighbor offset (row, col) for a footprint edge index
pub fn edge_neighbor_offset(edge: usize) -> (isize, isize) {
    match edge {
        0 => (-1, 0),
        1 => (0, 1),
        2 => (1, 0),
        _ => (0, -1),
    }
}

/// Edge index of the neighbor's side facing back at us
pub fn opposite_edge(edge: usize) -> usize {
    (edge + 2) % 4
}

/// One per-cell property as supplied by the host
///
/// `Default` falls through to the run-wide scalar default; `PerCell` carries
/// the values of the host's fine cells inside this gridblock, reduced by
/// averaging or by picking the representative (middle) sample.
#[derive(Clone, Debug)]
pub enum PropertySample {
    Default,
    Scalar(f64),
    PerCell(Vec<f64>),
}

impl PropertySample {
    /// Reduce to a single value; `true` in the second slot means the scalar
    /// default was used because no finite sample existed
    pub fn resolve(&self, default: f64, average: bool) -> (f64, bool) {
        match self {
            PropertySample::Default => (default, false),
            PropertySample::Scalar(v) => {
                if v.is_finite() {
                    (*v, false)
                } else {
                    (default, true)
                }
            }
            PropertySample::PerCell(values) => {
                let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
                if finite.is_empty() {
                    return (default, true);
                }
                if average {
                    (finite.iter().sum::<f64>() / finite.len() as f64, false)
                } else {
                    (finite[finite.len() / 2], false)
                }
            }
        }
    }

    /// Reduce an orientation sample with the folded-window circular mean
    pub fn resolve_azimuth(&self, default: f64, average: bool) -> (f64, bool) {
        match self {
            PropertySample::PerCell(values) if average => match mean_azimuth(values) {
                Some(m) => (m, false),
                None => (default, true),
            },
            other => other.resolve(default, average),
        }
    }
}

/// Full per-gridblock input record (spec'd data contract with the host)
#[derive(Clone, Debug)]
pub struct GridblockInput {
    pub geometry: CellGeometry,
    /// Faulted flags per footprint edge (south, east, north, west)
    pub edge_faulted: [bool; 4],
    pub thickness_override: Option<f64>,
    pub depth_override: Option<f64>,
    pub initial_density: PropertySample,
    pub size_exponent: PropertySample,
    pub subcritical_index: PropertySample,
    pub youngs_modulus: PropertySample,
    pub poisson_ratio: PropertySample,
    pub biot_coefficient: PropertySample,
    pub crack_surface_energy: PropertySample,
    pub friction_coefficient: PropertySample,
    pub rock_strain_relaxation: PropertySample,
    pub fracture_strain_relaxation: PropertySample,
    /// Azimuth of the minimum-strain axis, rad
    pub ehmin_azimuth: PropertySample,
    /// Strain rate along the minimum-strain axis, 1/s (extension negative)
    pub ehmin_rate: PropertySample,
    /// Strain rate along the maximum-strain axis, 1/s
    pub ehmax_rate: PropertySample,
    /// Average per-cell samples (true) or pick a representative cell (false)
    pub average_per_cell: bool,
}

impl GridblockInput {
    /// Input with defaults everywhere and a simple box geometry
    pub fn with_geometry(geometry: CellGeometry) -> GridblockInput {
        GridblockInput {
            geometry,
            edge_faulted: [false; 4],
            thickness_override: None,
            depth_override: None,
            initial_density: PropertySample::Default,
            size_exponent: PropertySample::Default,
            subcritical_index: PropertySample::Default,
            youngs_modulus: PropertySample::Default,
            poisson_ratio: PropertySample::Default,
            biot_coefficient: PropertySample::Default,
            crack_surface_energy: PropertySample::Default,
            friction_coefficient: PropertySample::Default,
            rock_strain_relaxation: PropertySample::Default,
            fracture_strain_relaxation: PropertySample::Default,
            ehmin_azimuth: PropertySample::Default,
            ehmin_rate: PropertySample::Default,
            ehmax_rate: PropertySample::Default,
            average_per_cell: true,
        }
    }

    /// Axis-aligned box helper used widely in tests and examples
    pub fn boxed(x0: f64, y0: f64, dx: f64, dy: f64, top_z: f64, thickness: f64) -> GridblockInput {
        let top = [
            Point3::new(x0, y0, top_z),
            Point3::new(x0 + dx, y0, top_z),
            Point3::new(x0 + dx, y0 + dy, top_z),
            Point3::new(x0, y0 + dy, top_z),
        ];
        let base = [
            Point3::new(x0, y0, top_z - thickness),
            Point3::new(x0 + dx, y0, top_z - thickness),
            Point3::new(x0 + dx, y0 + dy, top_z - thickness),
            Point3::new(x0, y0 + dy, top_z - thickness),
        ];
        GridblockInput::with_geometry(CellGeometry::new(top, base))
    }
}

/// Diagnostic events recorded per cell alongside its outputs
#[derive(Clone, Debug)]
pub enum CellEvent {
    /// Cell skipped at construction
    DegenerateCell(String),
    /// A property fell back to its scalar default (no finite sample)
    PropertyFallback(&'static str),
    /// The timestep required to satisfy the growth bound fell below the hard
    /// floor; the cell was terminated at this time
    TimestepFloor { time: f64 },
}

/// Run-wide controls of the implicit phase
#[derive(Clone, Debug)]
pub struct ImplicitControl {
    /// Number of microfracture radius bins (constant across the run)
    pub n_bins: usize,
    /// Lower microfracture radius cutoff, m
    pub min_radius: f64,
    /// Total deformation duration, s
    pub deformation_duration: f64,
    /// Maximum number of timesteps per cell
    pub max_timesteps: usize,
    /// Upper bound on the shadow-volume increment per step
    pub mfp33_step_bound: f64,
    /// Upper bound on the step length, s
    pub dt_max: f64,
    /// Hard lower bound on the step length, s
    pub dt_floor: f64,
    /// Termination: active shadow volume as a fraction of its peak
    pub historic_ratio_cutoff: f64,
    /// Termination: active tip fraction
    pub active_total_cutoff: f64,
    /// Termination: clear-zone volume fraction
    pub clear_zone_cutoff: f64,
    pub stress_distribution: StressDistribution,
    pub nucleation: NucleationPolicy,
    /// Number of fracture-set orientations (2 unless oblique sets are on)
    pub n_fracture_sets: usize,
    pub include_oblique_sets: bool,
    /// Treat every orientation as shadow-parallel (forced on for > 2 sets)
    pub check_all_shadows: bool,
    /// Cells thinner than this are skipped
    pub minimum_layer_thickness: f64,
}

impl Default for ImplicitControl {
    fn default() -> ImplicitControl {
        ImplicitControl {
            n_bins: 20,
            min_radius: 0.05,
            deformation_duration: 0.,
            max_timesteps: 2000,
            mfp33_step_bound: 0.002,
            dt_max: f64::INFINITY,
            dt_floor: 1e-6,
            historic_ratio_cutoff: 0.05,
            active_total_cutoff: 0.01,
            clear_zone_cutoff: 0.01,
            stress_distribution: StressDistribution::StressShadow,
            nucleation: NucleationPolicy { probabilistic: false, threshold: 1. },
            n_fracture_sets: 2,
            include_oblique_sets: false,
            check_all_shadows: false,
            minimum_layer_thickness: 1.,
        }
    }
}

impl ImplicitControl {
    /// Validate and normalize (resolves the forced-shadow rule for oblique
    /// set counts above two)
    pub fn validated(mut self) -> Result<ImplicitControl> {
        if self.n_bins == 0 {
            return Err(DfnError::config("number of radius bins must be positive"));
        }
        if !(self.min_radius > 0.) {
            return Err(DfnError::config("minimum microfracture radius must be positive"));
        }
        if !(self.deformation_duration > 0.) {
            return Err(DfnError::config("deformation duration must be positive"));
        }
        if self.max_timesteps == 0 {
            return Err(DfnError::config("maximum timestep count must be positive"));
        }
        if !(self.mfp33_step_bound > 0.) {
            return Err(DfnError::config("per-step growth bound must be positive"));
        }
        if !self.dt_max.is_finite() {
            // Baseline history resolution when the caller leaves the step
            // length unbounded
            self.dt_max = self.deformation_duration / 50.;
        }
        if !(self.dt_floor > 0.) || !(self.dt_max > self.dt_floor) {
            return Err(DfnError::config("timestep bounds must satisfy 0 < floor < max"));
        }
        if self.n_fracture_sets == 0 {
            return Err(DfnError::config("at least one fracture set is required"));
        }
        if self.n_fracture_sets > 2 && !self.include_oblique_sets {
            return Err(DfnError::config(
                "more than two fracture sets requires oblique sets to be enabled",
            ));
        }
        if !(self.minimum_layer_thickness > 0.) {
            return Err(DfnError::config("minimum layer thickness must be positive"));
        }
        self.stress_distribution.validate()?;
        if self.include_oblique_sets && self.n_fracture_sets > 2 {
            self.check_all_shadows = true;
        }
        Ok(self)
    }
}

/// Cross-boundary shadow contributions captured from neighbor cells before a
/// synchronised step (read-only snapshot, one entry per orientation)
#[derive(Clone, Debug)]
pub struct BoundaryShadow {
    pub parallel_fraction: Vec<f64>,
    pub parallel_rate: Vec<f64>,
    pub crossing_p21: Vec<f64>,
}

impl BoundaryShadow {
    pub fn none(n_sets: usize) -> BoundaryShadow {
        BoundaryShadow {
            parallel_fraction: vec![0.; n_sets],
            parallel_rate: vec![0.; n_sets],
            crossing_p21: vec![0.; n_sets],
        }
    }
}

/// Per-set output metrics at a growth stage
#[derive(Clone, Debug)]
pub struct SetMetrics {
    pub orientation: usize,
    pub mode: FractureMode,
    pub mfp30_total: f64,
    pub mfp32_total: f64,
    pub ufp32_total: f64,
    pub mean_macrofracture_length: f64,
    pub unconnected_tip_ratio: f64,
    pub relay_tip_ratio: f64,
    pub connected_tip_ratio: f64,
    pub end_active_time: f64,
}

/// One cell of the fracture grid with its owned implicit state
#[derive(Clone, Debug)]
pub struct GridblockConfig {
    pub row: usize,
    pub col: usize,
    pub geometry: CellGeometry,
    pub props: MechanicalProperties,
    pub stress: StressStrainState,
    pub sets: Vec<GridblockFractureSet>,
    pub edge_faulted: [bool; 4],
    /// Azimuth of the minimum-strain axis, rad
    pub ehmin_azimuth: f64,
    /// Driving strain rates along the principal axes, 1/s
    pub edot_hmin: f64,
    pub edot_hmax: f64,
    pub events: Vec<CellEvent>,
    /// Resolved layer thickness (override or cornerpoint mean), m
    thickness: f64,
    control: ImplicitControl,
    time: f64,
    step_count: usize,
    completed: bool,
    rng: Pcg64,
}

impl GridblockConfig {
    /// Build a cell from the host input record
    ///
    /// Returns `Ok(None)` for a degenerate cell (skipped, reported through
    /// the grid's event list).
    pub fn from_input(
        row: usize,
        col: usize,
        input: &GridblockInput,
        defaults: &MechanicalProperties,
        control: &ImplicitControl,
        seed: u64,
    ) -> Result<Option<GridblockConfig>> {
        if let Some(reason) = input.geometry.validity_error(control.minimum_layer_thickness) {
            warn!("cell ({}, {}) skipped: {}", row, col, reason);
            return Ok(None);
        }

        let mut events = Vec::new();
        let avg = input.average_per_cell;
        let mut resolve = |sample: &PropertySample, default: f64, name: &'static str| {
            let (v, fell_back) = sample.resolve(default, avg);
            if fell_back {
                debug!("cell ({}, {}): property {} fell back to default", row, col, name);
                events.push(CellEvent::PropertyFallback(name));
            }
            v
        };

        let mut props = defaults.clone();
        props.initial_density = resolve(&input.initial_density, defaults.initial_density, "initial_density");
        props.size_exponent = resolve(&input.size_exponent, defaults.size_exponent, "size_exponent");
        props.subcritical_index =
            resolve(&input.subcritical_index, defaults.subcritical_index, "subcritical_index");
        props.youngs_modulus = resolve(&input.youngs_modulus, defaults.youngs_modulus, "youngs_modulus");
        props.poisson_ratio = resolve(&input.poisson_ratio, defaults.poisson_ratio, "poisson_ratio");
        props.biot_coefficient =
            resolve(&input.biot_coefficient, defaults.biot_coefficient, "biot_coefficient");
        props.crack_surface_energy =
            resolve(&input.crack_surface_energy, defaults.crack_surface_energy, "crack_surface_energy");
        props.friction_coefficient =
            resolve(&input.friction_coefficient, defaults.friction_coefficient, "friction_coefficient");
        props.rock_strain_relaxation = resolve(
            &input.rock_strain_relaxation,
            defaults.rock_strain_relaxation,
            "rock_strain_relaxation",
        );
        props.fracture_strain_relaxation = resolve(
            &input.fracture_strain_relaxation,
            defaults.fracture_strain_relaxation,
            "fracture_strain_relaxation",
        );
        let edot_hmin = resolve(&input.ehmin_rate, 0., "ehmin_rate");
        let edot_hmax = resolve(&input.ehmax_rate, 0., "ehmax_rate");
        let (ehmin_azimuth, az_fell_back) = input.ehmin_azimuth.resolve_azimuth(0., avg);
        if az_fell_back {
            events.push(CellEvent::PropertyFallback("ehmin_azimuth"));
        }
        props.validate()?;

        let thickness = input.thickness_override.unwrap_or_else(|| input.geometry.thickness());
        if !(thickness >= control.minimum_layer_thickness) {
            warn!(
                "cell ({}, {}) skipped: thickness override {} below minimum",
                row, col, thickness
            );
            return Ok(None);
        }
        let depth = input.depth_override.unwrap_or_else(|| input.geometry.depth());
        let volume = input.geometry.footprint_area() * thickness;
        let stress = StressStrainState::new(&props, depth);

        let n_sets = control.n_fracture_sets;
        let mut sets = Vec::with_capacity(n_sets);
        for k in 0..n_sets {
            let normal_angle = PI * k as f64 / n_sets as f64;
            sets.push(GridblockFractureSet::new(
                normal_angle,
                &props,
                thickness,
                volume,
                control.n_bins,
                control.min_radius,
                ApertureModel::Uniform { aperture: 5e-4 },
                ApertureModel::Uniform { aperture: 1e-4 },
            )?);
        }

        let cell_seed = seed
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            .wrapping_add((row as u64) << 32 | col as u64);
        Ok(Some(GridblockConfig {
            row,
            col,
            geometry: input.geometry.clone(),
            props,
            stress,
            sets,
            edge_faulted: input.edge_faulted,
            ehmin_azimuth,
            edot_hmin,
            edot_hmax,
            events,
            thickness,
            control: control.clone(),
            time: 0.,
            step_count: 0,
            completed: false,
            rng: Pcg64::seed_from_u64(cell_seed),
        }))
    }

    /// Replace the default aperture models of one orientation
    pub fn set_aperture_models(&mut self, orientation: usize, mode1: ApertureModel, mode2: ApertureModel) {
        if let Some(set) = self.sets.get_mut(orientation) {
            set.mode1_aperture = mode1;
            set.mode2_aperture = mode2;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn layer_thickness(&self) -> f64 {
        self.thickness
    }

    /// Strike azimuth (absolute) of an orientation set
    pub fn strike_azimuth(&self, orientation: usize) -> f64 {
        let normal_angle = self.sets[orientation].normal_angle;
        crate::geometry::fold_azimuth(self.ehmin_azimuth + normal_angle + 0.5 * PI)
    }

    /// Timestep this cell would take on its own
    pub fn propose_timestep(&self) -> f64 {
        let remaining = (self.control.deformation_duration - self.time).max(0.);
        let mut dt = self.control.dt_max.min(remaining.max(self.control.dt_floor));
        for set in &self.sets {
            let c = set.normal_angle.cos();
            let s = set.normal_angle.sin();
            let normal_strain_rate = self.edot_hmin * c * c + self.edot_hmax * s * s;
            for dip_set in &set.dip_sets {
                if dip_set.is_active() {
                    dt = dt.min(dip_set.propose_timestep(
                        &self.stress,
                        &self.props,
                        self.control.mfp33_step_bound,
                        self.control.dt_max,
                        normal_strain_rate,
                    ));
                }
            }
        }
        dt.min(remaining.max(self.control.dt_floor))
    }

    /// Largest stress-shadow width over all dip sets, m
    pub fn max_shadow_width(&self) -> f64 {
        self.sets
            .iter()
            .flat_map(|s| s.dip_sets.iter())
            .map(|d| d.shadow_width())
            .fold(0., f64::max)
    }

    /// Whether this cell can interact with a neighbor across the given edge
    pub fn boundary_active(&self, edge: usize) -> bool {
        if self.completed || self.edge_faulted[edge] {
            return false;
        }
        self.control.stress_distribution.shadows_enabled()
            && self.sets.iter().any(|s| {
                s.dip_sets.iter().any(|d| d.is_active() && d.a_mfp30() > 0.)
            })
            && self.max_shadow_width() > 0.
    }

    /// Advance the cell by one timestep of length `dt`
    ///
    /// The shadow context of each dip set is assembled from its sibling sets
    /// and the captured neighbor contributions. Returns `false` once the cell
    /// is complete.
    pub fn advance_step(&mut self, dt: f64, boundary: &BoundaryShadow) -> bool {
        if self.completed {
            return false;
        }
        if dt < self.control.dt_floor {
            // Growth bound cannot be met above the hard floor: record and
            // terminate at the last converged snapshot.
            warn!(
                "cell ({}, {}): timestep {} below floor at t={}, terminating",
                self.row, self.col, dt, self.time
            );
            self.events.push(CellEvent::TimestepFloor { time: self.time });
            for set in &mut self.sets {
                for dip_set in &mut set.dip_sets {
                    dip_set.deactivate(TerminationReason::NumericalFloor);
                }
            }
            self.completed = true;
            return false;
        }

        let shadows_enabled = self.control.stress_distribution.shadows_enabled();
        let n_sets = self.sets.len();

        // Interaction terms per orientation, from the pre-step state.
        // Microfracture exclusion volumes join the shadow pool only when the
        // all-shadows check is on; by default only macrofracture shadows
        // consume clear volume.
        let check_all = self.control.check_all_shadows;
        let own_shadow: Vec<f64> = self
            .sets
            .iter()
            .map(|s| {
                s.combined_mfp33() + if check_all { s.combined_ufp33() } else { 0. }
            })
            .collect();
        let own_rate: Vec<f64> = self
            .sets
            .iter()
            .map(|s| s.dip_sets.iter().map(|d| d.shadow_rate()).sum())
            .collect();
        let own_p21: Vec<f64> = self.sets.iter().map(|s| s.combined_mfp32()).collect();
        // The growth budget draws on the cell-wide clear volume, so the
        // total shadow fraction can never exceed one
        let total_shadow: f64 = own_shadow.iter().sum();
        let n_active = self
            .sets
            .iter()
            .flat_map(|s| s.dip_sets.iter())
            .filter(|d| d.is_active())
            .count()
            .max(1);

        let mut induced_hmin = 0.;
        let mut induced_hmax = 0.;
        for k in 0..n_sets {
            // Sibling pool: own orientation always, every orientation when
            // the all-shadows check is on, plus neighbor contributions.
            let mut sibling_rate = own_rate[k] + boundary.parallel_rate.get(k).copied().unwrap_or(0.);
            let mut crossing = boundary.crossing_p21.get(k).copied().unwrap_or(0.);
            for j in 0..n_sets {
                if j == k {
                    continue;
                }
                let angle = crate::geometry::azimuth_difference(
                    self.sets[k].normal_angle,
                    self.sets[j].normal_angle,
                );
                if self.control.check_all_shadows {
                    sibling_rate += own_rate[j];
                }
                crossing += own_p21[j] * angle.sin();
            }
            let clear = (1.
                - total_shadow
                - boundary.parallel_fraction.get(k).copied().unwrap_or(0.))
            .max(0.);

            let normal_angle = self.sets[k].normal_angle;
            for dip_set in &mut self.sets[k].dip_sets {
                if !dip_set.is_active() {
                    continue;
                }
                // A dip set's own growth is coupled analytically inside its
                // advance; only the other sets' rates act as siblings here
                let ctx = ShadowContext {
                    shadows_enabled,
                    sibling_shadow_rate: (sibling_rate - dip_set.shadow_rate()).max(0.),
                    crossing_p21: if shadows_enabled { crossing } else { 0. },
                    clear_fraction: if shadows_enabled { clear } else { 1. },
                    growth_budget: if shadows_enabled {
                        clear / n_active as f64
                    } else {
                        f64::INFINITY
                    },
                };
                let rate = dip_set.advance(
                    dt,
                    &self.stress,
                    &self.props,
                    &ctx,
                    &self.control.nucleation,
                    &mut self.rng,
                );
                let c = normal_angle.cos();
                let s = normal_angle.sin();
                induced_hmin += rate * c * c;
                induced_hmax += rate * s * s;
            }
        }

        self.stress.step(
            dt,
            &self.props,
            self.edot_hmin,
            self.edot_hmax,
            induced_hmin,
            induced_hmax,
        );

        self.time += dt;
        let index = self.step_count;
        self.step_count += 1;
        for set in &mut self.sets {
            for dip_set in &mut set.dip_sets {
                dip_set.snapshot(index, self.time, dt);
            }
        }

        let ctl = &self.control;
        let mut any_active = false;
        for set in &mut self.sets {
            for dip_set in &mut set.dip_sets {
                if dip_set.is_active() {
                    dip_set.evaluate_termination(
                        ctl.historic_ratio_cutoff,
                        ctl.active_total_cutoff,
                        ctl.clear_zone_cutoff,
                        self.time,
                        ctl.deformation_duration,
                        self.step_count,
                        ctl.max_timesteps,
                    );
                }
                any_active |= dip_set.is_active();
            }
        }
        if !any_active {
            self.completed = true;
        }
        !self.completed
    }

    /// Per-set metrics at a given simulation time
    pub fn set_metrics_at(&self, time: f64) -> Vec<SetMetrics> {
        let mut out = Vec::new();
        for (k, set) in self.sets.iter().enumerate() {
            for dip_set in &set.dip_sets {
                let record = dip_set.state_at(time);
                let (a, sr, si, mfl, mfp32, ufp32) = match record {
                    Some(r) => (r.a_mfp30, r.sr_mfp30, r.si_mfp30, r.mfl_dens, r.mfp32, r.ufp32),
                    None => (0., 0., 0., 0., 0., 0.),
                };
                let total = a + sr + si;
                let (unconnected, relay, connected) = if total > 0. {
                    (a / total, sr / total, si / total)
                } else {
                    (1., 0., 0.)
                };
                out.push(SetMetrics {
                    orientation: k,
                    mode: dip_set.mode,
                    mfp30_total: total,
                    mfp32_total: mfp32,
                    ufp32_total: ufp32,
                    mean_macrofracture_length: if total > 0. { 2. * mfl / total } else { 0. },
                    unconnected_tip_ratio: unconnected,
                    relay_tip_ratio: relay,
                    connected_tip_ratio: connected,
                    end_active_time: dip_set_end_active_time(dip_set.history()),
                });
            }
        }
        out
    }

    /// Latest per-set timestep records (explicit phase input)
    pub fn dip_set_histories(&self) -> Vec<(usize, FractureMode, &[TimestepRecord])> {
        let mut out = Vec::new();
        for (k, set) in self.sets.iter().enumerate() {
            for dip_set in &set.dip_sets {
                out.push((k, dip_set.mode, dip_set.history()));
            }
        }
        out
    }

    pub fn dip_set(&self, orientation: usize, mode: FractureMode) -> Option<&FractureDipSet> {
        self.sets.get(orientation).and_then(|s| {
            s.dip_sets.iter().find(|d| d.mode == mode)
        })
    }

    /// Ratio-style anisotropy of the combined P32 between the first two
    /// orientations
    pub fn p32_anisotropy(&self) -> f64 {
        if self.sets.len() < 2 {
            return 0.;
        }
        let a = self.sets[0].combined_p32();
        let b = self.sets[1].combined_p32();
        if a + b <= 0. {
            0.
        } else {
            (a - b) / (a + b)
        }
    }

    pub fn p33_anisotropy(&self) -> f64 {
        if self.sets.len() < 2 {
            return 0.;
        }
        let a = self.sets[0].combined_mfp33() + self.sets[0].combined_ufp33();
        let b = self.sets[1].combined_mfp33() + self.sets[1].combined_ufp33();
        if a + b <= 0. {
            0.
        } else {
            (a - b) / (a + b)
        }
    }

    /// Total fracture porosity under the current stress
    pub fn porosity(&self) -> f64 {
        let h = self.layer_thickness();
        self.sets.iter().map(|s| s.porosity(&self.stress, &self.props, h)).sum()
    }

    /// Cell-wide tip connectivity ratios `(I, R, Y) / total`
    pub fn connectivity_ratios(&self) -> (f64, f64, f64) {
        let mut a = 0.;
        let mut sr = 0.;
        let mut si = 0.;
        for set in &self.sets {
            for dip_set in &set.dip_sets {
                a += dip_set.a_mfp30();
                sr += dip_set.sr_mfp30();
                si += dip_set.si_mfp30();
            }
        }
        let total = a + sr + si;
        if total <= 0. {
            (1., 0., 0.)
        } else {
            (a / total, sr / total, si / total)
        }
    }

    /// Latest time at which any dip set still had propagating tips
    pub fn final_active_time(&self) -> f64 {
        self.sets
            .iter()
            .flat_map(|s| s.dip_sets.iter())
            .map(|d| dip_set_end_active_time(d.history()))
            .fold(0., f64::max)
    }

    /// End times of all recorded timesteps
    pub fn endtimes(&self) -> Vec<f64> {
        self.sets
            .first()
            .and_then(|s| s.dip_sets.first())
            .map(|d| d.history().iter().map(|r| r.end_time).collect())
            .unwrap_or_default()
    }

    /// Deterministic sub-generator for the explicit phase
    pub fn derived_rng(&self, salt: u64) -> Pcg64 {
        let seed = (self.row as u64)
            .wrapping_mul(0x517c_c1b7_2722_0a95)
            .wrapping_add(self.col as u64)
            .wrapping_add(salt);
        Pcg64::seed_from_u64(seed)
    }
}

fn dip_set_end_active_time(history: &[TimestepRecord]) -> f64 {
    history
        .iter()
        .rev()
        .find(|r| r.a_mfp30 > 0. && r.tip_velocity > 0.)
        .map(|r| r.end_time)
        .unwrap_or(0.)
}
