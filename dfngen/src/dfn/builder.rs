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

//! Construction of the explicit DFN from the converged implicit histories
//!
//! Every macrofracture tip is driven as a small state machine through the
//! per-cell timestep records: it advances by the recorded tip velocity along
//! the set azimuth, crosses unfaulted boundaries when the neighbor's azimuth
//! is consistent, and terminates on entering a stress shadow, crossing a
//! non-parallel fracture, or hitting an unconnectable boundary.

use log::debug;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::dipset::{integer_count, stochastic_round, FractureMode};
use crate::dfn::control::{AdjacentSearch, DFNGenerationControl};
use crate::dfn::objects::{
    FractureSegment, GlobalDFN, MacrofractureObject, MicrofractureObject, RelayZone, TipState,
};
use crate::geometry::{
    azimuth_difference, circle_cornerpoints, segment_intersection_xy, strike_vector, Point3,
};
use crate::grid::FractureGrid;
use crate::gridblock::GridblockConfig;
use crate::progress::{ProgressReporter, RunStatus};

/// One macrofracture nucleated by the implicit model
#[derive(Clone, Debug)]
struct NucleationEvent {
    time: f64,
    cell: (usize, usize),
    orientation: usize,
    mode: FractureMode,
    point: Point3,
}

/// Propagation state of one tip during construction
#[derive(Clone, Debug)]
struct TipTracker {
    state: TipState,
    term_time: Option<f64>,
    segments: Vec<FractureSegment>,
    position: Point3,
}

impl TipTracker {
    fn new(position: Point3) -> TipTracker {
        TipTracker {
            state: TipState::Active,
            term_time: None,
            segments: Vec::new(),
            position,
        }
    }

    fn terminate(&mut self, state: TipState, time: f64) {
        self.state = state;
        self.term_time = Some(time);
    }

    fn state_at(&self, time: f64) -> TipState {
        match self.term_time {
            Some(t) if t <= time => self.state,
            _ => TipState::Active,
        }
    }
}

/// A fully propagated macrofracture with its per-tip construction record
#[derive(Clone, Debug)]
struct BuiltFracture {
    orientation: usize,
    mode: FractureMode,
    nucleation_time: f64,
    nucleation_cell: (usize, usize),
    nucleation_point: Point3,
    strike_azimuth: f64,
    tips: [TipTracker; 2],
}

impl BuiltFracture {
    /// Map-view trace segments emitted up to `time`, with their cells
    fn trace_segments(&self, time: f64) -> Vec<(Point3, Point3, (usize, usize))> {
        let mut out = Vec::new();
        for tip in self.tips.iter() {
            for segment in &tip.segments {
                if segment.emitted_time <= time {
                    out.push((segment.corners[0], segment.corners[1], segment.cell));
                }
            }
        }
        out
    }

    /// Tip-to-tip length at `time`, m
    fn length_at(&self, time: f64) -> f64 {
        self.trace_segments(time)
            .iter()
            .map(|(a, b, _)| a.distance_xy(b))
            .sum()
    }
}

/// Earliest event found along one propagation sub-step
enum PathEvent {
    Boundary { frac: f64, edge: usize },
    Crossing { frac: f64, point: Point3, other: usize },
    Shadow { frac: f64, point: Point3, other: usize, nearest: Point3 },
}

impl PathEvent {
    fn frac(&self) -> f64 {
        match self {
            PathEvent::Boundary { frac, .. } => *frac,
            PathEvent::Crossing { frac, .. } => *frac,
            PathEvent::Shadow { frac, .. } => *frac,
        }
    }
}

/// Distance from a point to a segment in map view, with the nearest point
fn point_segment_distance_xy(p: Point3, a: Point3, b: Point3) -> (f64, Point3) {
    let ab = (b.x - a.x, b.y - a.y);
    let len2 = ab.0 * ab.0 + ab.1 * ab.1;
    let s = if len2 > 0. {
        (((p.x - a.x) * ab.0 + (p.y - a.y) * ab.1) / len2).max(0.).min(1.)
    } else {
        0.
    };
    let nearest = Point3::new(a.x + ab.0 * s, a.y + ab.1 * s, a.z + (b.z - a.z) * s);
    (p.distance_xy(&nearest), nearest)
}

/// Cells searched for stress-shadow interaction from a given cell
fn shadow_search_cells(
    grid: &FractureGrid,
    cell: &GridblockConfig,
    policy: AdjacentSearch,
) -> Vec<(usize, usize)> {
    let mut cells = vec![(cell.row, cell.col)];
    let include_neighbors = match policy {
        AdjacentSearch::None => false,
        AdjacentSearch::All => true,
        AdjacentSearch::Automatic => {
            cell.max_shadow_width() >= 0.25 * cell.geometry.extent()
        }
    };
    if include_neighbors {
        for edge in 0..4 {
            if grid.edge_open(cell.row, cell.col, edge) {
                if let Some(rc) = grid.neighbor(cell.row, cell.col, edge) {
                    cells.push(rc);
                }
            }
        }
    }
    cells
}

/// Scan previously built fractures for the earliest interaction along the
/// sub-path `pos -> target` at time `t`
fn find_interaction(
    grid: &FractureGrid,
    control: &DFNGenerationControl,
    built: &[BuiltFracture],
    cell: &GridblockConfig,
    orientation: usize,
    pos: Point3,
    target: Point3,
    t: f64,
) -> Option<PathEvent> {
    let mut best: Option<PathEvent> = None;
    let mut consider = |ev: PathEvent| {
        if best.as_ref().map(|b| ev.frac() < b.frac()).unwrap_or(true) {
            best = Some(ev);
        }
    };

    // Cell boundary
    if let Some((edge, frac, _)) = cell.geometry.exit_edge((pos.x, pos.y), (target.x, target.y)) {
        consider(PathEvent::Boundary { frac, edge });
    }

    let allowed = shadow_search_cells(grid, cell, control.search_adjacent);
    let step_len = pos.distance_xy(&target);
    if step_len <= 0. {
        return best;
    }

    for (j, other) in built.iter().enumerate() {
        if other.nucleation_time > t {
            continue;
        }
        let traces = other.trace_segments(t);
        if traces.is_empty() {
            continue;
        }
        if other.orientation == orientation {
            // Parallel fracture: stress-shadow entry, gated by the
            // adjacent-search policy
            let other_cell = match grid.cell(other.nucleation_cell.0, other.nucleation_cell.1) {
                Some(c) => c,
                None => continue,
            };
            let half_width = 0.5
                * other_cell.props.shadow_width_factor()
                * other.length_at(t).min(other_cell.layer_thickness());
            if half_width <= 0. {
                continue;
            }
            for (a, b, seg_cell) in &traces {
                if !allowed.contains(seg_cell) {
                    continue;
                }
                let (d0, _) = point_segment_distance_xy(pos, *a, *b);
                let (d1, nearest) = point_segment_distance_xy(target, *a, *b);
                if d0 <= half_width {
                    consider(PathEvent::Shadow { frac: 0., point: pos, other: j, nearest });
                } else if d1 < half_width {
                    let frac = ((d0 - half_width) / (d0 - d1)).max(0.).min(1.);
                    let point = pos + (target - pos) * frac;
                    consider(PathEvent::Shadow { frac, point, other: j, nearest });
                }
            }
        } else {
            // Crossing fracture: geometric intersection
            for (a, b, _) in &traces {
                if let Some((frac, point)) = segment_intersection_xy(pos, target, *a, *b) {
                    consider(PathEvent::Crossing { frac, point, other: j });
                }
            }
        }
    }
    best
}

/// Quadrilateral segment between two tip positions within a cell
fn make_segment(
    cell: &GridblockConfig,
    near: Point3,
    far: Point3,
    aperture: f64,
    emitted_time: f64,
) -> FractureSegment {
    let top = cell.geometry.mean_top_z();
    let base = cell.geometry.mean_base_z();
    FractureSegment {
        corners: [
            Point3::new(near.x, near.y, top),
            Point3::new(far.x, far.y, top),
            Point3::new(far.x, far.y, base),
            Point3::new(near.x, near.y, base),
        ],
        aperture,
        cell: (cell.row, cell.col),
        emitted_time,
    }
}

fn macro_aperture(cell: &GridblockConfig, orientation: usize, mode: FractureMode) -> f64 {
    cell.sets[orientation].mean_macro_aperture(mode, &cell.stress, &cell.props, cell.layer_thickness())
}

/// Propagate both tips of one nucleated fracture through the timestep
/// history, appending any relay zone produced by shadow linking
fn propagate_fracture(
    grid: &FractureGrid,
    control: &DFNGenerationControl,
    built: &[BuiltFracture],
    relays: &mut Vec<(RelayZone, f64)>,
    own_index: usize,
    event: &NucleationEvent,
) -> BuiltFracture {
    let start_cell = grid
        .cell(event.cell.0, event.cell.1)
        .expect("nucleation events only come from live cells");
    let azimuth0 = start_cell.strike_azimuth(event.orientation);
    let mut fracture = BuiltFracture {
        orientation: event.orientation,
        mode: event.mode,
        nucleation_time: event.time,
        nucleation_cell: event.cell,
        nucleation_point: event.point,
        strike_azimuth: azimuth0,
        tips: [TipTracker::new(event.point), TipTracker::new(event.point)],
    };

    for (dir, sign) in [(0usize, -1.), (1usize, 1.)].iter().copied() {
        let mut cell_rc = event.cell;
        let mut dir_vec = strike_vector(azimuth0) * sign;
        let mut azimuth = azimuth0;
        let mut pos = event.point;
        let mut t = event.time;
        let tip = &mut fracture.tips[dir];

        'prop: loop {
            let cell = match grid.cell(cell_rc.0, cell_rc.1) {
                Some(c) => c,
                None => {
                    tip.terminate(TipState::Completed, t);
                    break 'prop;
                }
            };
            let dip_set = match cell.dip_set(event.orientation, event.mode) {
                Some(d) => d,
                None => {
                    tip.terminate(TipState::Completed, t);
                    break 'prop;
                }
            };
            let history = dip_set.history();
            let idx = history.partition_point(|r| r.end_time <= t);
            if idx >= history.len() {
                tip.terminate(TipState::Completed, t);
                break 'prop;
            }
            let record = &history[idx];
            let dt_sub = record.end_time - t;
            let v = record.tip_velocity;
            if v <= 0. || dt_sub <= 0. {
                t = record.end_time;
                continue 'prop;
            }
            let step_len = v * dt_sub;
            let target = pos + dir_vec * step_len;
            let aperture = macro_aperture(cell, event.orientation, event.mode);

            let interaction =
                find_interaction(grid, control, built, cell, event.orientation, pos, target, t);

            match interaction {
                None => {
                    if step_len > 1e-9 {
                        tip.segments
                            .push(make_segment(cell, pos, target, aperture, record.end_time));
                    }
                    pos = target;
                    t = record.end_time;
                }
                Some(PathEvent::Shadow { frac, point, other, nearest }) => {
                    let t_event = t + dt_sub * frac;
                    if pos.distance_xy(&point) > 1e-9 {
                        tip.segments.push(make_segment(cell, pos, point, aperture, t_event));
                    }
                    pos = point;
                    tip.terminate(TipState::RelayTerminated, t_event);
                    if control.link_stress_shadows {
                        let top = cell.geometry.mean_top_z();
                        let base = cell.geometry.mean_base_z();
                        relays.push((
                            RelayZone {
                                corners: [
                                    Point3::new(point.x, point.y, top),
                                    Point3::new(nearest.x, nearest.y, top),
                                    Point3::new(nearest.x, nearest.y, base),
                                    Point3::new(point.x, point.y, base),
                                ],
                                aperture,
                                from_fracture: own_index,
                                to_fracture: other,
                            },
                            t_event,
                        ));
                    }
                    break 'prop;
                }
                Some(PathEvent::Crossing { frac, point, .. }) => {
                    let t_event = t + dt_sub * frac;
                    if pos.distance_xy(&point) > 1e-9 {
                        tip.segments.push(make_segment(cell, pos, point, aperture, t_event));
                    }
                    pos = point;
                    tip.terminate(TipState::IntersectTerminated, t_event);
                    break 'prop;
                }
                Some(PathEvent::Boundary { frac, edge }) => {
                    let t_event = t + dt_sub * frac;
                    let crossing = pos + (target - pos) * frac;
                    let neighbor_rc = grid.neighbor(cell_rc.0, cell_rc.1, edge);
                    let open = grid.edge_open(cell_rc.0, cell_rc.1, edge);
                    let continuation = if open {
                        let (nr, nc) = neighbor_rc.unwrap();
                        grid.cell(nr, nc).and_then(|neighbor| {
                            let n_az = neighbor.strike_azimuth(event.orientation);
                            if azimuth_difference(azimuth, n_az) <= control.max_consistency_angle {
                                Some(((nr, nc), n_az))
                            } else {
                                None
                            }
                        })
                    } else {
                        None
                    };
                    match continuation {
                        Some((rc, n_az)) => {
                            if pos.distance_xy(&crossing) > 1e-9 {
                                tip.segments
                                    .push(make_segment(cell, pos, crossing, aperture, t_event));
                            }
                            let mut d = strike_vector(n_az);
                            if d.x * dir_vec.x + d.y * dir_vec.y < 0. {
                                d = d * -1.;
                            }
                            dir_vec = d;
                            azimuth = n_az;
                            cell_rc = rc;
                            pos = crossing + dir_vec * 1e-6;
                            t = t_event;
                        }
                        None => {
                            if control.crop_at_boundary {
                                if pos.distance_xy(&crossing) > 1e-9 {
                                    tip.segments
                                        .push(make_segment(cell, pos, crossing, aperture, t_event));
                                }
                                pos = crossing;
                                tip.terminate(TipState::BoundaryCropped, t_event);
                                break 'prop;
                            } else {
                                // Propagate out of the modelled volume, up
                                // to one cell extent past the boundary
                                let overshoot =
                                    crossing.distance_xy(&target).min(cell.geometry.extent());
                                let target_out = crossing + dir_vec * overshoot;
                                if pos.distance_xy(&target_out) > 1e-9 {
                                    tip.segments.push(make_segment(
                                        cell,
                                        pos,
                                        target_out,
                                        aperture,
                                        record.end_time,
                                    ));
                                }
                                pos = target_out;
                                tip.terminate(TipState::Completed, record.end_time);
                                break 'prop;
                            }
                        }
                    }
                }
            }
        }
        fracture.tips[dir].position = pos;
    }
    fracture
}

/// Collect integer nucleation events from every cell's history
///
/// Each cell draws from its own deterministic generator, so a cell's event
/// sequence does not depend on what the rest of the grid contains.
fn collect_events(grid: &FractureGrid, control: &DFNGenerationControl) -> Vec<NucleationEvent> {
    let limit = control.resolved_nucleation_limit();
    let mut events = Vec::new();
    for row in 0..grid.rows() {
        for col in 0..grid.cols() {
            let cell = match grid.cell(row, col) {
                Some(c) => c,
                None => continue,
            };
            if cell.layer_thickness() < control.min_layer_thickness {
                continue;
            }
            let mut rng = cell.derived_rng(control.seed.wrapping_add(grid.seed()));
            let rng = &mut rng;
            let volume = cell.geometry.volume();
            let z_mid = 0.5 * (cell.geometry.mean_top_z() + cell.geometry.mean_base_z());
            for (orientation, mode, history) in cell.dip_set_histories() {
                for record in history {
                    let expected = record.new_macro_density * volume;
                    let count = integer_count(expected, limit, rng);
                    for _ in 0..count {
                        let (x, y) = cell.geometry.point_at(rng.gen(), rng.gen());
                        let time = record.end_time - rng.gen::<f64>() * record.dt;
                        events.push(NucleationEvent {
                            time,
                            cell: (row, col),
                            orientation,
                            mode,
                            point: Point3::new(x, y, z_mid),
                        });
                    }
                }
            }
        }
    }
    if control.propagate_in_nucleation_order {
        events.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());
    } else {
        events.sort_by(|a, b| {
            (a.orientation, a.mode as usize)
                .cmp(&(b.orientation, b.mode as usize))
                .then(a.time.partial_cmp(&b.time).unwrap())
        });
    }
    events
}

/// Growth-stage times, spaced equally in time or in cumulative macrofracture
/// area
fn stage_times(
    control: &DFNGenerationControl,
    final_time: f64,
    built: &[BuiltFracture],
) -> Vec<f64> {
    let n = control.n_intermediate_outputs;
    if n == 0 {
        return vec![final_time];
    }
    if control.intermediates_by_time {
        return (1..=n + 1)
            .map(|i| final_time * i as f64 / (n + 1) as f64)
            .collect();
    }
    // Equal increments of cumulative segment area
    let mut emissions: Vec<(f64, f64)> = built
        .iter()
        .flat_map(|f| f.tips.iter())
        .flat_map(|tip| tip.segments.iter())
        .map(|s| {
            let w = s.corners[0].distance_xy(&s.corners[1]);
            let h = s.corners[0].z - s.corners[3].z;
            (s.emitted_time, w * h)
        })
        .collect();
    emissions.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let total: f64 = emissions.iter().map(|e| e.1).sum();
    if total <= 0. {
        return (1..=n + 1)
            .map(|i| final_time * i as f64 / (n + 1) as f64)
            .collect();
    }
    let mut times = Vec::with_capacity(n + 1);
    let mut acc = 0.;
    let mut target_idx = 1usize;
    for (t, area) in &emissions {
        acc += area;
        while target_idx <= n && acc >= total * target_idx as f64 / (n + 1) as f64 {
            times.push(*t);
            target_idx += 1;
        }
    }
    while times.len() < n {
        times.push(final_time);
    }
    times.push(final_time);
    times
}

/// Materialize the network state at one stage time
fn assemble_stage(
    grid: &FractureGrid,
    control: &DFNGenerationControl,
    built: &[BuiltFracture],
    relays: &[(RelayZone, f64)],
    time: f64,
    stage_index: usize,
) -> GlobalDFN {
    let mut macrofractures = Vec::new();
    let mut index_map: Vec<Option<usize>> = vec![None; built.len()];
    for (j, f) in built.iter().enumerate() {
        if f.nucleation_time > time {
            continue;
        }
        let mut segments: [Vec<FractureSegment>; 2] = [Vec::new(), Vec::new()];
        let mut tip_positions = [f.nucleation_point, f.nucleation_point];
        for dir in 0..2 {
            for segment in &f.tips[dir].segments {
                if segment.emitted_time <= time {
                    tip_positions[dir] = segment.corners[1].midpoint(&segment.corners[2]);
                    segments[dir].push(segment.clone());
                }
            }
        }
        let length: f64 = segments
            .iter()
            .flatten()
            .map(|s| s.corners[0].distance_xy(&s.corners[1]))
            .sum();
        if length < control.min_macrofracture_length {
            continue;
        }
        index_map[j] = Some(macrofractures.len());
        macrofractures.push(MacrofractureObject {
            orientation: f.orientation,
            mode: f.mode,
            nucleation_time: f.nucleation_time,
            nucleation_cell: f.nucleation_cell,
            nucleation_point: f.nucleation_point,
            strike_azimuth: f.strike_azimuth,
            segments,
            tips: [f.tips[0].state_at(time), f.tips[1].state_at(time)],
            tip_positions,
        });
    }

    let relay_zones = relays
        .iter()
        .filter(|(_, t)| *t <= time)
        .filter_map(|(zone, _)| {
            match (index_map[zone.from_fracture], index_map[zone.to_fracture]) {
                (Some(from), Some(to)) => Some(RelayZone {
                    corners: zone.corners,
                    aperture: zone.aperture,
                    from_fracture: from,
                    to_fracture: to,
                }),
                _ => None,
            }
        })
        .collect();

    // Microfractures from the per-bin histograms at the stage time
    let mut microfractures = Vec::new();
    for row in 0..grid.rows() {
        for col in 0..grid.cols() {
            let cell = match grid.cell(row, col) {
                Some(c) => c,
                None => continue,
            };
            let volume = cell.geometry.volume();
            let top = cell.geometry.mean_top_z();
            let base = cell.geometry.mean_base_z();
            for (orientation, mode, _) in cell.dip_set_histories() {
                let dip_set = cell.dip_set(orientation, mode).unwrap();
                let record = match dip_set.state_at(time) {
                    Some(r) => r,
                    None => continue,
                };
                let edges = dip_set.bin_densities();
                let seed = control
                    .seed
                    .wrapping_add(grid.seed())
                    .wrapping_mul(0x9e37_79b9_7f4a_7c15)
                    .wrapping_add(((stage_index as u64) << 48)
                        ^ ((row as u64) << 32)
                        ^ ((col as u64) << 16)
                        ^ ((orientation as u64) << 8)
                        ^ mode as u64);
                let mut rng = Pcg64::seed_from_u64(seed);
                let strike = cell.strike_azimuth(orientation);
                for (bin, &p30) in record.bin_p30.iter().enumerate() {
                    let (r_lo, r_hi, _) = edges[bin];
                    if r_hi < control.min_microfracture_radius {
                        continue;
                    }
                    let count = stochastic_round(p30 * volume, &mut rng);
                    for _ in 0..count {
                        let radius = r_lo + rng.gen::<f64>() * (r_hi - r_lo);
                        if radius < control.min_microfracture_radius {
                            continue;
                        }
                        let (x, y) = cell.geometry.point_at(rng.gen(), rng.gen());
                        let z_lo = base + radius;
                        let z_hi = top - radius;
                        let z = if z_hi > z_lo {
                            z_lo + rng.gen::<f64>() * (z_hi - z_lo)
                        } else {
                            0.5 * (top + base)
                        };
                        let centre = Point3::new(x, y, z);
                        let aperture = {
                            let ctx = crate::properties::ApertureContext {
                                sigma_n_eff: cell.stress.normal_stress(cell.sets[orientation].normal_angle),
                                size: 2. * radius,
                                youngs_modulus: cell.props.youngs_modulus,
                                poisson_ratio: cell.props.poisson_ratio,
                            };
                            cell.sets[orientation].aperture_model(mode).aperture(&ctx)
                        };
                        microfractures.push(MicrofractureObject {
                            centre,
                            radius,
                            orientation,
                            mode,
                            strike_azimuth: strike,
                            aperture,
                            cornerpoints: circle_cornerpoints(
                                centre,
                                radius,
                                strike,
                                control.microfracture_cornerpoints,
                            ),
                            cell: (row, col),
                        });
                    }
                }
            }
        }
    }

    GlobalDFN {
        stage_time: time,
        microfractures,
        macrofractures,
        relay_zones,
        triangular: control.triangular_segments,
    }
}

/// Build the full sequence of growth stages
pub(crate) fn build_growth_stages(
    grid: &FractureGrid,
    control: &DFNGenerationControl,
    progress: &dyn ProgressReporter,
) -> (Vec<GlobalDFN>, RunStatus) {
    let final_time = grid.final_time();
    let events = collect_events(grid, control);
    debug!("explicit phase: {} nucleation events", events.len());

    let mut built: Vec<BuiltFracture> = Vec::new();
    let mut relays: Vec<(RelayZone, f64)> = Vec::new();
    let total_work = events.len() + control.n_intermediate_outputs + 1;
    for (i, event) in events.iter().enumerate() {
        if progress.cancelled() {
            return (Vec::new(), RunStatus::Cancelled);
        }
        progress.update(i, total_work);
        let fracture = propagate_fracture(grid, control, &built, &mut relays, built.len(), event);
        built.push(fracture);
    }

    let times = stage_times(control, final_time, &built);
    let mut stages = Vec::with_capacity(times.len());
    for (s, time) in times.iter().enumerate() {
        if progress.cancelled() {
            return (stages, RunStatus::Cancelled);
        }
        progress.update(events.len() + s, total_work);
        stages.push(assemble_stage(grid, control, &built, &relays, *time, s));
    }
    progress.update(total_work, total_work);
    (stages, RunStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_segment_distance() {
        let a = Point3::new(0., 0., 0.);
        let b = Point3::new(10., 0., 0.);
        let (d, nearest) = point_segment_distance_xy(Point3::new(5., 3., 0.), a, b);
        assert!((d - 3.).abs() < 1e-12);
        assert!((nearest.x - 5.).abs() < 1e-12);
        // Beyond the segment end the distance is to the endpoint
        let (d, nearest) = point_segment_distance_xy(Point3::new(14., 3., 0.), a, b);
        assert!((d - 5.).abs() < 1e-12);
        assert!((nearest.x - 10.).abs() < 1e-12);
    }

    #[test]
    fn stage_times_by_time_are_even() {
        let control = DFNGenerationControl {
            n_intermediate_outputs: 4,
            intermediates_by_time: true,
            ..DFNGenerationControl::default()
        };
        let times = stage_times(&control, 20., &[]);
        assert_eq!(times.len(), 5);
        for (i, t) in times.iter().enumerate() {
            assert!((t - 4. * (i + 1) as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_intermediates_give_one_stage() {
        let control = DFNGenerationControl::default();
        let times = stage_times(&control, 123., &[]);
        assert_eq!(times, vec![123.]);
    }
}
