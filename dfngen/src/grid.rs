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

//! The fracture grid: a row-major 2D array of gridblocks with neighbor links
//! and the orchestration of the implicit and explicit phases.
//!
//! Cells advance in time independently and in parallel. Cells whose active
//! fractures can reach across a shared unfaulted boundary are grouped by a
//! connectivity search each round and synchronised to the smallest step in
//! the group, so cross-boundary shadow queries always see state captured at
//! the common time.

use itertools::izip;
use log::debug;

use crate::dfn::control::DFNGenerationControl;
use crate::dfn::objects::GlobalDFN;
use crate::error::{DfnError, Result};
use crate::gridblock::{
    opposite_edge, BoundaryShadow, CellEvent, GridblockConfig, GridblockInput, ImplicitControl,
    SetMetrics,
};
use crate::helpers::{ceil_div, sorted_union};
use crate::progress::{ProgressReporter, RunStatus};
use crate::properties::MechanicalProperties;

/// Per-cell roll-up metrics exposed to the host
#[derive(Clone, Debug)]
pub struct CellMetrics {
    pub row: usize,
    pub col: usize,
    /// One entry per dip set, at the queried stage time
    pub sets: Vec<SetMetrics>,
    pub p32_anisotropy: f64,
    pub p33_anisotropy: f64,
    pub porosity: f64,
    pub final_active_time: f64,
}

/// The structured grid owning all per-cell state
pub struct FractureGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Option<GridblockConfig>>,
    control: ImplicitControl,
    seed: u64,
    /// Events of skipped (degenerate) cells; live cells keep their own lists
    pub events: Vec<(usize, usize, CellEvent)>,
    growth_stages: Vec<GlobalDFN>,
    thread_pool: scoped_threadpool::Pool,
}

impl FractureGrid {
    /// Build the grid from per-cell input records (row-major order)
    ///
    /// Configuration errors are fatal here; degenerate cells are skipped and
    /// recorded, and the run continues without them.
    pub fn new(
        rows: usize,
        cols: usize,
        inputs: &[GridblockInput],
        defaults: MechanicalProperties,
        control: ImplicitControl,
        seed: u64,
        num_threads: usize,
    ) -> Result<FractureGrid> {
        if rows == 0 || cols == 0 {
            return Err(DfnError::grid("grid dimensions must be positive"));
        }
        if inputs.len() != rows * cols {
            return Err(DfnError::grid(format!(
                "expected {} cell inputs for a {}x{} grid, got {}",
                rows * cols,
                rows,
                cols,
                inputs.len()
            )));
        }
        if num_threads == 0 {
            return Err(DfnError::grid("at least one worker thread is required"));
        }
        defaults.validate()?;
        let control = control.validated()?;

        let mut cells = Vec::with_capacity(rows * cols);
        let mut events = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let input = &inputs[row * cols + col];
                match GridblockConfig::from_input(row, col, input, &defaults, &control, seed)? {
                    Some(cell) => cells.push(Some(cell)),
                    None => {
                        events.push((
                            row,
                            col,
                            CellEvent::DegenerateCell(
                                input
                                    .geometry
                                    .validity_error(control.minimum_layer_thickness)
                                    .unwrap_or_else(|| "invalid geometry".to_string()),
                            ),
                        ));
                        cells.push(None);
                    }
                }
            }
        }
        if cells.iter().all(|c| c.is_none()) {
            return Err(DfnError::grid("no valid cells in the grid"));
        }
        Ok(FractureGrid {
            rows,
            cols,
            cells,
            control,
            seed,
            events,
            growth_stages: Vec::new(),
            thread_pool: scoped_threadpool::Pool::new(num_threads as u32),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn control(&self) -> &ImplicitControl {
        &self.control
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridblockConfig> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(self.idx(row, col)).and_then(|c| c.as_ref())
    }

    /// Neighbor coordinates across a footprint edge, if inside the grid
    pub fn neighbor(&self, row: usize, col: usize, edge: usize) -> Option<(usize, usize)> {
        let (dr, dc) = crate::gridblock::edge_neighbor_offset(edge);
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr as usize >= self.rows || nc as usize >= self.cols {
            None
        } else {
            Some((nr as usize, nc as usize))
        }
    }

    /// Whether fractures and shadows may cross the given edge of a cell
    ///
    /// Requires a live neighbor and an unfaulted edge on both sides.
    pub fn edge_open(&self, row: usize, col: usize, edge: usize) -> bool {
        let cell = match self.cell(row, col) {
            Some(c) => c,
            None => return false,
        };
        if cell.edge_faulted[edge] {
            return false;
        }
        match self.neighbor(row, col, edge) {
            Some((nr, nc)) => match self.cell(nr, nc) {
                Some(n) => !n.edge_faulted[opposite_edge(edge)],
                None => false,
            },
            None => false,
        }
    }

    /// Run the implicit phase to completion (or cancellation)
    pub fn calculate_all_fracture_data(&mut self, progress: &dyn ProgressReporter) -> RunStatus {
        let total = self.cells.iter().filter(|c| c.is_some()).count();
        loop {
            if progress.cancelled() {
                return RunStatus::Cancelled;
            }
            let completed = self
                .cells
                .iter()
                .filter(|c| c.as_ref().map(|c| c.is_complete()).unwrap_or(false))
                .count();
            progress.update(completed, total);
            if completed == total {
                return RunStatus::Completed;
            }

            // Phase A: read-only sweep assembling each live cell's step
            // length and captured neighbor state
            let tasks = self.plan_round();

            // Phase B: advance cells in parallel; every worker only mutates
            // its own chunk
            let n_threads = self.thread_pool.thread_count() as usize;
            let chunk_size = ceil_div(self.cells.len(), n_threads);
            let cells = &mut self.cells;
            self.thread_pool.scoped(|s| {
                for (cell_chunk, task_chunk) in
                    izip!(cells.chunks_mut(chunk_size), tasks.chunks(chunk_size))
                {
                    s.execute(move || {
                        for (cell, task) in cell_chunk.iter_mut().zip(task_chunk.iter()) {
                            if progress.cancelled() {
                                return;
                            }
                            if let (Some(cell), Some((dt, boundary))) = (cell.as_mut(), task.as_ref())
                            {
                                cell.advance_step(*dt, boundary);
                            }
                        }
                    });
                }
            });
        }
    }

    /// Assemble one round of per-cell work: step lengths (synchronised
    /// within boundary-interaction groups) and captured neighbor shadows
    fn plan_round(&self) -> Vec<Option<(f64, BoundaryShadow)>> {
        let n = self.cells.len();
        let n_sets = self.control.n_fracture_sets;

        // Proposed step per live, incomplete cell
        let mut proposed = vec![None; n];
        for (i, cell) in self.cells.iter().enumerate() {
            if let Some(cell) = cell {
                if !cell.is_complete() {
                    proposed[i] = Some(cell.propose_timestep());
                }
            }
        }

        // Undirected interaction subgraph: both sides shadow-active across an
        // open edge
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut Vec<usize>, i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            let mut node = i;
            while parent[node] != root {
                let next = parent[node];
                parent[node] = root;
                node = next;
            }
            root
        }
        for row in 0..self.rows {
            for col in 0..self.cols {
                let i = self.idx(row, col);
                let cell = match &self.cells[i] {
                    Some(c) => c,
                    None => continue,
                };
                for edge in 1..3 {
                    // east and north edges cover every interior boundary once
                    if !self.edge_open(row, col, edge) {
                        continue;
                    }
                    let (nr, nc) = self.neighbor(row, col, edge).unwrap();
                    let j = self.idx(nr, nc);
                    let neighbor = self.cells[j].as_ref().unwrap();
                    if cell.boundary_active(edge) && neighbor.boundary_active(opposite_edge(edge)) {
                        let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                        if ri != rj {
                            parent[ri] = rj;
                        }
                    }
                }
            }
        }

        // Group minimum step
        let mut group_dt = vec![f64::INFINITY; n];
        for i in 0..n {
            if let Some(dt) = proposed[i] {
                let root = find(&mut parent, i);
                if dt < group_dt[root] {
                    group_dt[root] = dt;
                }
            }
        }

        // Captured neighbor shadow state, weighted by how far the neighbor's
        // shadows plausibly reach into this cell
        let mut tasks: Vec<Option<(f64, BoundaryShadow)>> = vec![None; n];
        for row in 0..self.rows {
            for col in 0..self.cols {
                let i = self.idx(row, col);
                let dt = match proposed[i] {
                    Some(_) => {
                        let root = find(&mut parent, i);
                        if group_dt[root].is_finite() {
                            group_dt[root]
                        } else {
                            proposed[i].unwrap()
                        }
                    }
                    None => continue,
                };
                let cell = self.cells[i].as_ref().unwrap();
                let mut boundary = BoundaryShadow::none(n_sets);
                for edge in 0..4 {
                    if !self.edge_open(row, col, edge) {
                        continue;
                    }
                    let (nr, nc) = self.neighbor(row, col, edge).unwrap();
                    let neighbor = match self.cell(nr, nc) {
                        Some(nb) => nb,
                        None => continue,
                    };
                    if !neighbor.boundary_active(opposite_edge(edge)) {
                        continue;
                    }
                    let coupling =
                        (neighbor.max_shadow_width() / cell.geometry.extent().max(1e-12)).min(1.);
                    if coupling <= 0. {
                        continue;
                    }
                    for k in 0..n_sets.min(neighbor.sets.len()) {
                        let set = &neighbor.sets[k];
                        let micro = if self.control.check_all_shadows {
                            set.combined_ufp33()
                        } else {
                            0.
                        };
                        boundary.parallel_fraction[k] +=
                            coupling * (set.combined_mfp33() + micro);
                        boundary.parallel_rate[k] += coupling
                            * set.dip_sets.iter().map(|d| d.shadow_rate()).sum::<f64>();
                        for j in 0..neighbor.sets.len() {
                            if j == k {
                                continue;
                            }
                            let angle = crate::geometry::azimuth_difference(
                                set.normal_angle,
                                neighbor.sets[j].normal_angle,
                            );
                            boundary.crossing_p21[k] +=
                                coupling * neighbor.sets[j].combined_mfp32() * angle.sin();
                        }
                    }
                }
                tasks[i] = Some((dt, boundary));
            }
        }
        tasks
    }

    /// Sorted union of all cells' timestep end times
    pub fn timestep_endtime_list(&self) -> Vec<f64> {
        let sequences: Vec<Vec<f64>> = self
            .cells
            .iter()
            .filter_map(|c| c.as_ref())
            .map(|c| c.endtimes())
            .collect();
        sorted_union(&sequences)
    }

    /// Latest simulation time reached by any cell
    pub fn final_time(&self) -> f64 {
        self.cells
            .iter()
            .filter_map(|c| c.as_ref())
            .map(|c| c.current_time())
            .fold(0., f64::max)
    }

    /// Run the explicit phase, storing one DFN per growth stage
    pub fn generate_dfn(
        &mut self,
        control: &DFNGenerationControl,
        progress: &dyn ProgressReporter,
    ) -> Result<RunStatus> {
        let control = control.clone().validated()?;
        if !control.generate_explicit {
            debug!("explicit DFN generation disabled");
            self.growth_stages.clear();
            return Ok(RunStatus::Completed);
        }
        let (stages, status) = crate::dfn::builder::build_growth_stages(self, &control, progress);
        self.growth_stages = stages;
        Ok(status)
    }

    /// Time-ordered DFN snapshots from the last `generate_dfn` call
    pub fn dfn_growth_stages(&self) -> &[GlobalDFN] {
        &self.growth_stages
    }

    /// Per-cell metrics at a stage time (`None` for degenerate cells)
    pub fn cell_metrics_at(&self, time: f64) -> Vec<Option<CellMetrics>> {
        self.cells
            .iter()
            .map(|slot| {
                slot.as_ref().map(|cell| CellMetrics {
                    row: cell.row,
                    col: cell.col,
                    sets: cell.set_metrics_at(time),
                    p32_anisotropy: cell.p32_anisotropy(),
                    p33_anisotropy: cell.p33_anisotropy(),
                    porosity: cell.porosity(),
                    final_active_time: cell.final_active_time(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridblock::PropertySample;
    use crate::progress::NoProgress;

    fn extension_input(x0: f64, y0: f64) -> GridblockInput {
        let mut input = GridblockInput::boxed(x0, y0, 200., 200., -2000., 100.);
        input.ehmin_rate = PropertySample::Scalar(-1e-15);
        input
    }

    fn control(duration: f64) -> ImplicitControl {
        ImplicitControl {
            deformation_duration: duration,
            ..ImplicitControl::default()
        }
    }

    fn defaults() -> MechanicalProperties {
        MechanicalProperties {
            youngs_modulus: 3e10,
            ..MechanicalProperties::default()
        }
    }

    #[test]
    fn construction_validates_dimensions() {
        let inputs = vec![extension_input(0., 0.)];
        assert!(FractureGrid::new(0, 1, &inputs, defaults(), control(1e14), 1, 2).is_err());
        assert!(FractureGrid::new(2, 1, &inputs, defaults(), control(1e14), 1, 2).is_err());
        assert!(FractureGrid::new(1, 1, &inputs, defaults(), control(1e14), 1, 0).is_err());
        assert!(FractureGrid::new(1, 1, &inputs, defaults(), control(1e14), 1, 2).is_ok());
    }

    #[test]
    fn degenerate_cells_are_recorded_and_skipped() {
        let mut thin = extension_input(200., 0.);
        thin.thickness_override = None;
        for p in thin.geometry.base_corners.iter_mut() {
            p.z = -2000.5; // half-metre layer, below the minimum
        }
        let inputs = vec![extension_input(0., 0.), thin];
        let mut grid = FractureGrid::new(1, 2, &inputs, defaults(), control(1e14), 1, 2).unwrap();
        assert!(grid.cell(0, 1).is_none());
        assert_eq!(grid.events.len(), 1);
        let status = grid.calculate_all_fracture_data(&NoProgress);
        assert_eq!(status, RunStatus::Completed);
        assert!(grid.cell(0, 0).unwrap().is_complete());
    }

    #[test]
    fn implicit_phase_completes_and_orders_time() {
        let inputs = vec![extension_input(0., 0.), extension_input(200., 0.)];
        let mut grid = FractureGrid::new(1, 2, &inputs, defaults(), control(9e14), 7, 2).unwrap();
        let status = grid.calculate_all_fracture_data(&NoProgress);
        assert_eq!(status, RunStatus::Completed);
        let endtimes = grid.timestep_endtime_list();
        assert!(!endtimes.is_empty());
        for w in endtimes.windows(2) {
            assert!(w[1] > w[0]);
        }
        assert!(grid.final_time() >= 9e14 * 0.999 || grid.cell(0, 0).unwrap().is_complete());
    }

    #[test]
    fn cancellation_returns_promptly() {
        struct CancelNow;
        impl ProgressReporter for CancelNow {
            fn cancelled(&self) -> bool {
                true
            }
        }
        let inputs = vec![extension_input(0., 0.)];
        let mut grid = FractureGrid::new(1, 1, &inputs, defaults(), control(9e14), 1, 2).unwrap();
        assert_eq!(grid.calculate_all_fracture_data(&CancelNow), RunStatus::Cancelled);
        // Nothing advanced, outputs remain well-formed
        assert!(grid.timestep_endtime_list().is_empty());
    }

    #[test]
    fn faulted_edges_block_interaction() {
        let mut a = extension_input(0., 0.);
        a.edge_faulted = [false, true, false, false]; // east edge faulted
        let mut b = extension_input(200., 0.);
        b.edge_faulted = [false, false, false, true]; // matching west edge
        let inputs = vec![a, b];
        let grid = FractureGrid::new(1, 2, &inputs, defaults(), control(9e14), 1, 2).unwrap();
        assert!(!grid.edge_open(0, 0, 1));
        assert!(!grid.edge_open(0, 1, 3));
        // Grid boundary edges are never open
        assert!(!grid.edge_open(0, 0, 3));
    }

    #[test]
    fn metrics_are_exposed_per_cell() {
        let inputs = vec![extension_input(0., 0.)];
        let mut grid = FractureGrid::new(1, 1, &inputs, defaults(), control(9e14), 3, 2).unwrap();
        grid.calculate_all_fracture_data(&NoProgress);
        let metrics = grid.cell_metrics_at(grid.final_time());
        assert_eq!(metrics.len(), 1);
        let m = metrics[0].as_ref().unwrap();
        assert_eq!(m.sets.len(), 4); // 2 orientations x 2 modes
        assert!(m.p32_anisotropy > 0.);
        assert!(m.porosity >= 0.);
    }
}
