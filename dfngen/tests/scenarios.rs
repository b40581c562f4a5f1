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

//! End-to-end scenarios on small grids

use dfngen::{
    DFNGenerationControl, FractureGrid, GridblockInput, ImplicitControl, MechanicalProperties,
    NoProgress, PropertySample, RunStatus, StressDistribution, TimeUnits, TipState,
};

const MA30: f64 = 9.46728e14; // 30 Ma in seconds

fn test_properties() -> MechanicalProperties {
    MechanicalProperties {
        youngs_modulus: 3e10,
        poisson_ratio: 0.25,
        crack_surface_energy: 1000.,
        friction_coefficient: 0.5,
        subcritical_index: 10.,
        // Low seed density keeps the explicit network small
        initial_density: 1e-6,
        size_exponent: 2.,
        ..MechanicalProperties::default()
    }
}

fn extension_input(x0: f64, y0: f64) -> GridblockInput {
    let mut input = GridblockInput::boxed(x0, y0, 100., 100., -2000., 50.);
    input.ehmin_rate = PropertySample::Scalar(-1e-15);
    input
}

fn implicit_control(duration: f64) -> ImplicitControl {
    ImplicitControl {
        deformation_duration: duration,
        ..ImplicitControl::default()
    }
}

fn run_grid(
    rows: usize,
    cols: usize,
    inputs: Vec<GridblockInput>,
    control: ImplicitControl,
    seed: u64,
) -> FractureGrid {
    let mut grid =
        FractureGrid::new(rows, cols, &inputs, test_properties(), control, seed, 2).unwrap();
    assert_eq!(grid.calculate_all_fracture_data(&NoProgress), RunStatus::Completed);
    grid
}

#[test]
fn single_cell_pure_extension() {
    // 1x1 grid: h = 100 m at 2000 m depth, E = 3e10 Pa, nu = 0.25, alpha = 1,
    // G_c = 1000 J/m^2, mu = 0.5, b = 10, A = 1e-3, c = 2, no relaxation,
    // extension at 1e-15 1/s along h-min for 30 Ma
    let props = MechanicalProperties {
        youngs_modulus: 3e10,
        poisson_ratio: 0.25,
        biot_coefficient: 1.,
        crack_surface_energy: 1000.,
        friction_coefficient: 0.5,
        subcritical_index: 10.,
        initial_density: 1e-3,
        size_exponent: 2.,
        rock_strain_relaxation: 0.,
        fracture_strain_relaxation: 0.,
        ..MechanicalProperties::default()
    };
    let mut input = GridblockInput::boxed(0., 0., 200., 200., -1950., 100.);
    input.ehmin_rate = PropertySample::Scalar(-1e-15);
    let control = ImplicitControl {
        deformation_duration: MA30,
        min_radius: 0.15,
        ..ImplicitControl::default()
    };
    let mut grid = FractureGrid::new(1, 1, &[input], props, control, 42, 2).unwrap();
    assert_eq!(grid.calculate_all_fracture_data(&NoProgress), RunStatus::Completed);
    let cell = grid.cell(0, 0).unwrap();
    assert!(cell.is_complete());

    // The orientation normal to the extension axis fractures and its final
    // areal intensity lands in the expected window; the perpendicular
    // orientation stays compressive and empty
    let hmin_mfp32: f64 = cell.sets[0].dip_sets.iter().map(|d| d.mfp32()).sum();
    assert!(
        hmin_mfp32 >= 0.5 && hmin_mfp32 <= 5.,
        "H-min MFP32 {} outside [0.5, 5] 1/m",
        hmin_mfp32
    );
    for dip_set in &cell.sets[1].dip_sets {
        assert_eq!(dip_set.mfp30_total(), 0.);
        assert_eq!(dip_set.mfp32(), 0.);
    }

    // Population invariants at every snapshot
    let mut prev_total = 0.;
    let mut prev_mfp33 = 0.;
    let mut prev_time = 0.;
    for dip_set in &cell.sets[0].dip_sets {
        for record in dip_set.history() {
            let total = record.a_mfp30 + record.sr_mfp30 + record.si_mfp30;
            assert!(total >= prev_total - 1e-15);
            prev_total = total;
            assert!(record.mfp33 >= 0. && record.mfp33 <= 1.);
            assert!(record.mfp33 >= prev_mfp33 - 1e-15, "MFP33 regressed");
            prev_mfp33 = record.mfp33;
            assert!(record.end_time > prev_time);
            prev_time = record.end_time;
        }
        prev_total = 0.;
        prev_mfp33 = 0.;
        prev_time = 0.;
    }

    // Total shadow volume across all sets stays bounded by one (up to the
    // step-discretisation of the growth budget)
    let total_mfp33: f64 = cell
        .sets
        .iter()
        .flat_map(|s| s.dip_sets.iter())
        .map(|d| d.mfp33())
        .sum();
    assert!(total_mfp33 <= 1.02, "total MFP33 {}", total_mfp33);
}

#[test]
fn zero_strain_rate_is_inert() {
    let mut input = extension_input(0., 0.);
    input.ehmin_rate = PropertySample::Scalar(0.);
    let grid = run_grid(1, 1, vec![input], implicit_control(MA30), 1);
    let cell = grid.cell(0, 0).unwrap();
    for set in &cell.sets {
        for dip_set in &set.dip_sets {
            assert_eq!(dip_set.mfp30_total(), 0.);
        }
    }
    assert_eq!(cell.stress.fracture_strain_hmin, 0.);
}

#[test]
fn evenly_distributed_stress_keeps_all_tips_active() {
    let control = ImplicitControl {
        stress_distribution: StressDistribution::EvenlyDistributed,
        ..implicit_control(MA30)
    };
    let grid = run_grid(1, 1, vec![extension_input(0., 0.)], control, 5);
    let cell = grid.cell(0, 0).unwrap();
    let metrics = cell.set_metrics_at(grid.final_time());
    let mut saw_tips = false;
    for m in &metrics {
        if m.mfp30_total > 0. {
            saw_tips = true;
            assert!((m.unconnected_tip_ratio - 1.).abs() < 1e-12);
            assert_eq!(m.relay_tip_ratio, 0.);
            assert_eq!(m.connected_tip_ratio, 0.);
        }
    }
    assert!(saw_tips, "expected macrofracture tips under pure extension");
}

#[test]
fn stress_shadows_deactivate_tips() {
    let control = ImplicitControl {
        stress_distribution: StressDistribution::StressShadow,
        ..implicit_control(MA30)
    };
    let grid = run_grid(1, 1, vec![extension_input(0., 0.)], control, 5);
    let cell = grid.cell(0, 0).unwrap();
    let (unconnected, relay, _) = cell.connectivity_ratios();
    // Shadow interaction must strand a substantial share of tips
    assert!(unconnected < 1.);
    assert!(relay > 0., "expected relay-terminated tips under stress shadowing");
    // The active shadow volume peaked and then declined
    let peaked = cell.sets[0]
        .dip_sets
        .iter()
        .any(|d| d.peak_a_mfp33() > 0. && d.current_a_mfp33() < d.peak_a_mfp33());
    assert!(peaked);
}

#[test]
fn implicit_arrays_do_not_depend_on_explicit_phase() {
    let make = || run_grid(1, 1, vec![extension_input(0., 0.)], implicit_control(MA30), 9);
    let grid_a = make();
    let mut grid_b = make();
    let skip = DFNGenerationControl { generate_explicit: false, ..DFNGenerationControl::default() };
    grid_b.generate_dfn(&skip, &NoProgress).unwrap();
    assert!(grid_b.dfn_growth_stages().is_empty());
    grid_b.generate_dfn(&DFNGenerationControl::default(), &NoProgress).unwrap();
    assert!(!grid_b.dfn_growth_stages().is_empty());

    let t = grid_a.final_time();
    let ma = &grid_a.cell_metrics_at(t)[0];
    let mb = &grid_b.cell_metrics_at(t)[0];
    let (ma, mb) = (ma.as_ref().unwrap(), mb.as_ref().unwrap());
    for (sa, sb) in ma.sets.iter().zip(mb.sets.iter()) {
        assert_eq!(sa.mfp32_total, sb.mfp32_total);
        assert_eq!(sa.mfp30_total, sb.mfp30_total);
    }
}

#[test]
fn orientation_swap_is_symmetric() {
    // Extension carried by the h-max axis instead: the fracturing moves to
    // the other orientation with identical magnitudes
    let mut swapped = extension_input(0., 0.);
    swapped.ehmin_rate = PropertySample::Scalar(0.);
    swapped.ehmax_rate = PropertySample::Scalar(-1e-15);
    let grid_a = run_grid(1, 1, vec![extension_input(0., 0.)], implicit_control(MA30), 3);
    let grid_b = run_grid(1, 1, vec![swapped], implicit_control(MA30), 3);
    let a = grid_a.cell(0, 0).unwrap();
    let b = grid_b.cell(0, 0).unwrap();
    let a0: f64 = a.sets[0].dip_sets.iter().map(|d| d.mfp32()).sum();
    let b1: f64 = b.sets[1].dip_sets.iter().map(|d| d.mfp32()).sum();
    assert!(a0 > 0.);
    assert!((a0 - b1).abs() <= 1e-3 * a0, "a0 {} vs b1 {}", a0, b1);
    let b0: f64 = b.sets[0].dip_sets.iter().map(|d| d.mfp32()).sum();
    assert_eq!(b0, 0.);
}

#[test]
fn explicit_dfn_crosses_consistent_boundaries() {
    // Fractures strike along y (normal on the extension axis), so the two
    // cells are stacked along the strike direction
    let inputs = vec![extension_input(0., 0.), extension_input(0., 100.)];
    let mut grid = run_grid(2, 1, inputs, implicit_control(MA30), 11);
    grid.generate_dfn(&DFNGenerationControl::default(), &NoProgress).unwrap();
    let dfn = grid.dfn_growth_stages().last().unwrap();
    assert!(!dfn.macrofractures.is_empty());
    let spanning = dfn.macrofractures.iter().any(|f| {
        let mut cells: Vec<(usize, usize)> =
            f.segments.iter().flatten().map(|s| s.cell).collect();
        cells.sort();
        cells.dedup();
        cells.len() > 1
    });
    assert!(spanning, "expected at least one boundary-crossing macrofracture");
}

#[test]
fn inconsistent_azimuth_blocks_continuation() {
    // The neighbor's strain axes are rotated well past the consistency angle
    let mut rotated = extension_input(0., 100.);
    rotated.ehmin_azimuth = PropertySample::Scalar(0.3);
    let inputs = vec![extension_input(0., 0.), rotated];
    let mut grid = run_grid(2, 1, inputs, implicit_control(MA30), 11);
    let control = DFNGenerationControl {
        max_consistency_angle: 0.01,
        ..DFNGenerationControl::default()
    };
    grid.generate_dfn(&control, &NoProgress).unwrap();
    let dfn = grid.dfn_growth_stages().last().unwrap();
    for f in &dfn.macrofractures {
        let mut cells: Vec<(usize, usize)> =
            f.segments.iter().flatten().map(|s| s.cell).collect();
        cells.sort();
        cells.dedup();
        assert_eq!(cells.len().max(1), 1, "fracture crossed an inconsistent boundary");
    }
    // Tips stopped at the boundary carry the cropped tag
    let cropped = dfn
        .macrofractures
        .iter()
        .flat_map(|f| f.tips.iter())
        .any(|t| *t == TipState::BoundaryCropped);
    assert!(cropped);
}

#[test]
fn faulted_boundary_blocks_propagation() {
    let mut south = extension_input(0., 0.);
    south.edge_faulted = [false, false, true, false]; // north edge faulted
    let mut north = extension_input(0., 100.);
    north.edge_faulted = [true, false, false, false]; // matching south edge
    let mut grid = run_grid(2, 1, vec![south, north], implicit_control(MA30), 11);
    grid.generate_dfn(&DFNGenerationControl::default(), &NoProgress).unwrap();
    let dfn = grid.dfn_growth_stages().last().unwrap();
    assert!(!dfn.macrofractures.is_empty());
    for f in &dfn.macrofractures {
        let mut cells: Vec<(usize, usize)> =
            f.segments.iter().flatten().map(|s| s.cell).collect();
        cells.sort();
        cells.dedup();
        assert!(cells.len() <= 1, "fracture crossed a faulted boundary");
    }
}

#[test]
fn probabilistic_nucleation_rescues_small_cells() {
    // 10x10 grid of cells so small that the deterministic per-step
    // expectation is far below one macrofracture
    let tiny = |x0: f64, y0: f64| {
        let mut input = GridblockInput::boxed(x0, y0, 10., 10., -2000., 10.);
        input.ehmin_rate = PropertySample::Scalar(-1e-15);
        input
    };
    let mut inputs = Vec::new();
    for row in 0..10 {
        for col in 0..10 {
            inputs.push(tiny(10. * col as f64, 10. * row as f64));
        }
    }
    let control = ImplicitControl {
        minimum_layer_thickness: 1.,
        ..implicit_control(MA30)
    };
    let mut grid = run_grid(10, 10, inputs, control, 17);

    // Disabled: rounded-down counts lose everything
    let disabled = DFNGenerationControl {
        probabilistic_nucleation_limit: 0.,
        ..DFNGenerationControl::default()
    };
    grid.generate_dfn(&disabled, &NoProgress).unwrap();
    assert_eq!(grid.dfn_growth_stages().last().unwrap().macrofractures.len(), 0);

    // Expected total count: the nucleation rate integrated over all cells
    // and the full duration (#cells x duration x rate)
    let mut expected = 0.;
    for row in 0..10 {
        for col in 0..10 {
            let cell = grid.cell(row, col).unwrap();
            let volume = cell.geometry.volume();
            for (_, _, history) in cell.dip_set_histories() {
                for record in history {
                    expected += record.new_macro_density * volume;
                }
            }
        }
    }
    assert!(expected > 1., "expected count {} too small to test", expected);

    // Automatic limit: the mean over 20 seeds lies within the Poisson 95%
    // confidence interval around the expectation
    const SEEDS: u64 = 20;
    let mut total = 0usize;
    for seed in 0..SEEDS {
        let enabled = DFNGenerationControl {
            probabilistic_nucleation_limit: -1.,
            seed,
            ..DFNGenerationControl::default()
        };
        grid.generate_dfn(&enabled, &NoProgress).unwrap();
        total += grid.dfn_growth_stages().last().unwrap().macrofractures.len();
    }
    let mean = total as f64 / SEEDS as f64;
    let ci = 1.96 * (expected / SEEDS as f64).sqrt();
    assert!(
        (mean - expected).abs() <= ci,
        "mean count {} outside the 95% CI {} +- {}",
        mean,
        expected,
        ci
    );
}

#[test]
fn intermediate_outputs_by_time() {
    let mut grid = run_grid(1, 1, vec![extension_input(0., 0.)], implicit_control(MA30), 23);
    let control = DFNGenerationControl {
        n_intermediate_outputs: 4,
        intermediates_by_time: true,
        ..DFNGenerationControl::default()
    };
    grid.generate_dfn(&control, &NoProgress).unwrap();
    let stages = grid.dfn_growth_stages();
    assert_eq!(stages.len(), 5);
    let final_time = grid.final_time();
    for (i, stage) in stages.iter().enumerate() {
        let expected = final_time * (i + 1) as f64 / 5.;
        assert!((stage.stage_time - expected).abs() < 1e-6 * final_time);
    }
    // Fracture populations only accumulate between stages
    for pair in stages.windows(2) {
        assert!(pair[0].macrofractures.len() <= pair[1].macrofractures.len());
        assert!(pair[0].stage_time < pair[1].stage_time);
    }
}

#[test]
fn growth_stage_geometry_is_well_formed() {
    let mut grid = run_grid(1, 1, vec![extension_input(0., 0.)], implicit_control(MA30), 29);
    let control = DFNGenerationControl {
        triangular_segments: true,
        microfracture_cornerpoints: 6,
        ..DFNGenerationControl::default()
    };
    grid.generate_dfn(&control, &NoProgress).unwrap();
    let dfn = grid.dfn_growth_stages().last().unwrap();
    for patch in dfn.patches() {
        assert_eq!(patch.vertices.len(), 3);
        assert!(patch.aperture >= 0.);
        for v in &patch.vertices {
            assert!(v.is_finite());
        }
    }
    for micro in &dfn.microfractures {
        assert_eq!(micro.cornerpoints.len(), 6);
        assert!(micro.radius > 0.);
        // Penny fractures stay inside the layer
        let cell = grid.cell(micro.cell.0, micro.cell.1).unwrap();
        assert!(micro.centre.z + micro.radius <= cell.geometry.mean_top_z() + 1e-6);
        assert!(micro.centre.z - micro.radius >= cell.geometry.mean_base_z() - 1e-6);
    }
}

#[test]
fn endtime_list_aligns_cells() {
    let inputs = vec![extension_input(0., 0.), extension_input(100., 0.)];
    let grid = run_grid(1, 2, inputs, implicit_control(MA30), 31);
    let endtimes = grid.timestep_endtime_list();
    assert!(!endtimes.is_empty());
    for w in endtimes.windows(2) {
        assert!(w[1] > w[0]);
    }
    // Every cell's own endtimes appear in the union
    for col in 0..2 {
        let cell = grid.cell(0, col).unwrap();
        for t in cell.endtimes() {
            assert!(endtimes.binary_search_by(|x| x.partial_cmp(&t).unwrap()).is_ok());
        }
    }
}

#[test]
fn time_units_round_trip_through_the_engine() {
    let units = TimeUnits::Ma;
    let duration_ma = 30.;
    let control = implicit_control(units.time_to_si(duration_ma));
    assert!((control.deformation_duration - MA30).abs() < 1e6);
    let grid = run_grid(1, 1, vec![extension_input(0., 0.)], control, 37);
    let final_ma = units.time_from_si(grid.final_time());
    assert!(final_ma >= duration_ma * 0.99);
}
