// Example of a single-cell fracture growth run with console output

use anyhow::Result;

use dfngen::{
    DFNGenerationControl, FractureGrid, GridblockInput, ImplicitControl, MechanicalProperties,
    ProgressReporter, PropertySample, TimeUnits,
};

struct BarProgress(indicatif::ProgressBar);

impl ProgressReporter for BarProgress {
    fn update(&self, completed: usize, total: usize) {
        self.0.set_length(total as u64);
        self.0.set_position(completed as u64);
    }
}

pub fn main() -> Result<()> {
    // Simulation parameters
    const DURATION_MA: f64 = 30.;
    const CELL_SIZE: f64 = 200.;
    const LAYER_THICKNESS: f64 = 100.;

    let units = TimeUnits::Ma;

    let mut input = GridblockInput::boxed(0., 0., CELL_SIZE, CELL_SIZE, -2000., LAYER_THICKNESS);
    input.ehmin_rate = PropertySample::Scalar(units.rate_to_si(-3.16e-8));

    let props = MechanicalProperties {
        youngs_modulus: 3e10,
        poisson_ratio: 0.25,
        subcritical_index: 10.,
        initial_density: 1e-5,
        ..MechanicalProperties::default()
    };
    let control = ImplicitControl {
        deformation_duration: units.time_to_si(DURATION_MA),
        ..ImplicitControl::default()
    };

    let mut grid = FractureGrid::new(1, 1, &[input], props, control, 42, 4)?;

    println!("Running implicit phase...");
    let progress = BarProgress(indicatif::ProgressBar::new(1));
    grid.calculate_all_fracture_data(&progress);
    progress.0.finish();

    println!("Building explicit DFN...");
    let progress = BarProgress(indicatif::ProgressBar::new(1));
    grid.generate_dfn(&DFNGenerationControl::default(), &progress)?;
    progress.0.finish();

    let final_time = grid.final_time();
    println!("Final time: {:.1} Ma", units.time_from_si(final_time));
    for metrics in grid.cell_metrics_at(final_time).iter().flatten() {
        println!(
            "cell ({}, {}): P32 anisotropy {:.3}, porosity {:.2e}",
            metrics.row, metrics.col, metrics.p32_anisotropy, metrics.porosity
        );
        for set in &metrics.sets {
            println!(
                "  set {} {:?}: MFP32 {:.3e} 1/m, mean length {:.1} m, I/R/Y {:.2}/{:.2}/{:.2}",
                set.orientation,
                set.mode,
                set.mfp32_total,
                set.mean_macrofracture_length,
                set.unconnected_tip_ratio,
                set.relay_tip_ratio,
                set.connected_tip_ratio,
            );
        }
    }
    if let Some(dfn) = grid.dfn_growth_stages().last() {
        println!(
            "DFN: {} microfractures, {} macrofractures, {} relay zones",
            dfn.microfractures.len(),
            dfn.macrofractures.len(),
            dfn.relay_zones.len()
        );
    }
    Ok(())
}
