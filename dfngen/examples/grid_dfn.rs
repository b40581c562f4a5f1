// Example of a multi-cell run with intermediate DFN growth stages

use anyhow::Result;

use dfngen::{
    DFNGenerationControl, FractureGrid, GridblockInput, ImplicitControl, MechanicalProperties,
    NoProgress, PropertySample, TimeUnits,
};

pub fn main() -> Result<()> {
    const ROWS: usize = 2;
    const COLS: usize = 2;
    const CELL_SIZE: f64 = 100.;

    let units = TimeUnits::Ma;
    let mut inputs = Vec::new();
    for row in 0..ROWS {
        for col in 0..COLS {
            let mut input = GridblockInput::boxed(
                CELL_SIZE * col as f64,
                CELL_SIZE * row as f64,
                CELL_SIZE,
                CELL_SIZE,
                -2000.,
                50.,
            );
            input.ehmin_rate = PropertySample::Scalar(units.rate_to_si(-3.16e-8));
            inputs.push(input);
        }
    }

    let props = MechanicalProperties {
        youngs_modulus: 3e10,
        initial_density: 1e-6,
        ..MechanicalProperties::default()
    };
    let control = ImplicitControl {
        deformation_duration: units.time_to_si(30.),
        ..ImplicitControl::default()
    };
    let mut grid = FractureGrid::new(ROWS, COLS, &inputs, props, control, 7, 4)?;
    grid.calculate_all_fracture_data(&NoProgress);

    let dfn_control = DFNGenerationControl {
        n_intermediate_outputs: 4,
        intermediates_by_time: true,
        ..DFNGenerationControl::default()
    };
    grid.generate_dfn(&dfn_control, &NoProgress)?;

    for stage in grid.dfn_growth_stages() {
        println!(
            "stage at {:6.1} Ma: {:5} microfractures, {:4} macrofractures, area {:.3e} m^2",
            units.time_from_si(stage.stage_time),
            stage.microfractures.len(),
            stage.macrofractures.len(),
            stage.total_macrofracture_area()
        );
    }
    Ok(())
}
