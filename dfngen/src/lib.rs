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

//! This crate simulates the nucleation and growth of natural fracture
//! networks in a layered subsurface rock volume under an imposed horizontal
//! strain history. Each cell of a structured grid carries a population-
//! density model of micro- and macrofractures advanced by a subcritical
//! (Charles-law) propagation engine with adaptive timesteps; the converged
//! per-cell histories are then walked a second time to lay out an explicit
//! discrete fracture network of polygons, with stress-shadow interaction,
//! relay linking and cross-boundary continuation.
//!
//! Usage
//! -----
//! Basic usage follows the same pattern for all grids:
//!
//! ```no_run
//! use dfngen::{DFNGenerationControl, FractureGrid, GridblockInput, ImplicitControl,
//!     MechanicalProperties, NoProgress, PropertySample, TimeUnits};
//!
//! // One 200 m x 200 m cell of a 100 m layer at 2 km depth, extended
//! // along the minimum-strain axis for 30 Ma
//! let units = TimeUnits::Ma;
//! let mut input = GridblockInput::boxed(0., 0., 200., 200., -2000., 100.);
//! input.ehmin_rate = PropertySample::Scalar(units.rate_to_si(-3e-8));
//! let control = ImplicitControl {
//!     deformation_duration: units.time_to_si(30.),
//!     ..ImplicitControl::default()
//! };
//! let mut grid = FractureGrid::new(1, 1, &[input],
//!     MechanicalProperties::default(), control, 42, 4).unwrap();
//! // Implicit phase, then the explicit DFN
//! grid.calculate_all_fracture_data(&NoProgress);
//! grid.generate_dfn(&DFNGenerationControl::default(), &NoProgress).unwrap();
//! let dfn = grid.dfn_growth_stages().last().unwrap();
//! println!("{} fractures", dfn.fracture_count());
//! ```

pub mod dfn;
mod dipset;
mod error;
mod fracture_set;
pub mod geometry;
mod grid;
mod gridblock;
mod helpers;
mod progress;
mod properties;
mod stress;
mod units;

pub use dfn::control::{AdjacentSearch, DFNGenerationControl};
pub use dfn::objects::{
    FractureSegment, GlobalDFN, MacrofractureObject, MicrofractureObject, Patch, RelayZone,
    TipState,
};
pub use dipset::{
    FractureDipSet, FractureMode, NucleationPolicy, ShadowContext, TerminationReason,
    TimestepRecord,
};
pub use error::{DfnError, Result};
pub use fracture_set::GridblockFractureSet;
pub use grid::{CellMetrics, FractureGrid};
pub use gridblock::{
    BoundaryShadow, CellEvent, CellGeometry, GridblockConfig, GridblockInput, ImplicitControl,
    PropertySample, SetMetrics,
};
pub use progress::{NoProgress, ProgressReporter, RunStatus};
pub use properties::{ApertureContext, ApertureModel, MechanicalProperties};
pub use stress::{initial_horizontal_ratio, StressDistribution, StressStrainState};
pub use units::TimeUnits;
