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

//! Configuration record for the explicit DFN phase

use std::f64::consts::FRAC_PI_2;

use crate::error::{DfnError, Result};

/// Whether stress-shadow searches look into neighboring cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdjacentSearch {
    /// Same-cell search only
    None,
    /// Always search the four neighbors
    All,
    /// Decide per cell by comparing the cell extent to the typical shadow
    /// width
    Automatic,
}

/// All recognized options of explicit DFN generation
#[derive(Clone, Debug)]
pub struct DFNGenerationControl {
    /// Skip the explicit phase entirely when false
    pub generate_explicit: bool,
    /// Microfractures below this radius are omitted, m
    pub min_microfracture_radius: f64,
    /// Macrofractures shorter than this are omitted, m
    pub min_macrofracture_length: f64,
    /// Cells with thinner layers emit no macrofractures, m
    pub min_layer_thickness: f64,
    /// Largest azimuth mismatch allowed for cross-boundary continuation, rad
    pub max_consistency_angle: f64,
    /// Crop tips at unconnectable boundaries instead of propagating out
    pub crop_at_boundary: bool,
    /// Emit relay-zone patches linking shadow-terminated tips
    pub link_stress_shadows: bool,
    /// Cornerpoints per microfracture polygon (0 keeps centre + radius only)
    pub microfracture_cornerpoints: usize,
    /// Number of intermediate growth stages before the final one
    pub n_intermediate_outputs: usize,
    /// Space intermediate stages equally in time (true) or in total fracture
    /// area (false)
    pub intermediates_by_time: bool,
    /// Record macrofracture centrelines
    pub output_centrepoints: bool,
    /// Per-step expectation below which nucleation counts are drawn from a
    /// Poisson distribution; 0 disables, negative selects the automatic
    /// threshold of one fracture per step
    pub probabilistic_nucleation_limit: f64,
    pub search_adjacent: AdjacentSearch,
    /// Propagate fractures in global nucleation order instead of set order
    pub propagate_in_nucleation_order: bool,
    /// Replace quadrilateral patches by triangles
    pub triangular_segments: bool,
    /// Seed of the explicit phase's random draws
    pub seed: u64,
}

impl Default for DFNGenerationControl {
    fn default() -> DFNGenerationControl {
        DFNGenerationControl {
            generate_explicit: true,
            min_microfracture_radius: 0.,
            min_macrofracture_length: 0.,
            min_layer_thickness: 1.,
            max_consistency_angle: 0.4,
            crop_at_boundary: true,
            link_stress_shadows: true,
            microfracture_cornerpoints: 8,
            n_intermediate_outputs: 0,
            intermediates_by_time: true,
            output_centrepoints: true,
            probabilistic_nucleation_limit: -1.,
            search_adjacent: AdjacentSearch::Automatic,
            propagate_in_nucleation_order: true,
            triangular_segments: false,
            seed: 0,
        }
    }
}

impl DFNGenerationControl {
    pub fn validated(self) -> Result<DFNGenerationControl> {
        if !(self.min_microfracture_radius >= 0.) {
            return Err(DfnError::config("minimum microfracture radius must be non-negative"));
        }
        if !(self.min_macrofracture_length >= 0.) {
            return Err(DfnError::config("minimum macrofracture length must be non-negative"));
        }
        if !(self.min_layer_thickness > 0.) {
            return Err(DfnError::config("minimum layer thickness must be positive"));
        }
        if !(self.max_consistency_angle > 0. && self.max_consistency_angle <= FRAC_PI_2) {
            return Err(DfnError::config("maximum consistency angle must lie in (0, pi/2]"));
        }
        if self.microfracture_cornerpoints != 0 && self.microfracture_cornerpoints < 3 {
            return Err(DfnError::config(
                "microfracture cornerpoint count must be 0 or at least 3",
            ));
        }
        Ok(self)
    }

    /// Poisson threshold with the automatic (-1) value resolved
    pub fn resolved_nucleation_limit(&self) -> f64 {
        if self.probabilistic_nucleation_limit < 0. {
            1.
        } else {
            self.probabilistic_nucleation_limit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(DFNGenerationControl::default().validated().is_ok());
    }

    #[test]
    fn bad_options_are_rejected() {
        let mut c = DFNGenerationControl::default();
        c.max_consistency_angle = 2.;
        assert!(c.validated().is_err());
        let mut c = DFNGenerationControl::default();
        c.max_consistency_angle = 0.;
        assert!(c.validated().is_err());
        let mut c = DFNGenerationControl::default();
        c.microfracture_cornerpoints = 2;
        assert!(c.validated().is_err());
        let mut c = DFNGenerationControl::default();
        c.min_layer_thickness = 0.;
        assert!(c.validated().is_err());
    }

    #[test]
    fn nucleation_limit_resolution() {
        let mut c = DFNGenerationControl::default();
        c.probabilistic_nucleation_limit = -1.;
        assert_eq!(c.resolved_nucleation_limit(), 1.);
        c.probabilistic_nucleation_limit = 0.;
        assert_eq!(c.resolved_nucleation_limit(), 0.);
        c.probabilistic_nucleation_limit = 0.25;
        assert_eq!(c.resolved_nucleation_limit(), 0.25);
    }
}
