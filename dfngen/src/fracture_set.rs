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

//! Orientation roll-up: the dip sets sharing one fracture orientation,
//! with the aperture laws and porosity sums defined per mode

use crate::dipset::{FractureDipSet, FractureMode};
use crate::error::Result;
use crate::properties::{ApertureContext, ApertureModel, MechanicalProperties};
use crate::stress::StressStrainState;

/// All dip sets of one orientation within a gridblock
#[derive(Clone, Debug)]
pub struct GridblockFractureSet {
    /// Angle of the set normal from the minimum-strain axis, `[0, pi)`
    pub normal_angle: f64,
    /// One dip set per mode (Mode 1 first)
    pub dip_sets: Vec<FractureDipSet>,
    /// Aperture law for dilatant fractures
    pub mode1_aperture: ApertureModel,
    /// Aperture law for shear fractures
    pub mode2_aperture: ApertureModel,
}

impl GridblockFractureSet {
    pub fn new(
        normal_angle: f64,
        props: &MechanicalProperties,
        layer_thickness: f64,
        cell_volume: f64,
        n_bins: usize,
        min_radius: f64,
        mode1_aperture: ApertureModel,
        mode2_aperture: ApertureModel,
    ) -> Result<GridblockFractureSet> {
        mode1_aperture.validate()?;
        mode2_aperture.validate()?;
        let dip_sets = vec![
            FractureDipSet::new(
                FractureMode::Mode1,
                normal_angle,
                props,
                layer_thickness,
                cell_volume,
                n_bins,
                min_radius,
            )?,
            FractureDipSet::new(
                FractureMode::Mode2,
                normal_angle,
                props,
                layer_thickness,
                cell_volume,
                n_bins,
                min_radius,
            )?,
        ];
        Ok(GridblockFractureSet {
            normal_angle,
            dip_sets,
            mode1_aperture,
            mode2_aperture,
        })
    }

    pub fn aperture_model(&self, mode: FractureMode) -> &ApertureModel {
        match mode {
            FractureMode::Mode1 => &self.mode1_aperture,
            FractureMode::Mode2 => &self.mode2_aperture,
        }
    }

    pub fn is_active(&self) -> bool {
        self.dip_sets.iter().any(|d| d.is_active())
    }

    /// Combined areal intensity of micro- and macrofractures, 1/m
    pub fn combined_p32(&self) -> f64 {
        self.dip_sets.iter().map(|d| d.mfp32() + d.ufp32()).sum()
    }

    pub fn combined_mfp32(&self) -> f64 {
        self.dip_sets.iter().map(|d| d.mfp32()).sum()
    }

    /// Combined stress-shadow volume fraction of this orientation
    pub fn combined_mfp33(&self) -> f64 {
        self.dip_sets.iter().map(|d| d.mfp33()).sum()
    }

    pub fn combined_ufp33(&self) -> f64 {
        self.dip_sets.iter().map(|d| d.ufp33()).sum()
    }

    /// Mean macrofracture aperture of one mode under the current stress, m
    pub fn mean_macro_aperture(
        &self,
        mode: FractureMode,
        stress: &StressStrainState,
        props: &MechanicalProperties,
        layer_thickness: f64,
    ) -> f64 {
        let ctx = ApertureContext {
            sigma_n_eff: stress.normal_stress(self.normal_angle),
            size: layer_thickness,
            youngs_modulus: props.youngs_modulus,
            poisson_ratio: props.poisson_ratio,
        };
        self.aperture_model(mode).aperture(&ctx)
    }

    /// Fracture porosity of this orientation: `P32 x mean aperture`, summed
    /// over modes and size classes
    pub fn porosity(
        &self,
        stress: &StressStrainState,
        props: &MechanicalProperties,
        layer_thickness: f64,
    ) -> f64 {
        let sigma_n = stress.normal_stress(self.normal_angle);
        let mut phi = 0.;
        for dip_set in &self.dip_sets {
            let model = self.aperture_model(dip_set.mode);
            let macro_ctx = ApertureContext {
                sigma_n_eff: sigma_n,
                size: layer_thickness,
                youngs_modulus: props.youngs_modulus,
                poisson_ratio: props.poisson_ratio,
            };
            phi += dip_set.mfp32() * model.aperture(&macro_ctx);
            for (r_lo, r_hi, p30) in dip_set.bin_densities() {
                let r = 0.5 * (r_lo + r_hi);
                let micro_ctx = ApertureContext {
                    sigma_n_eff: sigma_n,
                    size: 2. * r,
                    youngs_modulus: props.youngs_modulus,
                    poisson_ratio: props.poisson_ratio,
                };
                phi += p30 * std::f64::consts::PI * r * r * model.aperture(&micro_ctx);
            }
        }
        phi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_set() -> (GridblockFractureSet, MechanicalProperties) {
        let props = MechanicalProperties::default();
        let set = GridblockFractureSet::new(
            0.,
            &props,
            100.,
            100. * 200. * 200.,
            10,
            0.05,
            ApertureModel::Uniform { aperture: 5e-4 },
            ApertureModel::Uniform { aperture: 1e-4 },
        )
        .unwrap();
        (set, props)
    }

    #[test]
    fn two_modes_per_orientation() {
        let (set, _) = make_set();
        assert_eq!(set.dip_sets.len(), 2);
        assert_eq!(set.dip_sets[0].mode, FractureMode::Mode1);
        assert_eq!(set.dip_sets[1].mode, FractureMode::Mode2);
        assert!(set.is_active());
    }

    #[test]
    fn porosity_is_p32_times_aperture() {
        let (set, props) = make_set();
        let stress = StressStrainState::new(&props, 2000.);
        let phi = set.porosity(&stress, &props, 100.);
        // Seeded microfracture population with uniform apertures: porosity is
        // bounded by total P32 times the larger aperture
        assert!(phi > 0.);
        assert!(phi <= set.combined_p32() * 5e-4 + 1e-15);
    }

    #[test]
    fn aperture_model_dispatch_per_mode() {
        let (set, props) = make_set();
        let stress = StressStrainState::new(&props, 2000.);
        let a1 = set.mean_macro_aperture(FractureMode::Mode1, &stress, &props, 100.);
        let a2 = set.mean_macro_aperture(FractureMode::Mode2, &stress, &props, 100.);
        assert_eq!(a1, 5e-4);
        assert_eq!(a2, 1e-4);
    }
}
