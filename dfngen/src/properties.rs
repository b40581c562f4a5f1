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

//! Per-gridblock mechanical and fracture properties, and the aperture laws

use std::f64::consts::PI;

use crate::error::{DfnError, Result};

/// Standard gravity in m/s^2
pub const GRAVITY: f64 = 9.81;

/// Elastic and subcritical fracture parameters of one gridblock
///
/// All values are SI. Strain-relaxation time constants of zero disable the
/// respective relaxation term.
#[derive(Clone, Debug)]
pub struct MechanicalProperties {
    /// Young's modulus E in Pa
    pub youngs_modulus: f64,
    /// Poisson's ratio
    pub poisson_ratio: f64,
    /// Biot poroelastic coefficient
    pub biot_coefficient: f64,
    /// Specific crack surface energy in J/m^2
    pub crack_surface_energy: f64,
    /// Coulomb friction coefficient on fracture surfaces
    pub friction_coefficient: f64,
    /// Subcritical crack propagation index b
    pub subcritical_index: f64,
    /// Initial microfracture density A (prefactor of N(>r) = A r^-c, 1/m^3)
    pub initial_density: f64,
    /// Microfracture size distribution exponent c
    pub size_exponent: f64,
    /// Rock strain relaxation time constant in s (0 disables)
    pub rock_strain_relaxation: f64,
    /// Fracture strain relaxation time constant in s (0 disables)
    pub fracture_strain_relaxation: f64,
    /// Critical (maximum) fracture tip velocity in m/s
    pub critical_velocity: f64,
    /// Bulk rock density in kg/m^3
    pub rock_density: f64,
    /// Pore fluid density in kg/m^3
    pub fluid_density: f64,
    /// Pore fluid overpressure above hydrostatic in Pa
    pub overpressure: f64,
    /// Initial stress relaxation selector: 0 elastic, 1 viscoelastic,
    /// intermediate values interpolate, negative selects critical stress
    pub initial_stress_relaxation: f64,
}

impl Default for MechanicalProperties {
    fn default() -> MechanicalProperties {
        MechanicalProperties {
            youngs_modulus: 1e10,
            poisson_ratio: 0.25,
            biot_coefficient: 1.,
            crack_surface_energy: 1000.,
            friction_coefficient: 0.5,
            subcritical_index: 10.,
            initial_density: 1e-3,
            size_exponent: 2.,
            rock_strain_relaxation: 0.,
            fracture_strain_relaxation: 0.,
            critical_velocity: 2000.,
            rock_density: 2500.,
            fluid_density: 1000.,
            overpressure: 0.,
            initial_stress_relaxation: 1.,
        }
    }
}

impl MechanicalProperties {
    /// Check physical admissibility of the parameter set
    pub fn validate(&self) -> Result<()> {
        if !(self.youngs_modulus > 0.) {
            return Err(DfnError::config("Young's modulus must be positive"));
        }
        if !(self.poisson_ratio > 0. && self.poisson_ratio < 0.5) {
            return Err(DfnError::config("Poisson's ratio must lie in (0, 0.5)"));
        }
        if !(self.biot_coefficient >= 0. && self.biot_coefficient <= 1.) {
            return Err(DfnError::config("Biot coefficient must lie in [0, 1]"));
        }
        if !(self.crack_surface_energy > 0.) {
            return Err(DfnError::config("crack surface energy must be positive"));
        }
        if !(self.friction_coefficient >= 0.) {
            return Err(DfnError::config("friction coefficient must be non-negative"));
        }
        if !(self.subcritical_index > 0.) {
            return Err(DfnError::config("subcritical index must be positive"));
        }
        if !(self.initial_density >= 0.) {
            return Err(DfnError::config("initial microfracture density must be non-negative"));
        }
        if !(self.size_exponent > 0.) {
            return Err(DfnError::config("size distribution exponent must be positive"));
        }
        if !(self.rock_strain_relaxation >= 0.) || !(self.fracture_strain_relaxation >= 0.) {
            return Err(DfnError::config("strain relaxation time constants must be non-negative"));
        }
        if !(self.critical_velocity > 0.) {
            return Err(DfnError::config("critical tip velocity must be positive"));
        }
        if !(self.rock_density > 0.) || !(self.fluid_density >= 0.) {
            return Err(DfnError::config("densities must be positive"));
        }
        Ok(())
    }

    /// Plane strain modulus E' = E / (1 - nu^2)
    pub fn plane_strain_modulus(&self) -> f64 {
        self.youngs_modulus / (1. - self.poisson_ratio * self.poisson_ratio)
    }

    /// Mode 1 fracture toughness from the crack surface energy,
    /// K_Ic = sqrt(2 E gamma / (1 - nu^2))
    pub fn fracture_toughness(&self) -> f64 {
        (2. * self.youngs_modulus * self.crack_surface_energy
            / (1. - self.poisson_ratio * self.poisson_ratio))
            .sqrt()
    }

    /// Stress-shadow width factor (plane-strain crack opening decay scale)
    pub fn shadow_width_factor(&self) -> f64 {
        2. * (1. - self.poisson_ratio * self.poisson_ratio) / PI
    }
}

/// Aperture law of one (orientation, mode) fracture family
///
/// A single `aperture` operation dispatches on the variant.
#[derive(Clone, Debug)]
pub enum ApertureModel {
    /// Constant aperture in m
    Uniform { aperture: f64 },
    /// Aperture proportional to fracture size (radius or layer thickness)
    SizeDependent { multiplier: f64 },
    /// Elastic crack-opening aperture under the current effective normal
    /// stress, scaled by a multiplier
    Dynamic { multiplier: f64 },
    /// Barton-Bandis closure curve
    BartonBandis {
        /// Joint roughness coefficient
        jrc: f64,
        /// Ratio of compressive strength to joint wall compressive strength
        ucs_ratio: f64,
        /// Effective normal stress at which the curve is anchored, Pa
        initial_normal_stress: f64,
        /// Initial normal stiffness K_ni in Pa/m
        initial_stiffness: f64,
        /// Maximum joint closure in m
        max_closure: f64,
    },
}

/// Stress- and size context handed to the aperture dispatch
#[derive(Clone, Copy, Debug)]
pub struct ApertureContext {
    /// Effective normal stress on the fracture plane, Pa (compression positive)
    pub sigma_n_eff: f64,
    /// Characteristic fracture dimension (2r for a microfracture, layer
    /// thickness for a macrofracture), m
    pub size: f64,
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

impl ApertureModel {
    /// Mean hydraulic aperture of a fracture under the given context, in m
    pub fn aperture(&self, ctx: &ApertureContext) -> f64 {
        match self {
            ApertureModel::Uniform { aperture } => *aperture,
            ApertureModel::SizeDependent { multiplier } => multiplier * ctx.size,
            ApertureModel::Dynamic { multiplier } => {
                // Elastic opening of a crack held by net driving stress; zero
                // once the effective normal stress is compressive.
                let opening_stress = (-ctx.sigma_n_eff).max(0.);
                multiplier * 8. * (1. - ctx.poisson_ratio * ctx.poisson_ratio) * opening_stress
                    * ctx.size
                    / (PI * ctx.youngs_modulus)
            }
            ApertureModel::BartonBandis {
                jrc,
                ucs_ratio,
                initial_normal_stress,
                initial_stiffness,
                max_closure,
            } => {
                // Bandis initial aperture, JRC/5 (0.2 sigma_c/JCS - 0.1), in mm
                let a0 = ((jrc / 5.) * (0.2 * ucs_ratio - 0.1) * 1e-3).max(1e-6);
                let sigma = (ctx.sigma_n_eff - initial_normal_stress).max(0.);
                let closed = a0 / (1. + sigma / (initial_stiffness * a0));
                closed.max(a0 - max_closure).max(0.)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            ApertureModel::Uniform { aperture } => *aperture >= 0.,
            ApertureModel::SizeDependent { multiplier } => *multiplier >= 0.,
            ApertureModel::Dynamic { multiplier } => *multiplier >= 0.,
            ApertureModel::BartonBandis { initial_stiffness, max_closure, .. } => {
                *initial_stiffness > 0. && *max_closure >= 0.
            }
        };
        if ok {
            Ok(())
        } else {
            Err(DfnError::config("aperture model parameters out of range"))
        }
    }
}
