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

//! Per-gridblock stress and strain tensor state
//!
//! Vertical is always a principal direction; the two horizontal principal
//! directions are the minimum- and maximum-strain axes. Compression is
//! positive, all stresses are effective stresses in Pa.

use crate::error::{DfnError, Result};
use crate::properties::{MechanicalProperties, GRAVITY};

/// How fracture interaction is treated in the implicit population model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StressDistribution {
    /// Stress shadows ignored; every nucleation site stays active
    EvenlyDistributed,
    /// Growing macrofractures cast shadows that deactivate later fractures
    StressShadow,
    /// Reserved
    DuctileBoundary,
}

impl StressDistribution {
    pub fn validate(self) -> Result<()> {
        match self {
            StressDistribution::DuctileBoundary => Err(DfnError::UnsupportedStressDistribution),
            _ => Ok(()),
        }
    }

    /// Whether shadow-driven deactivation and nucleation suppression apply
    pub fn shadows_enabled(self) -> bool {
        self == StressDistribution::StressShadow
    }
}

/// Ratio of initial horizontal to vertical effective stress
///
/// `relaxation` of 0 gives the elastic ratio nu/(1-nu), 1 the viscoelastic
/// (lithostatic) ratio, intermediate values interpolate linearly. A negative
/// value selects the critical state where the Mohr circle touches the Coulomb
/// envelope for the given friction coefficient.
pub fn initial_horizontal_ratio(relaxation: f64, poisson_ratio: f64, friction: f64) -> f64 {
    if relaxation < 0. {
        let f = (1. + friction * friction).sqrt() - friction;
        f * f
    } else {
        let f = relaxation.min(1.);
        let elastic = poisson_ratio / (1. - poisson_ratio);
        (1. - f) * elastic + f
    }
}

/// Evolving stress/strain state of one gridblock
#[derive(Clone, Debug)]
pub struct StressStrainState {
    /// Effective vertical stress, Pa
    pub sigma_v_eff: f64,
    /// Effective horizontal stress along the minimum-strain axis, Pa
    pub sigma_hmin_eff: f64,
    /// Effective horizontal stress along the maximum-strain axis, Pa
    pub sigma_hmax_eff: f64,
    /// Pore fluid pressure, Pa
    pub pore_pressure: f64,
    /// Long-term equilibrium horizontal stress (relaxation target), Pa
    pub sigma_h_equilibrium: f64,
    /// Accumulated driving strain along each axis
    pub strain_hmin: f64,
    pub strain_hmax: f64,
    /// Accumulated fracture-induced strain along each axis
    pub fracture_strain_hmin: f64,
    pub fracture_strain_hmax: f64,
    /// Stress contribution of the fracture-induced strain (target of
    /// fracture-strain relaxation)
    sigma_induced_hmin: f64,
    sigma_induced_hmax: f64,
}

impl StressStrainState {
    /// Initial state for a cell at the given depth of deformation
    pub fn new(props: &MechanicalProperties, depth: f64) -> StressStrainState {
        let pore_pressure =
            (props.fluid_density * GRAVITY * depth + props.overpressure).max(0.);
        let sigma_v_eff = ((props.rock_density - props.fluid_density) * GRAVITY * depth
            - props.biot_coefficient * props.overpressure)
            .max(0.);
        let ratio = initial_horizontal_ratio(
            props.initial_stress_relaxation,
            props.poisson_ratio,
            props.friction_coefficient,
        );
        StressStrainState {
            sigma_v_eff,
            sigma_hmin_eff: ratio * sigma_v_eff,
            sigma_hmax_eff: ratio * sigma_v_eff,
            pore_pressure,
            sigma_h_equilibrium: sigma_v_eff,
            strain_hmin: 0.,
            strain_hmax: 0.,
            fracture_strain_hmin: 0.,
            fracture_strain_hmax: 0.,
            sigma_induced_hmin: 0.,
            sigma_induced_hmax: 0.,
        }
    }

    /// Effective normal stress on a vertical plane whose normal lies at
    /// `normal_angle` from the minimum-strain axis
    pub fn normal_stress(&self, normal_angle: f64) -> f64 {
        let c = normal_angle.cos();
        let s = normal_angle.sin();
        self.sigma_hmin_eff * c * c + self.sigma_hmax_eff * s * s
    }

    /// Advance the horizontal stresses by one timestep
    ///
    /// `driving_*` are the imposed strain rates along the two principal axes
    /// (extension negative), `induced_*` the anisotropic opening-strain
    /// rates produced by fracture growth (positive opening, both in 1/s).
    /// The matrix only carries the elastic share of the imposed strain, so
    /// opening counteracts the driving tension. Rock-strain relaxation
    /// (tau_r) decays the full horizontal stresses towards equilibrium;
    /// fracture-strain relaxation (tau_f) decays only the induced
    /// contribution.
    pub fn step(
        &mut self,
        dt: f64,
        props: &MechanicalProperties,
        driving_hmin: f64,
        driving_hmax: f64,
        induced_hmin: f64,
        induced_hmax: f64,
    ) {
        let e = props.plane_strain_modulus();

        self.strain_hmin += driving_hmin * dt;
        self.strain_hmax += driving_hmax * dt;
        self.fracture_strain_hmin += induced_hmin * dt;
        self.fracture_strain_hmax += induced_hmax * dt;

        let d_ind_hmin = e * induced_hmin * dt;
        let d_ind_hmax = e * induced_hmax * dt;
        self.sigma_hmin_eff += e * driving_hmin * dt + d_ind_hmin;
        self.sigma_hmax_eff += e * driving_hmax * dt + d_ind_hmax;
        self.sigma_induced_hmin += d_ind_hmin;
        self.sigma_induced_hmax += d_ind_hmax;

        if props.rock_strain_relaxation > 0. {
            let f = (dt / props.rock_strain_relaxation).min(1.);
            self.sigma_hmin_eff -= (self.sigma_hmin_eff - self.sigma_h_equilibrium) * f;
            self.sigma_hmax_eff -= (self.sigma_hmax_eff - self.sigma_h_equilibrium) * f;
        } else if props.fracture_strain_relaxation > 0. {
            let f = (dt / props.fracture_strain_relaxation).min(1.);
            let r_hmin = self.sigma_induced_hmin * f;
            let r_hmax = self.sigma_induced_hmax * f;
            self.sigma_induced_hmin -= r_hmin;
            self.sigma_induced_hmax -= r_hmax;
            self.sigma_hmin_eff -= r_hmin;
            self.sigma_hmax_eff -= r_hmax;
        }
    }
}
