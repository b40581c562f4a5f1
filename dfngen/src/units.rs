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

//! Time unit handling
//!
//! All internal arithmetic is carried out in SI units (seconds, pascals,
//! metres). The only unit degree of freedom exposed to the caller is the time
//! unit of rates and durations, converted once at the input and output
//! boundaries.

/// Seconds per Julian year
const SECONDS_PER_YEAR: f64 = 3.15576e7;

/// Time unit of all externally supplied rates and durations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnits {
    Seconds,
    Years,
    /// Megayears
    Ma,
}

impl TimeUnits {
    /// Conversion factor from this unit to SI seconds
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnits::Seconds => 1.,
            TimeUnits::Years => SECONDS_PER_YEAR,
            TimeUnits::Ma => SECONDS_PER_YEAR * 1e6,
        }
    }

    /// Convert a duration in this unit to seconds
    pub fn time_to_si(self, t: f64) -> f64 {
        t * self.seconds_per_unit()
    }

    /// Convert a duration in seconds to this unit
    pub fn time_from_si(self, t: f64) -> f64 {
        t / self.seconds_per_unit()
    }

    /// Convert a rate in 1/unit to 1/s
    pub fn rate_to_si(self, r: f64) -> f64 {
        r / self.seconds_per_unit()
    }

    /// Convert a rate in 1/s to 1/unit
    pub fn rate_from_si(self, r: f64) -> f64 {
        r * self.seconds_per_unit()
    }

    /// Display label for rates expressed in this unit
    pub fn rate_label(self) -> &'static str {
        match self {
            TimeUnits::Seconds => "1/s",
            TimeUnits::Years => "1/yr",
            TimeUnits::Ma => "1/Ma",
        }
    }
}
