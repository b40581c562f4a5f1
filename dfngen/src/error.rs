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

//! Error types for the fracture growth engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, DfnError>;

/// Error type for the fracture growth engine
///
/// Configuration errors are fatal at grid construction; everything that can
/// go wrong per cell during a run is reported as a cell event instead and
/// never crosses the parallel loop as an error.
#[derive(Error, Debug)]
pub enum DfnError {
    /// Inconsistent or out-of-range run configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The ductile boundary stress distribution is reserved but not implemented
    #[error("stress distribution 'DuctileBoundary' is reserved and not implemented")]
    UnsupportedStressDistribution,

    /// Grid construction failure (dimension mismatch, no valid cells, ...)
    #[error("grid error: {0}")]
    Grid(String),
}

impl DfnError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        DfnError::Config(msg.into())
    }

    /// Create a grid error
    pub fn grid(msg: impl Into<String>) -> Self {
        DfnError::Grid(msg.into())
    }
}
