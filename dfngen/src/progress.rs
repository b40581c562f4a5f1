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

//! Progress reporting and cancellation port
//!
//! The engine never owns a progress bar or a cancel button. The host hands in
//! an implementation of [ProgressReporter]; the engine calls `update` at cell
//! timestep boundaries and at every explicit construction step, and polls
//! `cancelled` at the same points. Both calls must be cheap.

/// Narrow interface between the engine and the host's progress display
///
/// Implementations must be `Sync`: the implicit phase reports from worker
/// threads.
pub trait ProgressReporter: Sync {
    /// Report completed work units out of a total
    fn update(&self, _completed: usize, _total: usize) {}

    /// Poll for cancellation. Returning `true` makes the engine stop at the
    /// next cell-step or construction-step boundary with partially populated
    /// but well-formed outputs.
    fn cancelled(&self) -> bool {
        false
    }
}

/// Reporter that ignores progress and never cancels
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Outcome of a phase that can be interrupted through the progress port
///
/// Cancellation is a status, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl ProgressReporter for Counting {
        fn update(&self, _c: usize, _t: usize) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
        fn cancelled(&self) -> bool {
            self.calls.load(Ordering::Relaxed) > 2
        }
    }

    #[test]
    fn defaults_are_inert() {
        let p = NoProgress;
        p.update(1, 10);
        assert!(!p.cancelled());
    }

    #[test]
    fn custom_reporter_observes_calls() {
        let p = Counting { calls: AtomicUsize::new(0) };
        for _ in 0..3 {
            p.update(0, 0);
        }
        assert!(p.cancelled());
    }
}
