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

/// Crate internal helper functions:

// Calculates ceil(x/y) if x > 0
pub(crate) fn ceil_div(x: usize, y: usize) -> usize {
    assert!(x > 0);
    1 + (x - 1) / y
}

// Sorted union of several f64 sequences, exact-value dedup
pub(crate) fn sorted_union(sequences: &[Vec<f64>]) -> Vec<f64> {
    let mut all: Vec<f64> = sequences.iter().flatten().copied().collect();
    all.sort_by(|a, b| a.partial_cmp(b).unwrap());
    all.dedup();
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_div(1, 8), 1);
    }

    #[test]
    fn union_is_sorted_and_unique() {
        let u = sorted_union(&[vec![1., 3., 5.], vec![2., 3., 4.]]);
        assert_eq!(u, vec![1., 2., 3., 4., 5.]);
    }
}
