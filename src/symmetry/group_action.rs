//! Action of symmetry operations on half-space grid indices.
//!
//! Everything here is integer arithmetic so that every worker reproduces the same orbit
//! structure bit for bit without communicating.

use nalgebra::{Matrix3, Vector3};

use crate::grid::HalfSpaceGrid;
use crate::symmetry::SymmetryOperation;

/// Rotates a frequency vector. Frequencies transform by the transpose of the lattice-coordinate
/// rotation.
pub fn rotate_frequency(g: &Vector3<i64>, rotation: &Matrix3<i64>) -> Vector3<i64> {
    rotation.transpose() * g
}

/// Reduces a frequency vector onto the stored half of the grid.
///
/// Every component is wrapped into $`[0, n_k)`$. If the folded component then lies in the
/// redundant half, the whole vector is negated modulo the period and the returned flag is set,
/// meaning that the value at the returned index must be complex-conjugated.
///
/// # Returns
///
/// The global half-space index and the conjugation flag.
pub fn fold_index(g: &Vector3<i64>, grid: &HalfSpaceGrid) -> (usize, bool) {
    let shape = grid.shape();
    let wrap = |x: i64, k: usize| -> usize { x.rem_euclid(shape[k] as i64) as usize };
    let wrapped = [wrap(g[0], 0), wrap(g[1], 1), wrap(g[2], 2)];
    let is_conj = wrapped[2] >= grid.shape_h()[2];
    let folded = if is_conj {
        [
            wrap(-(wrapped[0] as i64), 0),
            wrap(-(wrapped[1] as i64), 1),
            wrap(-(wrapped[2] as i64), 2),
        ]
    } else {
        wrapped
    };
    (grid.flat_index(folded), is_conj)
}

/// Applies `op` to the frequency vector `g` and folds the image onto the stored half-space.
pub fn apply(g: &Vector3<i64>, op: &SymmetryOperation, grid: &HalfSpaceGrid) -> (usize, bool) {
    fold_index(&rotate_frequency(g, op.rotation()), grid)
}
