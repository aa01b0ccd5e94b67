//! Geometry of half-space reciprocal-space grids split over workers.

use std::fmt;

use anyhow::{self, ensure};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::partition::TaskDivision;


/// A structure describing a reciprocal-space grid stored in half-space form.
///
/// A field on a real-space grid of shape $`(n_0, n_1, n_2)`$ has a Hermitian-symmetric Fourier
/// transform, so only the planes $`0 \le i_2 < \lfloor n_2 / 2 \rfloor + 1`$ of the last (folded)
/// axis are stored. These planes are split into contiguous blocks over the workers, and every
/// worker stores its block in row-major order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfSpaceGrid {
    /// The real-space shape of the grid.
    shape: [usize; 3],

    /// The half-space shape of the grid.
    shape_h: [usize; 3],

    /// The division of the planes of the folded axis over workers.
    split2h: TaskDivision,
}

impl HalfSpaceGrid {
    /// Creates a half-space grid of real-space shape `shape`, seen from worker `i_proc` out of
    /// `n_procs`.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if any dimension is zero or the worker rank is
    /// invalid.
    pub fn new(shape: [usize; 3], n_procs: usize, i_proc: usize) -> Result<Self, anyhow::Error> {
        ensure!(
            shape.iter().all(|&n| n > 0),
            ConfigurationError(format!("grid shape {shape:?} has a zero dimension"))
        );
        let shape_h = [shape[0], shape[1], shape[2] / 2 + 1];
        let split2h = TaskDivision::new(shape_h[2], n_procs, i_proc)?;
        Ok(Self {
            shape,
            shape_h,
            split2h,
        })
    }

    pub fn shape(&self) -> &[usize; 3] {
        &self.shape
    }

    pub fn shape_h(&self) -> &[usize; 3] {
        &self.shape_h
    }

    /// The division of the folded axis over workers.
    pub fn split2h(&self) -> &TaskDivision {
        &self.split2h
    }

    pub fn n_procs(&self) -> usize {
        self.split2h.n_procs()
    }

    pub fn i_proc(&self) -> usize {
        self.split2h.i_proc()
    }

    /// The total number of points in the half-space grid.
    pub fn n_tot(&self) -> usize {
        self.shape_h.iter().product()
    }

    /// The shape of the block of the half-space grid stored on this worker.
    pub fn shape_h_mine(&self) -> [usize; 3] {
        [self.shape_h[0], self.shape_h[1], self.split2h.n_mine()]
    }

    /// The number of points stored on this worker.
    pub fn n_grid_mine(&self) -> usize {
        self.shape_h_mine().iter().product()
    }

    /// Flattens a half-space index triple into a global index.
    pub fn flat_index(&self, iv: [usize; 3]) -> usize {
        (iv[0] * self.shape_h[1] + iv[1]) * self.shape_h[2] + iv[2]
    }

    /// Recovers the half-space index triple of a global index.
    pub fn index_triple(&self, index: usize) -> [usize; 3] {
        let i2 = index % self.shape_h[2];
        let i01 = index / self.shape_h[2];
        [i01 / self.shape_h[1], i01 % self.shape_h[1], i2]
    }

    /// Returns the integer frequency vector of a global index.
    ///
    /// Components along the first two axes are centred about zero; the folded component is the
    /// plane index itself.
    pub fn frequency(&self, index: usize) -> Vector3<i64> {
        let [i0, i1, i2] = self.index_triple(index);
        let centre = |k: usize, n: usize| -> i64 {
            if 2 * k < n {
                k as i64
            } else {
                k as i64 - n as i64
            }
        };
        Vector3::new(
            centre(i0, self.shape[0]),
            centre(i1, self.shape[1]),
            i2 as i64,
        )
    }

    /// Returns the rank of the worker storing global index `index`.
    pub fn whose_index(&self, index: usize) -> usize {
        self.split2h.whose(index % self.shape_h[2])
    }

    /// Converts a global index stored on this worker into its position in the local block.
    ///
    /// Returns `None` if `index` is stored elsewhere.
    pub fn local_index(&self, index: usize) -> Option<usize> {
        let [i0, i1, i2] = self.index_triple(index);
        if !(self.split2h.i_start()..self.split2h.i_stop()).contains(&i2) {
            return None;
        }
        let n2_mine = self.split2h.n_mine();
        Some((i0 * self.shape_h[1] + i1) * n2_mine + (i2 - self.split2h.i_start()))
    }

    /// Converts a position in the local block into a global index.
    pub fn global_index(&self, local: usize) -> usize {
        let n2_mine = self.split2h.n_mine();
        let i2 = local % n2_mine + self.split2h.i_start();
        let i01 = local / n2_mine;
        self.flat_index([i01 / self.shape_h[1], i01 % self.shape_h[1], i2])
    }
}

impl fmt::Display for HalfSpaceGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Grid {:?} (half-space {:?}, local {:?} on worker {} of {})",
            self.shape,
            self.shape_h,
            self.shape_h_mine(),
            self.i_proc(),
            self.n_procs()
        )
    }
}
