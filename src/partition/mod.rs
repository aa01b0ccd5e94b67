//! Block partitions of index ranges over workers.

use std::fmt;
use std::ops::Range;

use anyhow::{self, ensure};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;


// ==================
// Struct definitions
// ==================

/// A structure describing the division of `n_tot` tasks into contiguous blocks over `n_procs`
/// workers.
///
/// Every block holds $`\lceil n_{\mathrm{tot}} / n_{\mathrm{procs}} \rceil`$ tasks except for the
/// trailing ones, which may be shorter or even empty. Every worker computes identical boundaries
/// from `n_tot` and `n_procs` alone.
///
/// Trailing workers can own nothing: `n_tot = 5` over `n_procs = 4` gives blocks of 2, 2, 1 and 0.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDivision {
    /// The total number of tasks.
    n_tot: usize,

    /// The number of workers sharing the tasks.
    n_procs: usize,

    /// The rank of the worker owning this view of the division.
    i_proc: usize,

    /// The nominal number of tasks per worker.
    n_each: usize,

    /// The `n_procs + 1` block boundaries. Worker `p` owns `n_prev[p]..n_prev[p + 1]`.
    n_prev: Vec<usize>,
}

impl TaskDivision {
    /// Divides `n_tot` tasks over `n_procs` workers, as seen from worker `i_proc`.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if `n_procs` is zero or `i_proc` is not a valid rank.
    pub fn new(n_tot: usize, n_procs: usize, i_proc: usize) -> Result<Self, anyhow::Error> {
        ensure!(
            n_procs > 0,
            ConfigurationError("a task division needs at least one worker".to_string())
        );
        ensure!(
            i_proc < n_procs,
            ConfigurationError(format!(
                "worker rank {i_proc} is out of range for {n_procs} worker(s)"
            ))
        );
        let n_each = (n_tot + n_procs - 1) / n_procs;
        let n_prev = (0..=n_procs)
            .map(|p| (p * n_each).min(n_tot))
            .collect::<Vec<_>>();
        Ok(Self {
            n_tot,
            n_procs,
            i_proc,
            n_each,
            n_prev,
        })
    }

    pub fn n_tot(&self) -> usize {
        self.n_tot
    }

    pub fn n_procs(&self) -> usize {
        self.n_procs
    }

    pub fn i_proc(&self) -> usize {
        self.i_proc
    }

    /// The block boundaries, of length `n_procs + 1`.
    pub fn n_prev(&self) -> &[usize] {
        &self.n_prev
    }

    /// The first task owned by this worker.
    pub fn i_start(&self) -> usize {
        self.n_prev[self.i_proc]
    }

    /// One past the last task owned by this worker.
    pub fn i_stop(&self) -> usize {
        self.n_prev[self.i_proc + 1]
    }

    /// The number of tasks owned by this worker.
    pub fn n_mine(&self) -> usize {
        self.i_stop() - self.i_start()
    }

    /// The tasks owned by worker `p`.
    ///
    /// # Panics
    ///
    /// Panics if `p` is not a valid rank.
    pub fn range(&self, p: usize) -> Range<usize> {
        self.n_prev[p]..self.n_prev[p + 1]
    }

    /// The number of tasks owned by each worker, in rank order.
    pub fn counts(&self) -> Vec<usize> {
        self.n_prev.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Returns the rank of the worker owning task `i`.
    pub fn whose(&self, i: usize) -> usize {
        debug_assert!(i < self.n_tot, "Task {i} is out of range.");
        i / self.n_each.max(1)
    }

    /// Returns the rank of the worker owning each task in `indices`.
    pub fn whose_each(&self, indices: &[usize]) -> Vec<usize> {
        indices.iter().map(|&i| self.whose(i)).collect()
    }
}

impl fmt::Display for TaskDivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} task(s) over {} worker(s), {} on worker {} ([{}, {}))",
            self.n_tot,
            self.n_procs,
            self.n_mine(),
            self.i_proc,
            self.i_start(),
            self.i_stop()
        )
    }
}

/// A structure pairing the division of symmetry orbits over workers with the pre-existing
/// division of the grid's folded axis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPlan {
    /// Contiguous blocks of orbits, numbered in increasing order of their representatives.
    orbit_division: TaskDivision,

    /// Contiguous blocks of planes along the folded axis of the half-space grid.
    grid_division: TaskDivision,
}

impl DistributionPlan {
    /// Pairs an orbit division with a grid division.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if the two divisions disagree on the number of
    /// workers or on the rank of the local worker.
    pub fn new(
        orbit_division: TaskDivision,
        grid_division: TaskDivision,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            orbit_division.n_procs() == grid_division.n_procs(),
            ConfigurationError(format!(
                "orbits are divided over {} worker(s) but the grid is divided over {}",
                orbit_division.n_procs(),
                grid_division.n_procs()
            ))
        );
        ensure!(
            orbit_division.i_proc() == grid_division.i_proc(),
            ConfigurationError(format!(
                "orbit division is seen from worker {} but grid division from worker {}",
                orbit_division.i_proc(),
                grid_division.i_proc()
            ))
        );
        Ok(Self {
            orbit_division,
            grid_division,
        })
    }

    /// Divides `n_orbits` orbits over the same workers as `grid_division`.
    pub fn for_orbits(
        n_orbits: usize,
        grid_division: &TaskDivision,
    ) -> Result<Self, anyhow::Error> {
        let orbit_division =
            TaskDivision::new(n_orbits, grid_division.n_procs(), grid_division.i_proc())?;
        Self::new(orbit_division, grid_division.clone())
    }

    pub fn orbit_division(&self) -> &TaskDivision {
        &self.orbit_division
    }

    pub fn grid_division(&self) -> &TaskDivision {
        &self.grid_division
    }

    pub fn n_procs(&self) -> usize {
        self.orbit_division.n_procs()
    }

    /// Returns the rank of the worker owning orbit `orbit`.
    pub fn orbit_owner(&self, orbit: usize) -> usize {
        self.orbit_division.whose(orbit)
    }

    /// Returns the rank of the worker owning plane `plane` of the folded axis.
    pub fn grid_owner(&self, plane: usize) -> usize {
        self.grid_division.whose(plane)
    }
}
