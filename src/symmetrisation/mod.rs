//! Symmetrisation of distributed half-space fields under a space group.

use std::f64::consts::PI;
use std::fmt;

use anyhow::{self, bail, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use log;
use ndarray::{s, Array1, Array2, Array3, ArrayBase, Axis, DataMut, Dimension, Zip};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::stopwatch::StopWatch;
use crate::comm::Communicator;
use crate::errors::ConfigurationError;
use crate::grid::HalfSpaceGrid;
use crate::io::format::{gridsym_output, log_title, GridSymOutput};
use crate::io::GridSymFileType;
use crate::orbit::OrbitDecomposition;
use crate::partition::DistributionPlan;
use crate::schedule::CommunicationSchedule;
use crate::symmetry::SymmetryOperations;

#[cfg(test)]
#[path = "symmetrisation_tests.rs"]
mod symmetrisation_tests;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for field symmetrisation.
#[derive(Clone, Builder, Debug, Default, Serialize, Deserialize)]
pub struct FieldSymmetriserParams {
    /// Boolean indicating if a summary of the orbit decomposition and of the exchange schedule is
    /// logged after construction.
    #[builder(default = "false")]
    #[serde(default)]
    pub write_orbit_summary: bool,

    /// Optional name for saving the orbit decomposition as a binary file of type
    /// [`GridSymFileType::Orb`]. Only the worker of rank 0 writes the file. If `None`, the
    /// decomposition will not be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub orbit_save_name: Option<String>,
}

impl FieldSymmetriserParams {
    /// Returns a builder to construct a [`FieldSymmetriserParams`] structure.
    pub fn builder() -> FieldSymmetriserParamsBuilder {
        FieldSymmetriserParamsBuilder::default()
    }
}

impl fmt::Display for FieldSymmetriserParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Write orbit summary: {}", self.write_orbit_summary)?;
        match self.orbit_save_name.as_ref() {
            Some(name) => writeln!(
                f,
                "Orbit decomposition file: {}",
                GridSymFileType::Orb.path_for(name).display()
            ),
            None => writeln!(f, "Orbit decomposition file: none"),
        }
    }
}

// ----------
// Symmetriser
// ----------

/// A structure for symmetrising complex fields stored on a distributed half-space grid.
///
/// The orbit decomposition, the distribution of orbits over workers, the exchange schedule and
/// the phase and weight tables are all computed once in [`Self::new`] and reused by every call
/// to [`Self::symmetrise`].
pub struct FieldSymmetriser<C: Communicator> {
    comm: C,

    grid: HalfSpaceGrid,

    orbits: OrbitDecomposition,

    schedule: CommunicationSchedule,

    /// The translation phase $`e^{-2\pi i \mathbf{g} \cdot \mathbf{t}_s}`$ of every local orbit
    /// (row) and operation (column), where $`\mathbf{g}`$ is the frequency of the representative.
    phase: Array2<Complex<f64>>,

    /// The complex conjugate of [`Self::phase`].
    phase_conj: Array2<Complex<f64>>,

    /// The factor applied to the imaginary part of every local orbit member: $`-1`$ for members
    /// that were folded and $`+1`$ otherwise.
    imag_sign: Array2<f64>,

    /// The normalisation weight $`1 / (|G| c_i)`$ of every local grid index $`i`$, where $`c_i`$
    /// is its occurrence count.
    inv_weight: Array1<f64>,
}

impl<C: Communicator> FieldSymmetriser<C> {
    /// Prepares the symmetrisation of fields on `grid` under `operations`.
    ///
    /// This is a collective operation: every worker of `comm` must call it with the same grid
    /// shape and the same operations.
    ///
    /// # Arguments
    ///
    /// * `grid` - The half-space grid, as seen from this worker.
    /// * `operations` - The symmetry operations.
    /// * `comm` - The communicator connecting the workers sharing `grid`.
    /// * `params` - Control parameters.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if the workers of `comm` do not agree on the grid, its
    /// division or the orbit decomposition, if some grid index is left without an orbit, or if
    /// the orbit decomposition cannot be saved.
    pub fn new(
        grid: HalfSpaceGrid,
        operations: &SymmetryOperations,
        comm: C,
        params: &FieldSymmetriserParams,
    ) -> Result<Self, anyhow::Error> {
        let rank = grid.i_proc();
        let orbits = OrbitDecomposition::new(&grid, operations);
        if let Some(index) = orbits.occurrences().iter().position(|&count| count == 0) {
            bail!(ConfigurationError(format!(
                "Grid index {index} is not covered by any orbit."
            )));
        }
        let plan = DistributionPlan::for_orbits(orbits.n_orbits(), grid.split2h())?;
        let schedule = CommunicationSchedule::new(&grid, &orbits, &plan, rank)?;
        schedule.verify(&comm)?;

        let n_sym = orbits.n_sym();
        let local_orbits = plan.orbit_division().range(rank).collect_vec();
        let ops = operations.iter().collect_vec();
        let phase = Array2::from_shape_fn((local_orbits.len(), n_sym), |(o, s)| {
            let g = grid
                .frequency(orbits.representatives()[local_orbits[o]])
                .map(|x| x as f64);
            Complex::from_polar(1.0, -2.0 * PI * g.dot(ops[s].translation()))
        });
        let phase_conj = phase.mapv(|z| z.conj());
        let imag_sign = Array2::from_shape_fn((local_orbits.len(), n_sym), |(o, s)| {
            if orbits.conjugated()[(local_orbits[o], s)] {
                -1.0
            } else {
                1.0
            }
        });
        let inv_weight = Array1::from_shape_fn(grid.n_grid_mine(), |local| {
            1.0 / (n_sym * orbits.occurrences()[grid.global_index(local)]) as f64
        });

        log::info!(
            "Worker {rank}: {} orbit(s) of {} grid index(es) under {n_sym} operation(s), {} orbit(s) local.",
            orbits.n_orbits(),
            orbits.n_tot(),
            local_orbits.len()
        );
        if rank == 0 {
            if params.write_orbit_summary {
                log_title("Field Symmetrisation");
                gridsym_output!("");
                params.log_output_display();
                orbits.log_output_display();
                gridsym_output!("");
                schedule.log_output_display();
                gridsym_output!("");
            }
            if let Some(name) = params.orbit_save_name.as_ref() {
                let path = orbits.save(name)?;
                gridsym_output!("Orbit decomposition saved to `{}`.", path.display());
            }
        }

        Ok(Self {
            comm,
            grid,
            orbits,
            schedule,
            phase,
            phase_conj,
            imag_sign,
            inv_weight,
        })
    }

    pub fn grid(&self) -> &HalfSpaceGrid {
        &self.grid
    }

    pub fn orbits(&self) -> &OrbitDecomposition {
        &self.orbits
    }

    pub fn schedule(&self) -> &CommunicationSchedule {
        &self.schedule
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Symmetrises `field` in place.
    ///
    /// The trailing axes of `field` hold the local block of the grid, either as three axes of
    /// shape [`HalfSpaceGrid::shape_h_mine`] or flattened into one axis; every leading axis is a
    /// batch axis. This is a collective operation whenever more than one worker shares the grid:
    /// every worker must call it with the same batch shape.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if the trailing axes of `field` do not match the local
    /// grid, in which case `field` is left untouched, or if an exchange fails.
    pub fn symmetrise<S, D>(&self, field: &mut ArrayBase<S, D>) -> Result<(), anyhow::Error>
    where
        S: DataMut<Elem = Complex<f64>>,
        D: Dimension,
    {
        let n_batch = self.batch_count(field.shape())?;
        let n_grid = self.grid.n_grid_mine();
        let values = Array2::from_shape_vec((n_batch, n_grid), field.iter().copied().collect())
            .map_err(|err| format_err!(err))?;

        let timer = StopWatch::start("gather");
        let mut v = self.gather(&values, n_batch)?;
        timer.stop();

        let timer = StopWatch::start("conjugate");
        self.conjugate(&mut v);
        timer.stop();

        let timer = StopWatch::start("perform");
        let v_sym = (&v * &self.phase.view().insert_axis(Axis(2))).sum_axis(Axis(1));
        let mut v =
            &v_sym.view().insert_axis(Axis(1)) * &self.phase_conj.view().insert_axis(Axis(2));
        timer.stop();

        let timer = StopWatch::start("conjugate");
        self.conjugate(&mut v);
        timer.stop();

        let timer = StopWatch::start("scatter");
        let mut accumulated = self.scatter(&v, n_batch)?;
        Zip::from(&mut accumulated)
            .and_broadcast(&self.inv_weight)
            .for_each(|x, &w| *x *= w);
        timer.stop();

        field
            .iter_mut()
            .zip(accumulated.iter())
            .for_each(|(x, &y)| *x = y);
        Ok(())
    }

    /// Returns the number of batch entries in a field of shape `shape`.
    fn batch_count(&self, shape: &[usize]) -> Result<usize, anyhow::Error> {
        let mine = self.grid.shape_h_mine();
        let n_dim = shape.len();
        if n_dim >= 3 && shape[n_dim - 3..] == mine {
            Ok(shape[..n_dim - 3].iter().product())
        } else if n_dim >= 1 && shape[n_dim - 1] == self.grid.n_grid_mine() {
            Ok(shape[..n_dim - 1].iter().product())
        } else {
            bail!(ConfigurationError(format!(
                "field of shape {shape:?} does not end with the local grid shape {mine:?} or its \
                flattened length {}",
                self.grid.n_grid_mine()
            )))
        }
    }

    /// Moves `values`, of shape `(n_batch, n_grid_mine)`, into orbit order. The result has shape
    /// `(n_orbits_mine, n_sym, n_batch)`.
    fn gather(
        &self,
        values: &Array2<Complex<f64>>,
        n_batch: usize,
    ) -> Result<Array3<Complex<f64>>, anyhow::Error> {
        let shape = (self.phase.nrows(), self.orbits.n_sym(), n_batch);
        if self.grid.n_procs() == 1 {
            let members = self.orbits.members();
            return Ok(Array3::from_shape_fn(shape, |(o, s, b)| {
                values[(b, members[(o, s)])]
            }));
        }

        let send = self
            .schedule
            .grid_index()
            .iter()
            .flat_map(|&i| values.column(i).into_iter().copied())
            .collect_vec();
        let send_plan = self.schedule.gather().send.scaled(n_batch);
        let recv_plan = self.schedule.gather().recv.scaled(n_batch);
        let recv = self.comm.all_to_all_variable(
            &send,
            send_plan.counts(),
            send_plan.offsets(),
            recv_plan.counts(),
            recv_plan.offsets(),
        )?;
        let orbit_index = self.schedule.orbit_index();
        let n_sym = self.orbits.n_sym();
        Ok(Array3::from_shape_fn(shape, |(o, s, b)| {
            recv[orbit_index[o * n_sym + s] * n_batch + b]
        }))
    }

    /// Moves `v`, of shape `(n_orbits_mine, n_sym, n_batch)`, back into grid order, summing the
    /// contributions of all members stored at the same grid index. The result has shape
    /// `(n_batch, n_grid_mine)`.
    fn scatter(
        &self,
        v: &Array3<Complex<f64>>,
        n_batch: usize,
    ) -> Result<Array2<Complex<f64>>, anyhow::Error> {
        let mut accumulated = Array2::<Complex<f64>>::zeros((n_batch, self.grid.n_grid_mine()));
        if self.grid.n_procs() == 1 {
            for ((o, s), &i) in self.orbits.members().indexed_iter() {
                let mut column = accumulated.column_mut(i);
                column += &v.slice(s![o, s, ..]);
            }
            return Ok(accumulated);
        }

        let n_sym = self.orbits.n_sym();
        let send = self
            .schedule
            .recv_index()
            .iter()
            .flat_map(|&slot| v.slice(s![slot / n_sym, slot % n_sym, ..]).to_vec())
            .collect_vec();
        let send_plan = self.schedule.scatter().send.scaled(n_batch);
        let recv_plan = self.schedule.scatter().recv.scaled(n_batch);
        let recv = self.comm.all_to_all_variable(
            &send,
            send_plan.counts(),
            send_plan.offsets(),
            recv_plan.counts(),
            recv_plan.offsets(),
        )?;
        for (k, &i) in self.schedule.grid_index().iter().enumerate() {
            let mut column = accumulated.column_mut(i);
            column
                .iter_mut()
                .zip(recv[k * n_batch..(k + 1) * n_batch].iter())
                .for_each(|(x, &y)| *x += y);
        }
        Ok(accumulated)
    }

    /// Flips the sign of the imaginary part of every folded member of `v`.
    fn conjugate(&self, v: &mut Array3<Complex<f64>>) {
        Zip::from(v)
            .and_broadcast(self.imag_sign.view().insert_axis(Axis(2)))
            .for_each(|x, &sign| x.im *= sign);
    }
}

impl<C: Communicator> fmt::Debug for FieldSymmetriser<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSymmetriser")
            .field("grid", &self.grid)
            .field("n_orbits", &self.orbits.n_orbits())
            .field("n_orbits_mine", &self.phase.nrows())
            .finish()
    }
}
