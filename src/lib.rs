//! # gridsym: Distributed Symmetrisation of Reciprocal-Space Fields
//!
//! `gridsym` symmetrises complex fields stored on half-space reciprocal-space grids under the
//! action of a space group, with the grid split over several workers along its folded axis. The
//! crate provides:
//! - validated space-group operations in lattice coordinates, with their action on integer
//!   frequency vectors and Hermitian folding into the stored half-space,
//! - a canonical decomposition of every stored grid index into symmetry orbits,
//! - a deterministic block distribution of orbits over workers,
//! - static all-to-all exchange schedules moving per-point data between grid order and orbit
//!   order, and
//! - the symmetrisation pass itself.
//!
//! Workers communicate through the [`comm::Communicator`] trait. A serial communicator and an
//! in-process communicator for a team of threads are included.
//!
//! ## Getting started
//!
//! ```no_run
//! use gridsym::comm::SerialCommunicator;
//! use gridsym::grid::HalfSpaceGrid;
//! use gridsym::symmetrisation::{FieldSymmetriser, FieldSymmetriserParams};
//! use gridsym::symmetry::SymmetryOperations;
//! use ndarray::Array3;
//! use num_complex::Complex;
//!
//! let grid = HalfSpaceGrid::new([8, 8, 8], 1, 0).unwrap();
//! let operations = SymmetryOperations::from_yaml("operations.yml").unwrap();
//! let symmetriser = FieldSymmetriser::new(
//!     grid.clone(),
//!     &operations,
//!     SerialCommunicator,
//!     &FieldSymmetriserParams::default(),
//! )
//! .unwrap();
//! let mut field = Array3::<Complex<f64>>::zeros(grid.shape_h_mine());
//! symmetriser.symmetrise(&mut field).unwrap();
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never installs a logger.
//! Formatted summaries are written to the `gridsym-output` target; stage timings and plan sizes
//! are logged at debug level.

pub(crate) mod auxiliary;
pub mod comm;
pub mod errors;
pub mod grid;
pub mod io;
pub mod orbit;
pub mod partition;
pub mod schedule;
pub mod symmetrisation;
pub mod symmetry;
