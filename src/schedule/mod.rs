//! Static exchange schedules moving per-point data between grid order and orbit order.

use std::fmt;

use anyhow::{self, ensure};
use itertools::Itertools;
use log;
use serde::{Deserialize, Serialize};

use crate::comm::Communicator;
use crate::errors::ConfigurationError;
use crate::grid::HalfSpaceGrid;
use crate::io::format::{write_heading, write_table};
use crate::orbit::OrbitDecomposition;
use crate::partition::{DistributionPlan, TaskDivision};


// ==================
// Struct definitions
// ==================

/// Per-worker element counts and their exclusive prefix sums, in rank order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePlan {
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl ExchangePlan {
    /// Constructs a plan from per-worker counts, laying the segments out contiguously in rank
    /// order.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let offsets = counts
            .iter()
            .scan(0, |acc, &count| {
                let offset = *acc;
                *acc += count;
                Some(offset)
            })
            .collect_vec();
        Self { counts, offsets }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The total number of elements over all workers.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Returns the plan for moving `n_batch` values per element, stored element-major.
    pub fn scaled(&self, n_batch: usize) -> Self {
        Self {
            counts: self.counts.iter().map(|c| c * n_batch).collect(),
            offsets: self.offsets.iter().map(|o| o * n_batch).collect(),
        }
    }
}

/// The send and receive sides of one exchange direction, as seen from one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionalPlan {
    pub send: ExchangePlan,
    pub recv: ExchangePlan,
}

impl DirectionalPlan {
    /// Returns the plan of the reverse exchange.
    pub fn transpose(&self) -> Self {
        Self {
            send: self.recv.clone(),
            recv: self.send.clone(),
        }
    }
}

/// A structure containing everything one worker needs to move field values from its grid block
/// to the orbits it owns (gather) and back (scatter).
///
/// Orbit-member *slots* of the local orbits are numbered `o * n_sym + s`, where `o` counts the
/// local orbits in increasing order and `s` is the operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommunicationSchedule {
    /// The rank of the worker owning this schedule.
    rank: usize,

    /// The real-space shape of the grid the schedule was derived for.
    shape: [usize; 3],

    /// The number of orbits and operations the schedule was derived for.
    n_orbits: usize,
    n_sym: usize,

    /// The distribution the schedule was derived from.
    plan: DistributionPlan,

    /// The grid-order to orbit-order exchange.
    gather: DirectionalPlan,

    /// The orbit-order to grid-order exchange, the transpose of [`Self::gather`].
    scatter: DirectionalPlan,

    /// The local grid index of every element sent during the gather, in send order.
    grid_index: Vec<usize>,

    /// The local slot of every element received during the gather, in receive order.
    recv_index: Vec<usize>,

    /// The inverse of [`Self::recv_index`]: the receive position of every local slot.
    orbit_index: Vec<usize>,
}

impl CommunicationSchedule {
    /// Derives the exchange schedule of worker `rank`.
    ///
    /// Elements are sent in orbit-major, operation-minor order, keeping only members whose grid
    /// point this worker stores. Since orbit owners increase with the orbit number, this order is
    /// already grouped by destination. On the receiving side, the slots of the local orbits are
    /// stably sorted by the worker storing their grid point, which reproduces the order in which
    /// every source sends them.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if `plan` does not match the worker count, the rank,
    /// the grid division or the number of orbits.
    pub fn new(
        grid: &HalfSpaceGrid,
        orbits: &OrbitDecomposition,
        plan: &DistributionPlan,
        rank: usize,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            plan.grid_division() == grid.split2h(),
            ConfigurationError(format!(
                "the distribution splits the grid as {} but the grid is split as {}",
                plan.grid_division(),
                grid.split2h()
            ))
        );
        ensure!(
            plan.orbit_division().n_tot() == orbits.n_orbits(),
            ConfigurationError(format!(
                "the distribution divides {} orbit(s) but the decomposition has {}",
                plan.orbit_division().n_tot(),
                orbits.n_orbits()
            ))
        );
        ensure!(
            rank == plan.orbit_division().i_proc(),
            ConfigurationError(format!(
                "schedule requested for worker {rank} from the distribution of worker {}",
                plan.orbit_division().i_proc()
            ))
        );
        let n_procs = plan.n_procs();
        let n_sym = orbits.n_sym();
        let members = orbits.members();
        let grid_owner = |member: usize| plan.grid_owner(member % grid.shape_h()[2]);

        // Send side.
        let mut send_counts = vec![0; n_procs];
        let mut grid_index = Vec::new();
        for (orbit, row) in members.outer_iter().enumerate() {
            let dest = plan.orbit_owner(orbit);
            for &member in row.iter().filter(|&&member| grid_owner(member) == rank) {
                let local = grid.local_index(member).ok_or_else(|| {
                    ConfigurationError(format!(
                        "grid index {member} is assigned to worker {rank} but not stored there"
                    ))
                })?;
                grid_index.push(local);
                send_counts[dest] += 1;
            }
        }

        // Receive side.
        let local_orbits = plan.orbit_division().range(rank);
        let sources = local_orbits
            .clone()
            .flat_map(|orbit| members.row(orbit).iter().map(|&m| grid_owner(m)).collect_vec())
            .collect_vec();
        let mut recv_counts = vec![0; n_procs];
        sources.iter().for_each(|&p| recv_counts[p] += 1);
        let recv_index = (0..sources.len())
            .sorted_by_key(|&slot| sources[slot])
            .collect_vec();
        let mut orbit_index = vec![0; recv_index.len()];
        recv_index
            .iter()
            .enumerate()
            .for_each(|(position, &slot)| orbit_index[slot] = position);

        let gather = DirectionalPlan {
            send: ExchangePlan::from_counts(send_counts),
            recv: ExchangePlan::from_counts(recv_counts),
        };
        let scatter = gather.transpose();
        log::debug!(
            "Worker {rank}: gather sends {} and receives {} element(s) for {} local orbit(s).",
            gather.send.total(),
            gather.recv.total(),
            local_orbits.len()
        );
        Ok(Self {
            rank,
            shape: *grid.shape(),
            n_orbits: orbits.n_orbits(),
            n_sym,
            plan: plan.clone(),
            gather,
            scatter,
            grid_index,
            recv_index,
            orbit_index,
        })
    }

    /// Checks that every worker of `comm` derived a compatible schedule.
    ///
    /// Every worker contributes a fingerprint of its grid, decomposition and distribution, then
    /// its gather counts. Every check is made on gathered data, so every worker reaches the same
    /// verdict and no worker is left waiting in a later collective.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if the workers disagree on the worker count, the grid,
    /// the decomposition or the grid division, or if the counts one worker sends differ from the
    /// counts its peers expect.
    pub fn verify<C: Communicator>(&self, comm: &C) -> Result<(), anyhow::Error> {
        let n_procs = comm.n_procs();
        let fingerprint = self.fingerprint();
        let width = fingerprint.len();
        let fingerprints = comm.all_gather_variable(&fingerprint, &vec![width; n_procs])?;
        for (p, theirs) in fingerprints.chunks(width).enumerate() {
            ensure!(
                theirs[0] == n_procs && theirs[1] == p,
                ConfigurationError(format!(
                    "worker {p} of a team of {n_procs} was configured as worker {} of {}",
                    theirs[1], theirs[0]
                ))
            );
        }
        for (p, theirs) in fingerprints.chunks(width).enumerate() {
            ensure!(
                theirs[2..7] == fingerprint[2..7],
                ConfigurationError(format!(
                    "worker {p} decomposed grid {:?} into {} orbit(s) of {} operation(s), \
                    worker {} decomposed grid {:?} into {} orbit(s) of {} operation(s)",
                    &theirs[2..5],
                    theirs[5],
                    theirs[6],
                    self.rank,
                    self.shape,
                    self.n_orbits,
                    self.n_sym
                ))
            );
            let range = self.plan.grid_division().range(p);
            ensure!(
                theirs[7..9] == [range.start, range.end],
                ConfigurationError(format!(
                    "worker {p} stores planes {}..{} of the folded axis but {}..{} were expected",
                    theirs[7], theirs[8], range.start, range.end
                ))
            );
        }

        let counts = self
            .gather
            .send
            .counts()
            .iter()
            .chain(self.gather.recv.counts().iter())
            .copied()
            .collect_vec();
        let all_counts = comm.all_gather_variable(&counts, &vec![2 * n_procs; n_procs])?;
        let rows = all_counts.chunks(2 * n_procs).collect_vec();
        for (p, q) in (0..n_procs).cartesian_product(0..n_procs) {
            let sent = rows[p][q];
            let expected = rows[q][n_procs + p];
            ensure!(
                sent == expected,
                ConfigurationError(format!(
                    "worker {p} sends {sent} element(s) to worker {q}, which expects {expected}"
                ))
            );
        }
        log::debug!("Worker {}: exchange schedule verified.", self.rank);
        Ok(())
    }

    fn fingerprint(&self) -> Vec<usize> {
        let bounds = self.plan.grid_division().range(self.rank);
        vec![
            self.plan.n_procs(),
            self.rank,
            self.shape[0],
            self.shape[1],
            self.shape[2],
            self.n_orbits,
            self.n_sym,
            bounds.start,
            bounds.end,
        ]
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn plan(&self) -> &DistributionPlan {
        &self.plan
    }

    /// The division of orbits over workers.
    pub fn orbit_division(&self) -> &TaskDivision {
        self.plan.orbit_division()
    }

    pub fn gather(&self) -> &DirectionalPlan {
        &self.gather
    }

    pub fn scatter(&self) -> &DirectionalPlan {
        &self.scatter
    }

    pub fn grid_index(&self) -> &[usize] {
        &self.grid_index
    }

    pub fn recv_index(&self) -> &[usize] {
        &self.recv_index
    }

    pub fn orbit_index(&self) -> &[usize] {
        &self.orbit_index
    }

    /// The number of orbit-member slots owned by this worker.
    pub fn n_slots(&self) -> usize {
        self.recv_index.len()
    }
}

impl fmt::Display for CommunicationSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_heading(f, &format!("Exchange schedule of worker {}", self.rank))?;
        let mut rows = self
            .gather
            .send
            .counts()
            .iter()
            .zip(self.gather.recv.counts().iter())
            .enumerate()
            .map(|(p, (sent, received))| {
                vec![p.to_string(), sent.to_string(), received.to_string()]
            })
            .collect_vec();
        rows.push(vec![
            "Total".to_string(),
            self.gather.send.total().to_string(),
            self.gather.recv.total().to_string(),
        ]);
        write_table(f, &["Peer", "Sends", "Receives"], &rows)
    }
}
