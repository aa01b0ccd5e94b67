//! Collective communication between the workers sharing a distributed grid.
//!
//! Only two collectives are needed: an all-gather and an all-to-all, both with variable
//! per-worker counts. Both are blocking and must be entered by every worker of the team in the
//! same order.

use anyhow::{self, ensure};

use crate::errors::ConfigurationError;

mod serial;
mod thread;

pub use serial::SerialCommunicator;
pub use thread::ThreadCommunicator;


/// A trait for element types that can be exchanged between workers.
pub trait CommData: Clone + Default + Send + 'static {}

// Blanket implementation
impl<T> CommData for T where T: Clone + Default + Send + 'static {}

/// A trait for communicators over a fixed team of workers.
pub trait Communicator {
    /// The rank of this worker within the team.
    fn rank(&self) -> usize;

    /// The number of workers in the team.
    fn n_procs(&self) -> usize;

    /// Gathers variable-length contributions from every worker onto every worker.
    ///
    /// # Arguments
    ///
    /// * `local` - The contribution of this worker.
    /// * `counts` - The length of the contribution of every worker, in rank order.
    ///
    /// # Returns
    ///
    /// The contributions of all workers concatenated in rank order.
    fn all_gather_variable<T: CommData>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, anyhow::Error>;

    /// Exchanges variable-length segments between every pair of workers.
    ///
    /// Segment `q` of `send` (`send_offsets[q]..send_offsets[q] + send_counts[q]`) is delivered
    /// to worker `q`, and the segment received from worker `p` is placed at `recv_offsets[p]` in
    /// a buffer of `recv_counts.iter().sum()` elements.
    fn all_to_all_variable<T: CommData>(
        &self,
        send: &[T],
        send_counts: &[usize],
        send_offsets: &[usize],
        recv_counts: &[usize],
        recv_offsets: &[usize],
    ) -> Result<Vec<T>, anyhow::Error>;
}

/// Checks that a set of per-worker counts and offsets describes segments lying within a buffer
/// of `len` elements.
pub(crate) fn check_segments(
    counts: &[usize],
    offsets: &[usize],
    n_procs: usize,
    len: usize,
) -> Result<(), anyhow::Error> {
    ensure!(
        counts.len() == n_procs && offsets.len() == n_procs,
        ConfigurationError(format!(
            "expected {n_procs} count(s) and offset(s), got {} and {}",
            counts.len(),
            offsets.len()
        ))
    );
    if let Some(p) = (0..n_procs).find(|&p| offsets[p] + counts[p] > len) {
        return Err(ConfigurationError(format!(
            "segment {p} ({}..{}) overruns a buffer of {len} element(s)",
            offsets[p],
            offsets[p] + counts[p]
        ))
        .into());
    }
    Ok(())
}
