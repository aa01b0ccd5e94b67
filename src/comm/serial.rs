//! The trivial communicator of a team with one worker.

use anyhow::{self, ensure};

use crate::comm::{check_segments, CommData, Communicator};
use crate::errors::ConfigurationError;

/// A communicator for a single worker. Every collective is a local copy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn n_procs(&self) -> usize {
        1
    }

    fn all_gather_variable<T: CommData>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, anyhow::Error> {
        ensure!(
            counts == [local.len()],
            ConfigurationError(format!(
                "a single worker contributing {} element(s) cannot gather counts {counts:?}",
                local.len()
            ))
        );
        Ok(local.to_vec())
    }

    fn all_to_all_variable<T: CommData>(
        &self,
        send: &[T],
        send_counts: &[usize],
        send_offsets: &[usize],
        recv_counts: &[usize],
        recv_offsets: &[usize],
    ) -> Result<Vec<T>, anyhow::Error> {
        check_segments(send_counts, send_offsets, 1, send.len())?;
        let n_recv = recv_counts.iter().sum();
        check_segments(recv_counts, recv_offsets, 1, n_recv)?;
        ensure!(
            send_counts[0] == recv_counts[0],
            ConfigurationError(format!(
                "sending {} element(s) to self but expecting {}",
                send_counts[0], recv_counts[0]
            ))
        );
        let mut recv = vec![T::default(); n_recv];
        recv[recv_offsets[0]..recv_offsets[0] + recv_counts[0]]
            .clone_from_slice(&send[send_offsets[0]..send_offsets[0] + send_counts[0]]);
        Ok(recv)
    }
}
