//! An in-process communicator for a team of threads.

use std::any::Any;

use anyhow::{self, ensure, format_err};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log;

use crate::comm::{check_segments, CommData, Communicator};
use crate::errors::ConfigurationError;

/// A message between two workers. `None` tells the receiver that the sender's arguments failed
/// validation.
type Envelope = Option<Box<dyn Any + Send>>;

/// The contribution of one worker to an all-gather, with the counts it was called with.
struct Contribution<T> {
    data: Vec<T>,
    counts: Vec<usize>,
}

/// A communicator connecting `n_procs` threads of the same process.
///
/// Every ordered pair of workers is joined by an unbounded channel. In each collective, every
/// worker posts exactly one envelope to every worker (itself included) and then takes exactly one
/// envelope from every worker in rank order. Channels are first-in first-out, so consecutive
/// collectives never mix. A worker whose arguments are invalid posts empty envelopes, so that the
/// failure is reported on every worker instead of leaving the others waiting.
pub struct ThreadCommunicator {
    rank: usize,
    n_procs: usize,

    /// The sending ends towards every worker, in rank order.
    outboxes: Vec<Sender<Envelope>>,

    /// The receiving ends from every worker, in rank order.
    inboxes: Vec<Receiver<Envelope>>,
}

impl std::fmt::Debug for ThreadCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadCommunicator")
            .field("rank", &self.rank)
            .field("n_procs", &self.n_procs)
            .finish()
    }
}

impl ThreadCommunicator {
    /// Creates the communicators of a team of `n_procs` workers, in rank order.
    ///
    /// # Errors
    ///
    /// Errors with a [`ConfigurationError`] if `n_procs` is zero.
    pub fn team(n_procs: usize) -> Result<Vec<Self>, anyhow::Error> {
        ensure!(
            n_procs > 0,
            ConfigurationError("a team needs at least one worker".to_string())
        );
        let mut outboxes = (0..n_procs)
            .map(|_| Vec::with_capacity(n_procs))
            .collect::<Vec<_>>();
        let mut inboxes = (0..n_procs)
            .map(|_| Vec::with_capacity(n_procs))
            .collect::<Vec<_>>();
        for source in 0..n_procs {
            for target in 0..n_procs {
                let (sender, receiver) = unbounded();
                outboxes[source].push(sender);
                inboxes[target].push(receiver);
            }
        }
        log::debug!("Created an in-process team of {n_procs} worker(s).");
        Ok(outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| Self {
                rank,
                n_procs,
                outboxes,
                inboxes,
            })
            .collect())
    }

    /// Runs one collective: posts `outgoing[q]` to every worker `q`, takes one message from every
    /// worker, and hands the messages in rank order to `read`.
    fn exchange<M, R, F>(
        &self,
        outgoing: Result<Vec<M>, anyhow::Error>,
        read: F,
    ) -> Result<R, anyhow::Error>
    where
        M: Send + 'static,
        F: FnOnce(Vec<M>) -> Result<R, anyhow::Error>,
    {
        let local_err = match outgoing {
            Ok(messages) => {
                for (outbox, message) in self.outboxes.iter().zip(messages) {
                    outbox.send(Some(Box::new(message))).map_err(|_| {
                        format_err!("worker {} has left the team", self.rank)
                    })?;
                }
                None
            }
            Err(err) => {
                for outbox in self.outboxes.iter() {
                    outbox
                        .send(None)
                        .map_err(|_| format_err!("worker {} has left the team", self.rank))?;
                }
                Some(err)
            }
        };

        // Every envelope is taken even after a failure, so the channels stay aligned.
        let mut received = Vec::with_capacity(self.n_procs);
        let mut missing = None;
        for (p, inbox) in self.inboxes.iter().enumerate() {
            let envelope = inbox
                .recv()
                .map_err(|_| format_err!("worker {p} has left the team"))?;
            match envelope.and_then(|message| message.downcast::<M>().ok()) {
                Some(message) => received.push(*message),
                None => {
                    missing.get_or_insert(p);
                }
            }
        }
        if let Some(err) = local_err {
            return Err(err);
        }
        if let Some(p) = missing {
            return Err(format_err!(ConfigurationError(format!(
                "worker {p} did not take part in the collective with matching data"
            ))));
        }
        read(received)
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn n_procs(&self) -> usize {
        self.n_procs
    }

    fn all_gather_variable<T: CommData>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, anyhow::Error> {
        let n_procs = self.n_procs;
        let rank = self.rank;
        let outgoing = if counts.len() == n_procs && counts[rank] == local.len() {
            Ok((0..n_procs)
                .map(|_| Contribution {
                    data: local.to_vec(),
                    counts: counts.to_vec(),
                })
                .collect())
        } else {
            Err(format_err!(ConfigurationError(format!(
                "worker {rank} contributes {} element(s) but counts are {counts:?}",
                local.len()
            ))))
        };
        self.exchange(outgoing, |contributions: Vec<Contribution<T>>| {
            let mut gathered = Vec::with_capacity(counts.iter().sum());
            for (p, contribution) in contributions.into_iter().enumerate() {
                ensure!(
                    contribution.counts == counts && contribution.data.len() == counts[p],
                    ConfigurationError(format!(
                        "worker {p} gathers counts {:?} but worker {rank} gathers {counts:?}",
                        contribution.counts
                    ))
                );
                gathered.extend(contribution.data);
            }
            Ok(gathered)
        })
    }

    fn all_to_all_variable<T: CommData>(
        &self,
        send: &[T],
        send_counts: &[usize],
        send_offsets: &[usize],
        recv_counts: &[usize],
        recv_offsets: &[usize],
    ) -> Result<Vec<T>, anyhow::Error> {
        let n_procs = self.n_procs;
        let rank = self.rank;
        let n_recv = recv_counts.iter().sum::<usize>();
        let outgoing = check_segments(send_counts, send_offsets, n_procs, send.len())
            .and_then(|_| check_segments(recv_counts, recv_offsets, n_procs, n_recv))
            .map(|_| {
                send_counts
                    .iter()
                    .zip(send_offsets.iter())
                    .map(|(&count, &offset)| send[offset..offset + count].to_vec())
                    .collect()
            });
        self.exchange(outgoing, |segments: Vec<Vec<T>>| {
            let mut recv = vec![T::default(); n_recv];
            for (p, segment) in segments.into_iter().enumerate() {
                ensure!(
                    segment.len() == recv_counts[p],
                    ConfigurationError(format!(
                        "worker {p} sends {} element(s) to worker {rank}, which expects {}",
                        segment.len(),
                        recv_counts[p]
                    ))
                );
                let start = recv_offsets[p];
                recv[start..start + segment.len()].clone_from_slice(&segment);
            }
            Ok(recv)
        })
    }
}
