//! In-process transport: one thread per worker, one channel per ordered pair.

use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use ndarray::{Array2, ArrayView2};

use crate::core::error::{GcnError, Result};
use crate::core::types::{Rank, Scalar};
use crate::network::CommunicationGroup;

/// One worker's endpoint of an in-process group.
///
/// Dropping an endpoint disconnects it, so a peer blocked on it gets a
/// communication error instead of waiting forever.
#[derive(Debug)]
pub struct LocalGroup {
    rank: Rank,
    size: usize,
    senders: Vec<Option<Sender<Array2<Scalar>>>>,
    receivers: Vec<Option<Receiver<Array2<Scalar>>>>,
}

impl LocalGroup {
    /// Create the endpoints of a `size`-worker group, indexed by rank.
    pub fn create(size: usize) -> Result<Vec<LocalGroup>> {
        if size == 0 {
            return Err(GcnError::invalid_parameter(
                "world_size",
                "0",
                "a group needs at least one worker",
            ));
        }

        let mut senders: Vec<Vec<Option<Sender<Array2<Scalar>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Array2<Scalar>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dst in (0..size).filter(|&dst| dst != src) {
                let (tx, rx) = unbounded();
                senders[src][dst] = Some(tx);
                receivers[dst][src] = Some(rx);
            }
        }

        Ok(senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| LocalGroup {
                rank,
                size,
                senders,
                receivers,
            })
            .collect())
    }

    /// Run `worker` on `size` threads, each with its own endpoint, and
    /// collect the per-rank results in rank order.
    ///
    /// If any worker fails the whole run fails. A worker's own error is
    /// preferred over the disconnect errors it causes in its peers.
    pub fn run<T, F>(size: usize, worker: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&LocalGroup) -> Result<T> + Sync,
    {
        let endpoints = LocalGroup::create(size)?;
        let worker = &worker;

        let outcomes: Vec<Result<T>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for endpoint in endpoints {
                let spawned = thread::Builder::new()
                    .name(format!("gcn-worker-{}", endpoint.rank))
                    .spawn_scoped(scope, move || {
                        let outcome = worker(&endpoint);
                        if let Err(e) = &outcome {
                            log::debug!("rank {} finished with error: {}", endpoint.rank, e);
                        }
                        outcome
                    });
                handles.push(spawned);
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, spawned)| match spawned {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(GcnError::internal(format!("worker {} panicked", rank)))
                    }),
                    Err(e) => Err(GcnError::from(e)),
                })
                .collect()
        });

        let mut values = Vec::with_capacity(size);
        let mut first_error: Option<GcnError> = None;
        for outcome in outcomes {
            match outcome {
                Ok(value) => values.push(value),
                Err(e) => {
                    let replace = match &first_error {
                        None => true,
                        Some(GcnError::Communication { .. }) => {
                            !matches!(e, GcnError::Communication { .. })
                        }
                        Some(_) => false,
                    };
                    if replace {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }

    fn link<'a, L>(&self, links: &'a [Option<L>], peer: Rank) -> Result<&'a L> {
        self.check_peer(peer)?;
        links[peer].as_ref().ok_or_else(|| {
            GcnError::communication(self.rank, format!("no channel between rank {} and itself", peer))
        })
    }
}

impl CommunicationGroup for LocalGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, tensor: ArrayView2<'_, Scalar>, dst: Rank) -> Result<()> {
        self.link(&self.senders, dst)?
            .send(tensor.to_owned())
            .map_err(|_| GcnError::communication(self.rank, format!("rank {} disconnected", dst)))
    }

    fn recv(&self, src: Rank) -> Result<Array2<Scalar>> {
        self.link(&self.receivers, src)?
            .recv()
            .map_err(|_| GcnError::communication(self.rank, format!("rank {} disconnected", src)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_point_to_point_is_ordered() {
        let received = LocalGroup::run(2, |group| {
            if group.rank() == 0 {
                group.send(array![[1.0]].view(), 1)?;
                group.send(array![[2.0, 3.0]].view(), 1)?;
                Ok(Vec::new())
            } else {
                Ok(vec![group.recv(0)?, group.recv(0)?])
            }
        })
        .unwrap();

        assert_eq!(received[1], vec![array![[1.0]], array![[2.0, 3.0]]]);
    }

    #[test]
    fn test_failed_worker_does_not_hang_peers() {
        let err = LocalGroup::run(3, |group| {
            if group.rank() == 2 {
                return Err(GcnError::dataset("rank 2 could not load its shard"));
            }
            group.barrier()
        })
        .unwrap_err();

        assert_eq!(err.category(), "dataset");
    }

    #[test]
    fn test_self_send_is_rejected() {
        let groups = LocalGroup::create(2).unwrap();
        assert!(groups[0].send(array![[1.0]].view(), 0).is_err());
        assert!(groups[0].recv(7).is_err());
        assert!(LocalGroup::create(0).is_err());
    }
}
