//! Collective communication between workers.
//!
//! [`CommunicationGroup`] is the only seam between the engine and the
//! transport. Backends supply ordered point-to-point `send`/`recv`; the
//! collectives (`broadcast`, `all_reduce`, `reduce_scatter`, `barrier`) are
//! provided on top of them with a star topology:
//!
//! - broadcast: the source sends its buffer to every peer in rank order
//! - all-reduce: rank 0 combines contributions in ascending rank order and
//!   broadcasts the result, so every replica is bit-identical
//! - reduce-scatter: one reduce per destination block, destinations in rank
//!   order, contributions combined in ascending rank order
//! - barrier: every rank checks in with rank 0, rank 0 releases them
//!
//! All calls block until the matching calls of the peers have happened.
//! Callers must issue the same collectives in the same order on every rank.

pub mod local;
pub mod tcp;

use ndarray::{s, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::core::error::{GcnError, Result};
use crate::core::types::{Rank, Scalar};

pub use local::LocalGroup;
pub use tcp::TcpGroup;

/// Rank that hosts reductions and barriers.
pub const COORDINATOR: Rank = 0;

/// Element-wise reduction applied by [`CommunicationGroup::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    /// Element-wise sum
    Sum,
    /// Element-wise maximum
    Max,
}

impl ReduceOp {
    /// Fold `part` into `acc`.
    pub fn combine(self, acc: &mut Array2<Scalar>, part: ArrayView2<'_, Scalar>) {
        match self {
            ReduceOp::Sum => Zip::from(acc).and(&part).for_each(|a, &b| *a += b),
            ReduceOp::Max => Zip::from(acc).and(&part).for_each(|a, &b| *a = a.max(b)),
        }
    }
}

fn check_dim(context: String, expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected != actual {
        return Err(GcnError::shape_mismatch(
            context,
            format!("{:?}", expected),
            format!("{:?}", actual),
        ));
    }
    Ok(())
}

/// A fixed set of workers that exchange dense `f32` matrices.
pub trait CommunicationGroup {
    /// This worker's rank.
    fn rank(&self) -> Rank;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Send `tensor` to `dst`. Messages between a pair arrive in order.
    fn send(&self, tensor: ArrayView2<'_, Scalar>, dst: Rank) -> Result<()>;

    /// Receive the next message sent by `src`.
    fn recv(&self, src: Rank) -> Result<Array2<Scalar>>;

    /// Error unless `peer` is a member of the group.
    fn check_peer(&self, peer: Rank) -> Result<()> {
        if peer >= self.size() {
            return Err(GcnError::communication(
                self.rank(),
                format!("rank {} outside a group of {}", peer, self.size()),
            ));
        }
        Ok(())
    }

    /// Receive from `src` into `buf`, which must already have the sender's shape.
    fn recv_into(&self, buf: &mut Array2<Scalar>, src: Rank) -> Result<()> {
        let incoming = self.recv(src)?;
        check_dim(format!("message from rank {}", src), buf.dim(), incoming.dim())?;
        *buf = incoming;
        Ok(())
    }

    /// Replace `buf` on every rank with the source's `buf`.
    fn broadcast(&self, buf: &mut Array2<Scalar>, src: Rank) -> Result<()> {
        self.check_peer(src)?;
        if self.rank() == src {
            for peer in (0..self.size()).filter(|&p| p != src) {
                self.send(buf.view(), peer)?;
            }
            Ok(())
        } else {
            self.recv_into(buf, src)
        }
    }

    /// Combine `buf` element-wise across the group; every rank ends with the
    /// same result.
    fn all_reduce(&self, buf: &mut Array2<Scalar>, op: ReduceOp) -> Result<()> {
        if self.size() == 1 {
            return Ok(());
        }
        if self.rank() == COORDINATOR {
            for peer in 1..self.size() {
                let part = self.recv(peer)?;
                check_dim(format!("all-reduce part from rank {}", peer), buf.dim(), part.dim())?;
                op.combine(buf, part.view());
            }
        } else {
            self.send(buf.view(), COORDINATOR)?;
        }
        self.broadcast(buf, COORDINATOR)
    }

    /// Sum `buf` across the group and return only the rows
    /// `row_boundaries[rank]..row_boundaries[rank + 1]` of the result.
    ///
    /// Bit-identical to an all-reduce followed by slicing.
    fn reduce_scatter(&self, buf: &Array2<Scalar>, row_boundaries: &[usize]) -> Result<Array2<Scalar>> {
        let size = self.size();
        if row_boundaries.len() != size + 1 || row_boundaries[size] != buf.nrows() {
            return Err(GcnError::shape_mismatch(
                "reduce-scatter boundaries",
                format!("{} boundaries ending at {}", size + 1, buf.nrows()),
                format!("{:?}", row_boundaries),
            ));
        }

        let rank = self.rank();
        let mut own = None;
        for dst in 0..size {
            let rows = s![row_boundaries[dst]..row_boundaries[dst + 1], ..];
            if dst != rank {
                self.send(buf.slice(rows), dst)?;
                continue;
            }

            let mut acc: Option<Array2<Scalar>> = None;
            for src in 0..size {
                let part = if src == rank {
                    buf.slice(rows).to_owned()
                } else {
                    self.recv(src)?
                };
                match acc.as_mut() {
                    None => acc = Some(part),
                    Some(total) => {
                        check_dim(
                            format!("reduce-scatter part from rank {}", src),
                            total.dim(),
                            part.dim(),
                        )?;
                        ReduceOp::Sum.combine(total, part.view());
                    }
                }
            }
            own = acc;
        }

        own.ok_or_else(|| GcnError::internal("reduce-scatter produced no local block"))
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()> {
        if self.size() == 1 {
            return Ok(());
        }
        let mut token = Array2::<Scalar>::zeros((0, 0));
        if self.rank() == COORDINATOR {
            for peer in 1..self.size() {
                self.recv_into(&mut token, peer)?;
            }
        } else {
            self.send(token.view(), COORDINATOR)?;
        }
        self.broadcast(&mut token, COORDINATOR)
    }
}
