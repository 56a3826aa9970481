//! Distributed sparse-dense multiply over a 1-D partition.
//!
//! Worker `r` holds the sub-blocks `A[j][r]` for every `j` and one dense
//! shard `H[r]`. [`SpmmEngine::multiply`] computes the worker's rows of
//! `Aᵀ · H` by broadcasting every shard in ascending rank order and
//! accumulating `A[i][r]ᵀ · H[i]` as each shard arrives.
//! [`SpmmEngine::gradient_product`] computes the worker's rows of `A · G`
//! for the backward pass.

use ndarray::{s, Array2};

use crate::core::error::Result;
use crate::core::types::{Rank, ReductionStrategy, Scalar};
use crate::network::{CommunicationGroup, ReduceOp};
use crate::partition::{VertexPartition, WorkerAdjacency};
use crate::timing::{Metrics, Phase};

/// One worker's view of the distributed adjacency matrix.
#[derive(Debug, Clone)]
pub struct SpmmEngine {
    adjacency: WorkerAdjacency,
    reduction: ReductionStrategy,
}

impl SpmmEngine {
    pub fn new(adjacency: WorkerAdjacency, reduction: ReductionStrategy) -> Self {
        SpmmEngine {
            adjacency,
            reduction,
        }
    }

    pub fn rank(&self) -> Rank {
        self.adjacency.rank()
    }

    pub fn partition(&self) -> &VertexPartition {
        self.adjacency.partition()
    }

    pub fn adjacency(&self) -> &WorkerAdjacency {
        &self.adjacency
    }

    pub fn reduction(&self) -> ReductionStrategy {
        self.reduction
    }

    /// Rows owned by this worker.
    pub fn local_rows(&self) -> usize {
        self.adjacency.local_vertices()
    }

    /// This worker's rows of `Aᵀ · H`.
    ///
    /// `shard` is this worker's `H[r]`; it is broadcast in place and comes
    /// back unchanged. Every rank must call this with shards of the same
    /// width.
    pub fn multiply<G>(&self, group: &G, metrics: &mut Metrics, shard: &mut Array2<Scalar>) -> Result<Array2<Scalar>>
    where
        G: CommunicationGroup + ?Sized,
    {
        let rank = self.rank();
        let partition = self.partition();
        crate::ensure_shape!(
            "feature shard",
            (partition.block_size(rank), shard.ncols()),
            shard.dim()
        );

        let width = shard.ncols();
        let mut z = Array2::<Scalar>::zeros((partition.block_size(rank), width));

        for i in 0..partition.num_parts() {
            let mut incoming = None;
            let buf: &mut Array2<Scalar> = if i == rank {
                &mut *shard
            } else {
                incoming.insert(Array2::zeros((partition.block_size(i), width)))
            };

            metrics.timed(group, Phase::Broadcast, || group.broadcast(buf, i))?;

            let block = self.adjacency.block(i);
            metrics.timed(group, Phase::SparseCompute, || {
                block.spmm_t_acc(buf.view(), z.view_mut())
            })?;
        }

        Ok(z)
    }

    /// This worker's rows of `A · G`, where `grad` is this worker's `G[r]`.
    ///
    /// The local partial product covers every row of `A` but only the
    /// columns owned here, so the partials are summed across the group:
    /// either an all-reduce of the whole matrix followed by slicing, or a
    /// reduce-scatter. Both give bit-identical rows.
    pub fn gradient_product<G>(&self, group: &G, metrics: &mut Metrics, grad: &Array2<Scalar>) -> Result<Array2<Scalar>>
    where
        G: CommunicationGroup + ?Sized,
    {
        let rank = self.rank();
        let partition = self.partition();
        crate::ensure_shape!(
            "gradient shard",
            (partition.block_size(rank), grad.ncols()),
            grad.dim()
        );

        let mut partial = Array2::<Scalar>::zeros((partition.num_vertices(), grad.ncols()));
        metrics.timed(group, Phase::SparseCompute, || {
            for (j, block) in self.adjacency.blocks().iter().enumerate() {
                let rows = partition.block_range(j);
                block.spmm_acc(grad.view(), partial.slice_mut(s![rows, ..]))?;
            }
            Ok(())
        })?;

        match self.reduction {
            ReductionStrategy::AllReduce => {
                metrics.timed(group, Phase::ReduceEquation1, || {
                    group.all_reduce(&mut partial, ReduceOp::Sum)
                })?;
                Ok(partial.slice(s![partition.block_range(rank), ..]).to_owned())
            }
            ReductionStrategy::ReduceScatter => metrics.timed(group, Phase::ReduceEquation1, || {
                group.reduce_scatter(&partial, partition.boundaries())
            }),
        }
    }
}
