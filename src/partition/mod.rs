//! 1-D partitioning of the global adjacency matrix.
//!
//! The vertex id space `[0, N)` is cut into `P` contiguous blocks of
//! `ceil(N/P)` vertices, the last block taking the remainder. Worker `r` owns
//! every edge whose destination falls in block `r` (its *column block*) and
//! splits those edges again by source block, giving the sub-blocks
//! `A[j][r]` consumed by the broadcast SpMM engine.

pub mod normalize;

use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::error::{GcnError, Result};
use crate::core::types::{Rank, Scalar, VertexId};
use crate::sparse::CooMatrix;

pub use normalize::DegreeTable;

/// One directed edge of the global adjacency matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source vertex (matrix row)
    pub src: VertexId,
    /// Destination vertex (matrix column)
    pub dst: VertexId,
    /// Edge weight, 1.0 for unweighted graphs
    pub weight: Scalar,
}

impl Edge {
    /// Unit-weight edge.
    pub fn new(src: VertexId, dst: VertexId) -> Self {
        Edge { src, dst, weight: 1.0 }
    }

    /// Edge with an explicit weight.
    pub fn weighted(src: VertexId, dst: VertexId, weight: Scalar) -> Self {
        Edge { src, dst, weight }
    }
}

/// Which endpoint decides the block an edge lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeAxis {
    /// Split by source vertex (matrix rows)
    Source,
    /// Split by destination vertex (matrix columns)
    Destination,
}

impl EdgeAxis {
    fn endpoint(self, edge: &Edge) -> VertexId {
        match self {
            EdgeAxis::Source => edge.src,
            EdgeAxis::Destination => edge.dst,
        }
    }
}

/// Contiguous split of `[0, N)` into `P` blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexPartition {
    num_vertices: usize,
    per_block: usize,
    boundaries: Vec<usize>,
}

impl VertexPartition {
    /// Split `num_vertices` vertices across `num_parts` workers.
    ///
    /// Fails when `(N, P)` cannot give every worker a non-empty block with
    /// `ceil(N/P)`-sized leading blocks.
    pub fn new(num_vertices: usize, num_parts: usize) -> Result<Self> {
        if num_parts == 0 {
            return Err(GcnError::partition("cannot partition across zero workers"));
        }
        if num_vertices == 0 {
            return Err(GcnError::partition("cannot partition an empty vertex set"));
        }

        let per_block = num_vertices.div_ceil(num_parts);
        if (num_parts - 1) * per_block >= num_vertices {
            return Err(GcnError::partition(format!(
                "{} vertices over {} workers leaves the last block empty (block size {})",
                num_vertices, num_parts, per_block
            )));
        }

        let mut boundaries: Vec<usize> = (0..num_parts).map(|i| i * per_block).collect();
        boundaries.push(num_vertices);

        Ok(VertexPartition {
            num_vertices,
            per_block,
            boundaries,
        })
    }

    /// Total vertex count `N`.
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Worker count `P`.
    pub fn num_parts(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// `ceil(N/P)`, the size of every block but the last.
    pub fn nominal_block_size(&self) -> usize {
        self.per_block
    }

    /// The `P + 1` block boundaries.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Whether `part` is the remainder block.
    pub fn is_last(&self, part: Rank) -> bool {
        part + 1 == self.num_parts()
    }

    /// First global vertex of `part`.
    pub fn block_start(&self, part: Rank) -> usize {
        self.boundaries[part]
    }

    /// Vertices owned by `part`.
    pub fn block_size(&self, part: Rank) -> usize {
        if self.is_last(part) {
            self.num_vertices - self.boundaries[part]
        } else {
            self.per_block
        }
    }

    /// Global vertex range owned by `part`.
    pub fn block_range(&self, part: Rank) -> Range<usize> {
        self.boundaries[part]..self.boundaries[part + 1]
    }

    /// Worker owning global vertex `vertex`.
    pub fn owner(&self, vertex: usize) -> Rank {
        (vertex / self.per_block).min(self.num_parts() - 1)
    }

    /// `(owner, offset within the owner's block)` for a global vertex.
    pub fn localize(&self, vertex: usize) -> (Rank, usize) {
        let owner = self.owner(vertex);
        (owner, vertex - self.boundaries[owner])
    }

    fn check_vertex(&self, vertex: VertexId) -> Result<usize> {
        let v = usize::try_from(vertex).map_err(|_| {
            GcnError::partition(format!("vertex id {} does not fit in usize", vertex))
        })?;
        if v >= self.num_vertices {
            return Err(GcnError::partition(format!(
                "vertex id {} out of range for {} vertices",
                vertex, self.num_vertices
            )));
        }
        Ok(v)
    }

    /// Bucket edges by the owner of one endpoint, keeping input order inside
    /// each bucket.
    pub fn split_edges(&self, edges: &[Edge], axis: EdgeAxis) -> Result<Vec<Vec<Edge>>> {
        let owners: Vec<Rank> = edges
            .par_iter()
            .map(|edge| self.check_vertex(axis.endpoint(edge)).map(|v| self.owner(v)))
            .collect::<Result<_>>()?;

        let mut buckets = vec![Vec::new(); self.num_parts()];
        for (edge, owner) in edges.iter().zip(owners) {
            buckets[owner].push(*edge);
        }
        Ok(buckets)
    }
}

/// Global edge list split into per-worker column blocks.
#[derive(Debug, Clone)]
pub struct GraphPartition {
    partition: VertexPartition,
    column_blocks: Vec<Vec<Edge>>,
}

impl GraphPartition {
    /// Split `edges` by destination vertex into `num_parts` column blocks.
    pub fn new(edges: &[Edge], num_vertices: usize, num_parts: usize) -> Result<Self> {
        let partition = VertexPartition::new(num_vertices, num_parts)?;
        for edge in edges {
            partition.check_vertex(edge.src)?;
        }
        let column_blocks = partition.split_edges(edges, EdgeAxis::Destination)?;

        Ok(GraphPartition {
            partition,
            column_blocks,
        })
    }

    /// The vertex split.
    pub fn partition(&self) -> &VertexPartition {
        &self.partition
    }

    /// Edges whose destination is owned by `rank`, with global ids.
    pub fn column_block(&self, rank: Rank) -> &[Edge] {
        &self.column_blocks[rank]
    }

    /// All `P` column blocks.
    pub fn column_blocks(&self) -> &[Vec<Edge>] {
        &self.column_blocks
    }

    /// Materialize the sub-blocks `A[j][rank]` for every source block `j`.
    ///
    /// Each sub-block has shape `(block_size(j), block_size(rank))` and
    /// block-local indices. When `degrees` is given, every entry is scaled by
    /// the symmetric degree normalization before the block is coalesced.
    pub fn worker_adjacency(
        &self,
        rank: Rank,
        degrees: Option<&DegreeTable>,
    ) -> Result<WorkerAdjacency> {
        let p = &self.partition;
        if rank >= p.num_parts() {
            return Err(GcnError::partition(format!(
                "rank {} outside a {}-way partition",
                rank,
                p.num_parts()
            )));
        }

        let col_offset = p.block_start(rank);
        let ncols = p.block_size(rank);
        let by_source = p.split_edges(&self.column_blocks[rank], EdgeAxis::Source)?;

        let mut blocks = Vec::with_capacity(p.num_parts());
        for (j, edges) in by_source.into_iter().enumerate() {
            let row_offset = p.block_start(j);
            let nrows = p.block_size(j);

            let mut block = CooMatrix::new(nrows, ncols);
            for edge in &edges {
                block.push(
                    edge.src as usize - row_offset,
                    edge.dst as usize - col_offset,
                    edge.weight,
                )?;
            }
            if let Some(table) = degrees {
                table.scale_block(&mut block, row_offset, col_offset)?;
            }
            block.coalesce();
            blocks.push(block);
        }

        log::debug!(
            "rank {}: {} local vertices, sub-block nnz {:?}",
            rank,
            ncols,
            blocks.iter().map(CooMatrix::nnz).collect::<Vec<_>>()
        );

        Ok(WorkerAdjacency {
            rank,
            partition: self.partition.clone(),
            blocks,
        })
    }
}

/// Partition `edges` and build the sub-blocks owned by `rank`.
///
/// Degree normalization uses out-degrees over the full edge list.
pub fn partition(
    edges: &[Edge],
    num_vertices: usize,
    num_parts: usize,
    rank: Rank,
    normalize: bool,
) -> Result<WorkerAdjacency> {
    let graph = GraphPartition::new(edges, num_vertices, num_parts)?;
    let degrees = if normalize {
        Some(DegreeTable::from_edges(edges, num_vertices)?)
    } else {
        None
    };
    graph.worker_adjacency(rank, degrees.as_ref())
}

/// The adjacency sub-blocks `A[j][rank]` owned by one worker.
#[derive(Debug, Clone)]
pub struct WorkerAdjacency {
    rank: Rank,
    partition: VertexPartition,
    blocks: Vec<CooMatrix>,
}

impl WorkerAdjacency {
    /// Owning worker.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The vertex split these blocks were cut with.
    pub fn partition(&self) -> &VertexPartition {
        &self.partition
    }

    /// Sub-block with sources in block `source_part`.
    pub fn block(&self, source_part: Rank) -> &CooMatrix {
        &self.blocks[source_part]
    }

    /// All sub-blocks in source-block order.
    pub fn blocks(&self) -> &[CooMatrix] {
        &self.blocks
    }

    /// Rows of the feature shard this worker owns.
    pub fn local_vertices(&self) -> usize {
        self.partition.block_size(self.rank)
    }

    /// Total stored entries across sub-blocks.
    pub fn nnz(&self) -> usize {
        self.blocks.iter().map(CooMatrix::nnz).sum()
    }

    /// Entries mapped back to global `(src, dst, weight)`.
    pub fn global_entries(&self) -> Vec<(VertexId, VertexId, Scalar)> {
        let col_offset = self.partition.block_start(self.rank);
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(j, block)| {
                let row_offset = self.partition.block_start(j);
                block.triplets().map(move |(r, c, v)| {
                    ((r + row_offset) as VertexId, (c + col_offset) as VertexId, v)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_with_remainder() {
        let p = VertexPartition::new(10, 3).unwrap();
        assert_eq!(p.boundaries(), &[0, 4, 8, 10]);
        assert_eq!(p.block_size(0), 4);
        assert_eq!(p.block_size(2), 2);
        assert!(p.is_last(2));
        assert_eq!(p.localize(9), (2, 1));
        assert_eq!(p.owner(4), 1);
    }

    #[test]
    fn test_invalid_partitions() {
        assert!(VertexPartition::new(5, 0).is_err());
        assert!(VertexPartition::new(0, 2).is_err());
        // ceil(5/4) = 2 leaves nothing for the fourth block
        assert!(VertexPartition::new(5, 4).is_err());
        assert!(VertexPartition::new(4, 4).is_ok());
    }

    #[test]
    fn test_out_of_range_edge_rejected() {
        let edges = vec![Edge::new(0, 1), Edge::new(1, 7)];
        assert!(GraphPartition::new(&edges, 4, 2).is_err());
        let edges = vec![Edge::new(9, 1)];
        assert!(GraphPartition::new(&edges, 4, 2).is_err());
    }

    #[test]
    fn test_sub_block_shapes_and_contents() {
        // 5 vertices over 2 workers: blocks [0,3) and [3,5)
        let edges = vec![
            Edge::new(0, 3),
            Edge::new(4, 3),
            Edge::new(1, 0),
            Edge::new(4, 4),
        ];
        let graph = GraphPartition::new(&edges, 5, 2).unwrap();
        assert_eq!(graph.column_block(0).len(), 1);
        assert_eq!(graph.column_block(1).len(), 3);

        let adj = graph.worker_adjacency(1, None).unwrap();
        assert_eq!(adj.local_vertices(), 2);
        assert_eq!(adj.block(0).shape(), (3, 2));
        assert_eq!(adj.block(1).shape(), (2, 2));
        assert_eq!(adj.block(0).to_dense()[[0, 0]], 1.0);
        assert_eq!(adj.block(1).to_dense()[[1, 0]], 1.0);
        assert_eq!(adj.block(1).to_dense()[[1, 1]], 1.0);
        assert_eq!(adj.nnz(), 3);

        let mut entries = adj.global_entries();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        assert_eq!(entries, vec![(0, 3, 1.0), (4, 3, 1.0), (4, 4, 1.0)]);
    }

    #[test]
    fn test_rank_out_of_range() {
        let graph = GraphPartition::new(&[Edge::new(0, 1)], 4, 2).unwrap();
        assert!(graph.worker_adjacency(2, None).is_err());
    }
}
