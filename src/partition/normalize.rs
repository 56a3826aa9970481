//! Symmetric degree normalization of adjacency sub-blocks.
//!
//! Edge `(u, v)` is scaled by `1 / (sqrt(deg(u)) * sqrt(deg(v)))`, where
//! `deg(x)` counts edges with source `x` in the global edge list. Degrees are
//! counted once for the whole graph and shared by every sub-block.

use crate::core::error::{GcnError, Result};
use crate::core::types::Scalar;
use crate::partition::Edge;
use crate::sparse::CooMatrix;

/// Out-degree of every vertex of the global graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegreeTable {
    degrees: Vec<u64>,
}

impl DegreeTable {
    /// Count source occurrences over the full edge list.
    pub fn from_edges(edges: &[Edge], num_vertices: usize) -> Result<Self> {
        let mut degrees = vec![0u64; num_vertices];
        for edge in edges {
            let slot = usize::try_from(edge.src)
                .ok()
                .and_then(|u| degrees.get_mut(u))
                .ok_or_else(|| {
                    GcnError::partition(format!(
                        "edge source {} out of range for {} vertices",
                        edge.src, num_vertices
                    ))
                })?;
            *slot += 1;
        }
        Ok(DegreeTable { degrees })
    }

    /// Out-degree of `vertex`.
    pub fn degree(&self, vertex: usize) -> u64 {
        self.degrees[vertex]
    }

    /// Number of vertices covered.
    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    /// Whether the table covers no vertices.
    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Normalization divisor `sqrt(deg(u)) * sqrt(deg(v))`.
    ///
    /// A vertex that is never a source counts as degree one, so sink
    /// vertices keep a finite weight when self-loops were not added.
    pub fn divisor(&self, u: usize, v: usize) -> f64 {
        let du = self.degrees[u].max(1) as f64;
        let dv = self.degrees[v].max(1) as f64;
        du.sqrt() * dv.sqrt()
    }

    /// Rescale every entry of a sub-block whose rows start at global vertex
    /// `row_offset` and columns at `col_offset`.
    pub fn scale_block(
        &self,
        block: &mut CooMatrix,
        row_offset: usize,
        col_offset: usize,
    ) -> Result<()> {
        let (nrows, ncols) = block.shape();
        if row_offset + nrows > self.len() || col_offset + ncols > self.len() {
            return Err(GcnError::shape_mismatch(
                "degree normalization",
                format!("block within {} vertices", self.len()),
                format!(
                    "rows {}..{}, cols {}..{}",
                    row_offset,
                    row_offset + nrows,
                    col_offset,
                    col_offset + ncols
                ),
            ));
        }

        let coords: Vec<(usize, usize)> = block
            .row_indices()
            .iter()
            .zip(block.col_indices())
            .map(|(&r, &c)| (r + row_offset, c + col_offset))
            .collect();
        for (value, (u, v)) in block.values_mut().iter_mut().zip(coords) {
            *value /= self.divisor(u, v) as Scalar;
        }
        Ok(())
    }
}
