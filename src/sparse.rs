//! Coordinate-form sparse matrices and the local SpMM kernels.
//!
//! A [`CooMatrix`] stores one adjacency sub-block with block-local indices.
//! It is built once by the partitioner, optionally rescaled by degree
//! normalization, then [`coalesce`](CooMatrix::coalesce)d and treated as
//! read-only for the rest of the run.

use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::core::error::{GcnError, Result};
use crate::core::types::Scalar;

/// Sparse matrix in coordinate (triplet) form.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<Scalar>,
}

impl CooMatrix {
    /// Empty matrix of the given shape.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        CooMatrix {
            nrows,
            ncols,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from parallel index/value vectors, checking bounds.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<Scalar>,
    ) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(GcnError::shape_mismatch(
                "coo triplets",
                format!("{} indices and values", rows.len()),
                format!("{} cols, {} values", cols.len(), values.len()),
            ));
        }
        if let Some(&r) = rows.iter().find(|&&r| r >= nrows) {
            return Err(GcnError::shape_mismatch(
                "coo row index",
                format!("< {}", nrows),
                r.to_string(),
            ));
        }
        if let Some(&c) = cols.iter().find(|&&c| c >= ncols) {
            return Err(GcnError::shape_mismatch(
                "coo column index",
                format!("< {}", ncols),
                c.to_string(),
            ));
        }

        Ok(CooMatrix {
            nrows,
            ncols,
            rows,
            cols,
            values,
        })
    }

    /// Append one entry.
    pub fn push(&mut self, row: usize, col: usize, value: Scalar) -> Result<()> {
        if row >= self.nrows || col >= self.ncols {
            return Err(GcnError::shape_mismatch(
                "coo entry",
                format!("< ({}, {})", self.nrows, self.ncols),
                format!("({}, {})", row, col),
            ));
        }
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
        Ok(())
    }

    /// `(nrows, ncols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row indices of stored entries.
    pub fn row_indices(&self) -> &[usize] {
        &self.rows
    }

    /// Column indices of stored entries.
    pub fn col_indices(&self) -> &[usize] {
        &self.cols
    }

    /// Stored values.
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Mutable stored values; indices stay fixed.
    pub fn values_mut(&mut self) -> &mut [Scalar] {
        &mut self.values
    }

    /// Iterate `(row, col, value)` in storage order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, Scalar)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.values.iter())
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Sort entries column-major (destination first, then source) and sum
    /// duplicate coordinates.
    pub fn coalesce(&mut self) {
        let mut order: Vec<usize> = (0..self.nnz()).collect();
        order.sort_by_key(|&k| (self.cols[k], self.rows[k]));

        let mut rows = Vec::with_capacity(order.len());
        let mut cols = Vec::with_capacity(order.len());
        let mut values: Vec<Scalar> = Vec::with_capacity(order.len());
        for k in order {
            let (r, c, v) = (self.rows[k], self.cols[k], self.values[k]);
            match (rows.last(), cols.last()) {
                (Some(&lr), Some(&lc)) if lr == r && lc == c => {
                    if let Some(last) = values.last_mut() {
                        *last += v;
                    }
                }
                _ => {
                    rows.push(r);
                    cols.push(c);
                    values.push(v);
                }
            }
        }

        self.rows = rows;
        self.cols = cols;
        self.values = values;
    }

    /// Transposed copy.
    pub fn transpose(&self) -> CooMatrix {
        CooMatrix {
            nrows: self.ncols,
            ncols: self.nrows,
            rows: self.cols.clone(),
            cols: self.rows.clone(),
            values: self.values.clone(),
        }
    }

    /// `out += self · rhs`
    pub fn spmm_acc(&self, rhs: ArrayView2<'_, Scalar>, mut out: ArrayViewMut2<'_, Scalar>) -> Result<()> {
        self.check_operands("spmm", self.ncols, self.nrows, &rhs, &out)?;
        for (r, c, v) in self.triplets() {
            out.row_mut(r).scaled_add(v, &rhs.row(c));
        }
        Ok(())
    }

    /// `out += selfᵀ · rhs`, without materializing the transpose.
    pub fn spmm_t_acc(&self, rhs: ArrayView2<'_, Scalar>, mut out: ArrayViewMut2<'_, Scalar>) -> Result<()> {
        self.check_operands("transposed spmm", self.nrows, self.ncols, &rhs, &out)?;
        for (r, c, v) in self.triplets() {
            out.row_mut(c).scaled_add(v, &rhs.row(r));
        }
        Ok(())
    }

    /// Dense copy, mainly for tests and small reference checks.
    pub fn to_dense(&self) -> Array2<Scalar> {
        let mut dense = Array2::zeros((self.nrows, self.ncols));
        for (r, c, v) in self.triplets() {
            dense[[r, c]] += v;
        }
        dense
    }

    fn check_operands(
        &self,
        context: &str,
        inner: usize,
        outer: usize,
        rhs: &ArrayView2<'_, Scalar>,
        out: &ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        if rhs.nrows() != inner {
            return Err(GcnError::shape_mismatch(
                format!("{} rhs rows", context),
                inner.to_string(),
                rhs.nrows().to_string(),
            ));
        }
        if out.dim() != (outer, rhs.ncols()) {
            return Err(GcnError::shape_mismatch(
                format!("{} output", context),
                format!("{:?}", (outer, rhs.ncols())),
                format!("{:?}", out.dim()),
            ));
        }
        Ok(())
    }
}
