//! Per-worker timing harness.
//!
//! A [`Metrics`] value is owned by one worker for one training run and
//! passed by `&mut` into every engine and layer call. When timing is enabled
//! each measured region is bracketed by group barriers, so the recorded time
//! is that of the slowest participant rather than local wall-clock skew.
//! When disabled, no barriers are issued and nothing is recorded.

use std::fmt;
use std::time::{Duration, Instant};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{Rank, Scalar};
use crate::network::{CommunicationGroup, ReduceOp};

/// Category a timed region is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Local sparse kernels
    SparseCompute,
    /// Local dense matrix products
    DenseCompute,
    /// Shard broadcasts of the SpMM engine
    Broadcast,
    /// Reduction of the `A · G` partial products
    ReduceEquation1,
    /// Reduction of the weight gradient
    ReduceEquation2,
}

impl Phase {
    /// Whether time in this phase counts as communication.
    pub fn is_communication(self) -> bool {
        matches!(
            self,
            Phase::Broadcast | Phase::ReduceEquation1 | Phase::ReduceEquation2
        )
    }
}

/// Accumulated seconds per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// Wall time of the whole run
    pub total: f64,
    /// Sparse plus dense compute
    pub compute: f64,
    /// Broadcast plus both reductions
    pub communication: f64,
    pub sparse_compute: f64,
    pub dense_compute: f64,
    pub broadcast: f64,
    pub reduce_equation1: f64,
    pub reduce_equation2: f64,
}

impl TimingSummary {
    const FIELDS: usize = 8;

    fn to_row(self) -> Array2<Scalar> {
        let values = [
            self.total,
            self.compute,
            self.communication,
            self.sparse_compute,
            self.dense_compute,
            self.broadcast,
            self.reduce_equation1,
            self.reduce_equation2,
        ];
        Array2::from_shape_fn((1, Self::FIELDS), |(_, k)| values[k] as Scalar)
    }

    fn from_row(row: &Array2<Scalar>) -> Self {
        let at = |k: usize| f64::from(row[[0, k]]);
        TimingSummary {
            total: at(0),
            compute: at(1),
            communication: at(2),
            sparse_compute: at(3),
            dense_compute: at(4),
            broadcast: at(5),
            reduce_equation1: at(6),
            reduce_equation2: at(7),
        }
    }

    /// The per-rank report lines printed at the end of a run.
    pub fn report_lines(&self, rank: Rank) -> Vec<String> {
        vec![
            format!("rank: {} Time: {}", rank, self.total),
            format!("rank: {} comm_time: {}", rank, self.communication),
            format!("rank: {} comp_time: {}", rank, self.compute),
            format!("rank: {} scomp_time: {}", rank, self.sparse_compute),
            format!("rank: {} dcomp_time: {}", rank, self.dense_compute),
            format!("rank: {} bcast_comm_time: {}", rank, self.broadcast),
            format!("rank: {} op1_comm_time: {}", rank, self.reduce_equation1),
            format!("rank: {} op2_comm_time: {}", rank, self.reduce_equation2),
        ]
    }
}

impl fmt::Display for TimingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total {:.4}s, compute {:.4}s (sparse {:.4}s, dense {:.4}s), \
             communication {:.4}s (broadcast {:.4}s, eq1 {:.4}s, eq2 {:.4}s)",
            self.total,
            self.compute,
            self.sparse_compute,
            self.dense_compute,
            self.communication,
            self.broadcast,
            self.reduce_equation1,
            self.reduce_equation2
        )
    }
}

/// Timing accumulators for one worker and one run.
#[derive(Debug, Clone)]
pub struct Metrics {
    rank: Rank,
    enabled: bool,
    summary: TimingSummary,
    run_start: Option<Instant>,
}

impl Metrics {
    pub fn new(rank: Rank, enabled: bool) -> Self {
        Metrics {
            rank,
            enabled,
            summary: TimingSummary::default(),
            run_start: None,
        }
    }

    /// Metrics that never synchronize or record.
    pub fn disabled(rank: Rank) -> Self {
        Metrics::new(rank, false)
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn summary(&self) -> &TimingSummary {
        &self.summary
    }

    /// Zero the accumulators and start the run clock after a barrier.
    pub fn start_run<G: CommunicationGroup + ?Sized>(&mut self, group: &G) -> Result<()> {
        self.summary = TimingSummary::default();
        if self.enabled {
            group.barrier()?;
            self.run_start = Some(Instant::now());
        }
        Ok(())
    }

    /// Stop the run clock after a barrier.
    pub fn finish_run<G: CommunicationGroup + ?Sized>(&mut self, group: &G) -> Result<()> {
        if let Some(start) = self.run_start.take() {
            group.barrier()?;
            self.summary.total += start.elapsed().as_secs_f64();
        }
        Ok(())
    }

    /// Run `op` and charge its duration to `phase`.
    ///
    /// With timing enabled every rank must reach this call, because the
    /// region is fenced by two barriers.
    pub fn timed<G, T, F>(&mut self, group: &G, phase: Phase, op: F) -> Result<T>
    where
        G: CommunicationGroup + ?Sized,
        F: FnOnce() -> Result<T>,
    {
        if !self.enabled {
            return op();
        }
        group.barrier()?;
        let start = Instant::now();
        let out = op()?;
        group.barrier()?;
        self.record(phase, start.elapsed());
        Ok(out)
    }

    /// Add `elapsed` to `phase` and its compute/communication rollup.
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let s = &mut self.summary;
        match phase {
            Phase::SparseCompute => s.sparse_compute += secs,
            Phase::DenseCompute => s.dense_compute += secs,
            Phase::Broadcast => s.broadcast += secs,
            Phase::ReduceEquation1 => s.reduce_equation1 += secs,
            Phase::ReduceEquation2 => s.reduce_equation2 += secs,
        }
        if phase.is_communication() {
            s.communication += secs;
        } else {
            s.compute += secs;
        }
    }

    /// Element-wise maximum of every rank's summary, replicated to all ranks.
    ///
    /// The values travel through the group as `Scalar` (f32), so each field
    /// carries about seven significant digits. The local [`Metrics::summary`]
    /// keeps full f64 precision.
    pub fn cluster_summary<G: CommunicationGroup + ?Sized>(&self, group: &G) -> Result<TimingSummary> {
        let mut row = self.summary.to_row();
        group.all_reduce(&mut row, ReduceOp::Max)?;
        Ok(TimingSummary::from_row(&row))
    }
}
