//! Core data types shared by every distgcn component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker identifier in `[0, world_size)`.
pub type Rank = usize;

/// Global vertex identifier as supplied by the dataset collaborator.
pub type VertexId = u64;

/// Element type of every dense and sparse matrix in the engine.
pub type Scalar = f32;

/// Class label type.
pub type ClassLabel = i64;

/// Optimizer used as the gradient-descent collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam with PyTorch-style defaults
    Adam,
    /// Plain stochastic gradient descent
    Sgd,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::Sgd => write!(f, "sgd"),
        }
    }
}

/// How the `A · G` partial products of the first backward equation are
/// combined across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionStrategy {
    /// Reduce the full `N x F` product everywhere, then keep the owned rows
    AllReduce,
    /// Each worker only receives the reduced rows it owns
    ReduceScatter,
}

impl Default for ReductionStrategy {
    fn default() -> Self {
        ReductionStrategy::AllReduce
    }
}

impl fmt::Display for ReductionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionStrategy::AllReduce => write!(f, "all_reduce"),
            ReductionStrategy::ReduceScatter => write!(f, "reduce_scatter"),
        }
    }
}

/// Backend carrying collective traffic between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// All workers are threads of this process
    Local,
    /// This process is one rank of a TCP full mesh
    Tcp,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Local
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Local => write!(f, "local"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}
