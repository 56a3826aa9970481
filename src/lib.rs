//! # distgcn
//!
//! Distributed training of a two-layer graph convolutional network over a
//! 1-D partitioned adjacency matrix.
//!
//! Vertices are split into `P` contiguous blocks, one per worker. Worker `r`
//! keeps the adjacency entries whose destination it owns, cut into `P`
//! sub-blocks by source, plus its rows of the feature matrix. The forward
//! product `Aᵀ·H` is computed by broadcasting each worker's rows in rank order
//! and accumulating against the matching sub-block; the backward pass reuses
//! the same sub-blocks and finishes each gradient with one reduction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use distgcn::{dataset, run_worker, ConfigBuilder, LocalGroup};
//!
//! # fn main() -> distgcn::Result<()> {
//! distgcn::init_logging();
//!
//! let config = ConfigBuilder::new()
//!     .world_size(2)
//!     .epochs(10)
//!     .graph_name("cycle")
//!     .enable_timing(true)
//!     .hidden_layer_width(16)
//!     .build()?;
//! let data = dataset::load("cycle", &config.dataset, config.seed)?;
//!
//! let reports = LocalGroup::run(config.world_size, |group| run_worker(group, &data, &config))?;
//! println!("rank 0 output: {:?}", reports[0].output.dim());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: error type, shared aliases and constants
//! - [`config`]: run options, file/environment loading and validation
//! - [`dataset`]: graphs, features, labels and masks
//! - [`sparse`]: coordinate-form sub-blocks and local SpMM kernels
//! - [`partition`]: 1-D partitioning and degree normalization
//! - [`network`]: the [`CommunicationGroup`] seam and its in-process and TCP backends
//! - [`timing`]: barrier-fenced phase timings
//! - [`spmm`]: the broadcast SpMM engine
//! - [`activation`], [`layer`]: the graph-convolution layer and its backward pass
//! - [`optimizer`]: Adam and SGD
//! - [`train`]: the per-worker training loop

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    non_snake_case,
    non_upper_case_globals
)]

pub mod core;

pub mod config;

pub mod dataset;

pub mod sparse;

pub mod partition;

pub mod network;

pub mod timing;

pub mod spmm;

pub mod activation;

pub mod layer;

pub mod optimizer;

pub mod train;

pub use crate::core::{
    error::{GcnError, Result},
    types::*,
};

pub use activation::Activation;
pub use config::{Config, ConfigBuilder, DatasetConfig, TransportConfig};
pub use dataset::{GraphData, GraphShard};
pub use layer::{GcnLayer, LayerContext, LayerGradients};
pub use network::{CommunicationGroup, LocalGroup, ReduceOp, TcpGroup};
pub use optimizer::{create_optimizer, Adam, Optimizer, Sgd};
pub use partition::{partition, DegreeTable, Edge, GraphPartition, VertexPartition, WorkerAdjacency};
pub use sparse::CooMatrix;
pub use spmm::SpmmEngine;
pub use timing::{Metrics, Phase, TimingSummary};
pub use train::{run_worker, TrainingReport, Trainer};

/// Install the `env_logger` backend, defaulting to `RUST_LOG=info`.
///
/// Safe to call repeatedly.
pub fn init_logging() {
    crate::core::initialize_logging()
}
