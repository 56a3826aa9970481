//! The two-layer training loop run by every worker.
//!
//! Each worker builds its own [`Trainer`] from the same [`GraphData`] and
//! [`Config`]. Per epoch it runs layer 1 (ReLU) and layer 2 (log-softmax),
//! takes the NLL loss over its own training rows, back-propagates through
//! both layers and hands the two weight gradients to its optimizer. The
//! weight gradients are already summed across the group by the layers, so
//! every worker applies the same update to identical replicas.
//!
//! The applied gradient is the sum of the per-worker mean losses' gradients,
//! not the gradient of one global mean. With equal blocks and every row in
//! training it is `P` times the single-worker gradient, so the learning rate
//! must be divided by `P` to reproduce a single-worker run.

use std::borrow::Cow;
use std::fmt;

use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::Config;
use crate::core::error::{GcnError, Result};
use crate::core::types::{ClassLabel, Rank, Scalar};
use crate::dataset::{add_remaining_self_loops, GraphData, GraphShard};
use crate::layer::GcnLayer;
use crate::network::CommunicationGroup;
use crate::optimizer::{create_optimizer, Optimizer};
use crate::partition;
use crate::spmm::SpmmEngine;
use crate::timing::{Metrics, TimingSummary};

/// Negative log-likelihood over the rows flagged in `mask`, and its gradient
/// w.r.t. `log_probs`.
///
/// The mean is taken over this worker's flagged rows only. Once the layers
/// sum the weight gradients across the group, the update follows the sum of
/// the per-worker means.
///
/// With no flagged rows the loss is zero and the gradient is all zeros.
pub fn nll_loss(
    log_probs: &Array2<Scalar>,
    labels: &[ClassLabel],
    mask: &[bool],
) -> Result<(Scalar, Array2<Scalar>)> {
    crate::ensure_shape!("label count", log_probs.nrows(), labels.len());
    crate::ensure_shape!("mask length", log_probs.nrows(), mask.len());

    let mut grad = Array2::<Scalar>::zeros(log_probs.dim());
    let count = mask.iter().filter(|&&m| m).count();
    if count == 0 {
        return Ok((0.0, grad));
    }

    let scale = 1.0 / count as Scalar;
    let mut total = 0.0f64;
    for (row, &label) in labels.iter().enumerate() {
        if !mask[row] {
            continue;
        }
        let class = usize::try_from(label)
            .ok()
            .filter(|&c| c < log_probs.ncols())
            .ok_or_else(|| {
                GcnError::dataset(format!(
                    "label {} outside [0, {})",
                    label,
                    log_probs.ncols()
                ))
            })?;
        total -= f64::from(log_probs[[row, class]]);
        grad[[row, class]] = -scale;
    }

    Ok(((total / count as f64) as Scalar, grad))
}

/// Uniform `[0, 1)` weights for both layers, drawn from `seed` in a fixed
/// order so every worker starts from the same replicas.
pub fn init_weights(
    seed: u64,
    num_features: usize,
    hidden: usize,
    num_classes: usize,
) -> (Array2<Scalar>, Array2<Scalar>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let w1 = Array2::from_shape_simple_fn((num_features, hidden), || rng.gen::<Scalar>());
    let w2 = Array2::from_shape_simple_fn((hidden, num_classes), || rng.gen::<Scalar>());
    (w1, w2)
}

/// Stack per-rank row shards back into one matrix.
pub fn assemble_rows(shards: &[Array2<Scalar>]) -> Result<Array2<Scalar>> {
    let views: Vec<ArrayView2<'_, Scalar>> = shards.iter().map(|s| s.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| {
        GcnError::shape_mismatch("output shards", "equal column counts", e.to_string())
    })
}

/// Result of one epoch on one worker.
#[derive(Debug, Clone)]
pub struct EpochOutcome {
    /// This worker's local loss
    pub loss: Scalar,
    /// This worker's rows of the network output
    pub output: Array2<Scalar>,
}

/// What one worker reports after training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rank: Rank,
    pub device_id: usize,
    /// Local loss per epoch
    pub losses: Vec<Scalar>,
    /// Final output rows owned by this worker
    pub output: Array2<Scalar>,
    /// Final weights of both layers
    pub weights: Vec<Array2<Scalar>>,
    /// This worker's timings
    pub timings: TimingSummary,
    /// Per-category maximum over all workers, when timing is enabled
    pub cluster_timings: Option<TimingSummary>,
}

/// One worker's training state.
pub struct Trainer<'g, G: CommunicationGroup + ?Sized> {
    group: &'g G,
    engine: SpmmEngine,
    shard: GraphShard,
    layers: [GcnLayer; 2],
    weights: Vec<Array2<Scalar>>,
    optimizer: Box<dyn Optimizer>,
    metrics: Metrics,
    device_id: usize,
}

impl<G: CommunicationGroup + ?Sized> fmt::Debug for Trainer<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("rank", &self.group.rank())
            .field("local_rows", &self.engine.local_rows())
            .field("optimizer", &self.optimizer.name())
            .field("weights", &self.weights.iter().map(|w| w.dim()).collect::<Vec<_>>())
            .finish()
    }
}

impl<'g, G: CommunicationGroup + ?Sized> Trainer<'g, G> {
    /// Partition `data` for this worker and initialise the weights.
    pub fn new(group: &'g G, data: &GraphData, config: &Config) -> Result<Self> {
        let rank = group.rank();
        let size = group.size();
        if config.world_size != size {
            return Err(GcnError::invalid_parameter(
                "world_size",
                config.world_size.to_string(),
                format!("the communication group has {} members", size),
            ));
        }

        let normalize = config.enable_degree_normalization;
        let n = data.num_vertices();
        let edges: Cow<'_, [partition::Edge]> = if normalize {
            Cow::Owned(add_remaining_self_loops(data.edges(), n))
        } else {
            Cow::Borrowed(data.edges())
        };

        let adjacency = partition::partition(&edges, n, size, rank, normalize)?;
        let shard = data.shard(adjacency.partition(), rank)?;
        log::info!(
            "rank {}: {} rows, {} local nnz, {} training rows",
            rank,
            adjacency.local_vertices(),
            adjacency.nnz(),
            shard.num_train()
        );

        let (w1, w2) = init_weights(
            config.seed,
            data.num_features(),
            config.hidden_layer_width()?,
            data.num_classes(),
        );

        Ok(Trainer {
            group,
            engine: SpmmEngine::new(adjacency, config.equation1_reduction),
            shard,
            layers: [
                GcnLayer::new(Activation::Relu),
                GcnLayer::new(Activation::LogSoftmax),
            ],
            weights: vec![w1, w2],
            optimizer: create_optimizer(config.optimizer, config.learning_rate),
            metrics: Metrics::new(rank, config.enable_timing()?),
            device_id: config.device_id(rank),
        })
    }

    pub fn rank(&self) -> Rank {
        self.group.rank()
    }

    pub fn weights(&self) -> &[Array2<Scalar>] {
        &self.weights
    }

    pub fn shard(&self) -> &GraphShard {
        &self.shard
    }

    pub fn engine(&self) -> &SpmmEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Forward, loss, backward and one optimizer step.
    pub fn train_epoch(&mut self) -> Result<EpochOutcome> {
        let group = self.group;
        let engine = &self.engine;
        let metrics = &mut self.metrics;

        let (hidden, first) = self.layers[0].forward(
            engine,
            group,
            metrics,
            self.shard.features.clone(),
            &self.weights[0],
        )?;
        let (output, second) = self.layers[1].forward(engine, group, metrics, hidden, &self.weights[1])?;

        let (loss, grad_output) = nll_loss(&output, &self.shard.labels, &self.shard.train_mask)?;
        if !loss.is_finite() {
            return Err(GcnError::numerical(format!(
                "rank {} produced a non-finite loss",
                group.rank()
            )));
        }

        let grads2 = second.backward(engine, group, metrics, &grad_output)?;
        let grads1 = first.backward(engine, group, metrics, &grads2.grad_input)?;

        self.optimizer
            .apply(&mut self.weights, &[grads1.grad_weight, grads2.grad_weight])?;

        Ok(EpochOutcome { loss, output })
    }

    /// Train for `epochs` epochs and report.
    pub fn run(mut self, epochs: usize) -> Result<TrainingReport> {
        let rank = self.rank();
        log::info!(
            "rank {} starting training on device {} with {}",
            rank,
            self.device_id,
            self.optimizer.name()
        );

        self.metrics.start_run(self.group)?;
        let mut losses = Vec::with_capacity(epochs);
        let mut output = None;
        for epoch in 0..epochs {
            let outcome = self.train_epoch()?;
            log::debug!("rank {} epoch {} loss {}", rank, epoch, outcome.loss);
            if rank == 0 {
                log::info!("Epoch: {:03}", epoch);
            }
            losses.push(outcome.loss);
            output = Some(outcome.output);
        }
        self.metrics.finish_run(self.group)?;

        let cluster_timings = if self.metrics.is_enabled() {
            let summary = self.metrics.cluster_summary(self.group)?;
            if rank == 0 {
                log::info!("slowest worker per phase: {}", summary);
            }
            Some(summary)
        } else {
            None
        };

        let output = output.ok_or_else(|| GcnError::config("training needs at least one epoch"))?;
        Ok(TrainingReport {
            rank,
            device_id: self.device_id,
            losses,
            output,
            weights: self.weights,
            timings: *self.metrics.summary(),
            cluster_timings,
        })
    }
}

/// Build a trainer for this worker and run the configured number of epochs.
pub fn run_worker<G>(group: &G, data: &GraphData, config: &Config) -> Result<TrainingReport>
where
    G: CommunicationGroup + ?Sized,
{
    let epochs = config.epochs()?;
    Trainer::new(group, data, config)?.run(epochs)
}
