//! The graph-convolution layer and its hand-derived backward pass.
//!
//! A forward call returns the layer output together with a [`LayerContext`]
//! holding what the backward pass needs. `backward` consumes the context, so
//! a context is used for exactly one backward pass.
//!
//! Forward: `Z = Aᵀ·H` (distributed), `Y = Z·W`, `out = σ(Y)`.
//!
//! Backward, given `∂L/∂out`:
//! 1. `G = σ'(Y) ⊙ ∂L/∂out`, computed locally
//! 2. `AG = A·G` restricted to this worker's rows, then
//!    `∂L/∂H = AG · Wᵀ`
//! 3. `∂L/∂W = Hᵀ · AG`, summed over all workers
//!
//! Step 3 reuses `AG` from step 2.

use ndarray::Array2;

use crate::activation::Activation;
use crate::core::error::Result;
use crate::core::types::Scalar;
use crate::network::{CommunicationGroup, ReduceOp};
use crate::spmm::SpmmEngine;
use crate::timing::{Metrics, Phase};

/// One graph-convolution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcnLayer {
    activation: Activation,
}

impl GcnLayer {
    pub fn new(activation: Activation) -> Self {
        GcnLayer { activation }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Run the layer on this worker's input shard.
    pub fn forward<G>(
        &self,
        engine: &SpmmEngine,
        group: &G,
        metrics: &mut Metrics,
        mut input: Array2<Scalar>,
        weight: &Array2<Scalar>,
    ) -> Result<(Array2<Scalar>, LayerContext)>
    where
        G: CommunicationGroup + ?Sized,
    {
        crate::ensure_shape!("layer weight rows", input.ncols(), weight.nrows());

        let z = engine.multiply(group, metrics, &mut input)?;
        let y = metrics.timed(group, Phase::DenseCompute, || Ok(z.dot(weight)))?;
        let out = self.activation.forward(&y);

        let context = LayerContext {
            activation: self.activation,
            input,
            weight: weight.clone(),
            pre_activation: y,
        };
        Ok((out, context))
    }
}

/// Values retained from a forward pass.
#[derive(Debug, Clone)]
pub struct LayerContext {
    activation: Activation,
    input: Array2<Scalar>,
    weight: Array2<Scalar>,
    pre_activation: Array2<Scalar>,
}

/// Gradients produced by one backward pass.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    /// `∂L/∂H` for this worker's rows
    pub grad_input: Array2<Scalar>,
    /// `∂L/∂W`, identical on every worker
    pub grad_weight: Array2<Scalar>,
}

impl LayerContext {
    /// The input shard seen by the forward pass.
    pub fn input(&self) -> &Array2<Scalar> {
        &self.input
    }

    /// `Y = Z·W` before the activation.
    pub fn pre_activation(&self) -> &Array2<Scalar> {
        &self.pre_activation
    }

    /// Back-propagate `grad_out` through the layer.
    pub fn backward<G>(
        self,
        engine: &SpmmEngine,
        group: &G,
        metrics: &mut Metrics,
        grad_out: &Array2<Scalar>,
    ) -> Result<LayerGradients>
    where
        G: CommunicationGroup + ?Sized,
    {
        let grad_y = self.activation.backward(&self.pre_activation, grad_out)?;

        let ag = engine.gradient_product(group, metrics, &grad_y)?;
        let grad_input = metrics.timed(group, Phase::DenseCompute, || Ok(ag.dot(&self.weight.t())))?;

        let mut grad_weight =
            metrics.timed(group, Phase::DenseCompute, || Ok(self.input.t().dot(&ag)))?;
        metrics.timed(group, Phase::ReduceEquation2, || {
            group.all_reduce(&mut grad_weight, ReduceOp::Sum)
        })?;

        Ok(LayerGradients {
            grad_input,
            grad_weight,
        })
    }
}
