//! Weight update rules.
//!
//! Every worker runs its own optimizer over its own weight replicas. Because
//! the gradients handed in are already identical on every worker and the
//! update is a deterministic element-wise rule, the replicas stay identical.

use ndarray::{Array2, Zip};

use crate::core::constants::{ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON};
use crate::core::error::{GcnError, Result};
use crate::core::types::{OptimizerKind, Scalar};

/// Applies one gradient step to a list of parameters.
pub trait Optimizer: Send {
    /// Update `params[k]` with `grads[k]`.
    fn apply(&mut self, params: &mut [Array2<Scalar>], grads: &[Array2<Scalar>]) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the optimizer selected in the configuration.
pub fn create_optimizer(kind: OptimizerKind, learning_rate: f32) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
        OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
    }
}

fn check_pairs(params: &[Array2<Scalar>], grads: &[Array2<Scalar>]) -> Result<()> {
    if params.len() != grads.len() {
        return Err(GcnError::shape_mismatch(
            "optimizer gradients",
            format!("{} tensors", params.len()),
            format!("{} tensors", grads.len()),
        ));
    }
    for (k, (p, g)) in params.iter().zip(grads).enumerate() {
        if p.dim() != g.dim() {
            return Err(GcnError::shape_mismatch(
                format!("gradient of parameter {}", k),
                format!("{:?}", p.dim()),
                format!("{:?}", g.dim()),
            ));
        }
    }
    Ok(())
}

/// Plain gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn apply(&mut self, params: &mut [Array2<Scalar>], grads: &[Array2<Scalar>]) -> Result<()> {
        check_pairs(params, grads)?;
        for (p, g) in params.iter_mut().zip(grads) {
            p.scaled_add(-self.learning_rate, g);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}

/// Adam with bias correction.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    first_moments: Vec<Array2<Scalar>>,
    second_moments: Vec<Array2<Scalar>>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Adam::with_betas(learning_rate, ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON)
    }

    pub fn with_betas(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            step: 0,
            first_moments: Vec::new(),
            second_moments: Vec::new(),
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.step
    }
}

impl Optimizer for Adam {
    fn apply(&mut self, params: &mut [Array2<Scalar>], grads: &[Array2<Scalar>]) -> Result<()> {
        check_pairs(params, grads)?;
        if self.first_moments.is_empty() {
            self.first_moments = params.iter().map(|p| Array2::zeros(p.dim())).collect();
            self.second_moments = params.iter().map(|p| Array2::zeros(p.dim())).collect();
        } else if self.first_moments.len() != params.len() {
            return Err(GcnError::shape_mismatch(
                "adam state",
                format!("{} tensors", self.first_moments.len()),
                format!("{} tensors", params.len()),
            ));
        }

        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let step_size = self.learning_rate / bias1;
        let bias2_sqrt = bias2.sqrt();
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for (((p, g), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(self.first_moments.iter_mut())
            .zip(self.second_moments.iter_mut())
        {
            Zip::from(p).and(g).and(m).and(v).for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let denom = v.sqrt() / bias2_sqrt + epsilon;
                *p -= step_size * *m / denom;
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_sgd_step() {
        let mut params = vec![array![[1.0, 2.0]]];
        let mut sgd = Sgd::new(0.5);
        sgd.apply(&mut params, &[array![[2.0, -2.0]]]).unwrap();
        assert_eq!(params[0], array![[0.0, 3.0]]);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        // With bias correction the first step is lr * sign(g) up to epsilon.
        let mut params = vec![array![[1.0, 1.0, 1.0]]];
        let mut adam = Adam::new(0.01);
        adam.apply(&mut params, &[array![[3.0, -0.5, 0.0]]]).unwrap();
        assert_abs_diff_eq!(params[0][[0, 0]], 0.99, epsilon = 1e-5);
        assert_abs_diff_eq!(params[0][[0, 1]], 1.01, epsilon = 1e-5);
        assert_eq!(params[0][[0, 2]], 1.0);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_adam_rejects_changed_parameter_list() {
        let mut adam = Adam::new(0.01);
        let mut one = vec![Array2::zeros((1, 1))];
        adam.apply(&mut one, &[Array2::ones((1, 1))]).unwrap();
        let mut two = vec![Array2::zeros((1, 1)), Array2::zeros((1, 1))];
        let grads = vec![Array2::ones((1, 1)), Array2::ones((1, 1))];
        assert!(adam.apply(&mut two, &grads).is_err());
        assert!(adam.apply(&mut one, &grads).is_err());
    }

    #[test]
    fn test_factory_selects_kind() {
        assert_eq!(create_optimizer(OptimizerKind::Adam, 0.01).name(), "adam");
        assert_eq!(create_optimizer(OptimizerKind::Sgd, 0.01).name(), "sgd");
    }
}
