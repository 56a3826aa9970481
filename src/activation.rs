//! Row-wise nonlinearities applied after the dense weight multiply.

use ndarray::{Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::Scalar;

/// Activation selected per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    /// Log-softmax over each row
    LogSoftmax,
}

impl Activation {
    /// `activation(y)`
    pub fn forward(self, y: &Array2<Scalar>) -> Array2<Scalar> {
        match self {
            Activation::Identity => y.clone(),
            Activation::Relu => y.mapv(|v| v.max(0.0)),
            Activation::LogSoftmax => log_softmax(y),
        }
    }

    /// Gradient w.r.t. `y` given the gradient w.r.t. `activation(y)`.
    pub fn backward(self, y: &Array2<Scalar>, grad_out: &Array2<Scalar>) -> Result<Array2<Scalar>> {
        crate::ensure_shape!("activation gradient", y.dim(), grad_out.dim());

        Ok(match self {
            Activation::Identity => grad_out.clone(),
            Activation::Relu => {
                let mut grad = grad_out.clone();
                Zip::from(&mut grad).and(y).for_each(|g, &v| {
                    if v <= 0.0 {
                        *g = 0.0;
                    }
                });
                grad
            }
            Activation::LogSoftmax => {
                // d/dy = g - softmax(y) * sum_k g_k
                let mut grad = log_softmax(y).mapv(Scalar::exp);
                let totals = grad_out.sum_axis(Axis(1));
                for ((mut row, g), total) in grad
                    .axis_iter_mut(Axis(0))
                    .zip(grad_out.axis_iter(Axis(0)))
                    .zip(totals.iter())
                {
                    Zip::from(&mut row).and(&g).for_each(|p, &gk| *p = gk - *p * total);
                }
                grad
            }
        })
    }
}

fn log_softmax(y: &Array2<Scalar>) -> Array2<Scalar> {
    let mut out = y.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(Scalar::NEG_INFINITY, |m, &v| m.max(v));
        let lse = row.fold(0.0, |acc, &v| acc + (v - max).exp()).ln();
        row.mapv_inplace(|v| (v - max) - lse);
    }
    out
}
