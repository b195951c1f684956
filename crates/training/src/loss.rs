//! Cross entropy with label smoothing.

use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

pub const DEFAULT_SMOOTHING: f32 = 0.1;

/// `(1 - e) * NLL(target) + e * mean_c NLL(c)`, averaged over the batch.
#[derive(Debug, Clone, Copy)]
pub struct LabelSmoothingCrossEntropy {
    pub smoothing: f32,
}

impl Default for LabelSmoothingCrossEntropy {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl LabelSmoothingCrossEntropy {
    pub fn new(smoothing: f32) -> Self {
        Self { smoothing }
    }

    /// `logits` is `[N, C]`, `targets` is `[N]`; returns a one-element tensor.
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [n, _] = logits.dims();
        let log_probs = log_softmax(logits, 1);
        let nll = log_probs
            .clone()
            .gather(1, targets.reshape([n, 1]))
            .neg()
            .mean();
        let smooth = log_probs.mean_dim(1).neg().mean();
        nll * (1.0 - self.smoothing) + smooth * self.smoothing
    }
}
