//! Multi-head classification loss.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax};

use crate::config::{CascadeLossConfig, LossMode};
use crate::error::{NeuralCloudError, Result};

/// Loss terms of one batch.
#[derive(Debug, Clone)]
pub struct CascadeLossOutput<B: Backend> {
    /// Weighted sum of every term.
    pub total: Tensor<B, 1>,
    /// Cross-entropy per head (in ensemble mode the ensemble term comes last).
    pub ce: Vec<Tensor<B, 1>>,
    /// KL term per shallower head.
    pub kl: Vec<Tensor<B, 1>>,
}

/// Cross-entropy per head, with either KL alignment of shallow heads to the
/// deepest head or an ensemble cross-entropy.
///
/// In cascade mode the deepest head's tempered distribution is detached and
/// every shallower head `i` adds `KL(p_last ‖ p_i) · T²`, averaged over the
/// batch.
#[derive(Debug, Clone)]
pub struct CascadeLoss {
    config: CascadeLossConfig,
}

impl CascadeLoss {
    /// Create a new loss calculator.
    pub fn new(config: CascadeLossConfig) -> Self {
        Self { config }
    }

    /// Access the configuration.
    pub fn config(&self) -> &CascadeLossConfig {
        &self.config
    }

    /// Compute the loss for per-head logits `[B, C]` and labels `[B]`.
    pub fn forward<B: Backend>(
        &self,
        logits: &[Tensor<B, 2>],
        labels: Tensor<B, 1, Int>,
    ) -> Result<CascadeLossOutput<B>> {
        let last = logits
            .last()
            .ok_or_else(|| NeuralCloudError::config("loss needs at least one head"))?;
        let [batch] = labels.dims();
        for head in logits {
            let [rows, _] = head.dims();
            if rows != batch {
                return Err(NeuralCloudError::ShapeMismatch {
                    expected: vec![batch],
                    got: vec![rows],
                });
            }
        }

        let device = last.device();
        let ce_loss = CrossEntropyLossConfig::new()
            .with_smoothing(self.config.label_smoothing)
            .init(&device);

        let ce: Vec<Tensor<B, 1>> = logits
            .iter()
            .map(|head| ce_loss.forward(head.clone(), labels.clone()))
            .collect();
        let ce_sum = sum_terms(&ce, &device);

        match self.config.mode {
            LossMode::Cascade => {
                let kl = self.kl_terms(logits);
                let total = ce_sum.mul_scalar(self.config.ce_weight)
                    + sum_terms(&kl, &device).mul_scalar(self.config.kl_weight);
                Ok(CascadeLossOutput { total, ce, kl })
            }
            LossMode::Ensemble => {
                let mean = logits
                    .iter()
                    .skip(1)
                    .fold(logits[0].clone(), |acc, head| acc + head.clone())
                    .div_scalar(logits.len() as f32);
                let ensemble = ce_loss.forward(mean, labels);
                let total = (ce_sum + ensemble.clone()).mul_scalar(self.config.ce_weight);
                let mut ce = ce;
                ce.push(ensemble);
                Ok(CascadeLossOutput {
                    total,
                    ce,
                    kl: Vec::new(),
                })
            }
        }
    }

    fn kl_terms<B: Backend>(&self, logits: &[Tensor<B, 2>]) -> Vec<Tensor<B, 1>> {
        let Some((deepest, shallow)) = logits.split_last() else {
            return Vec::new();
        };
        let t = self.config.temperature;
        let [batch, _] = deepest.dims();

        let target = deepest.clone().detach().div_scalar(t);
        let target_log = log_softmax(target.clone(), 1);
        let target_probs = softmax(target, 1);

        shallow
            .iter()
            .map(|head| {
                let student_log = log_softmax(head.clone().div_scalar(t), 1);
                (target_probs.clone() * (target_log.clone() - student_log))
                    .sum()
                    .div_scalar(batch.max(1) as f32)
                    .mul_scalar(t * t)
            })
            .collect()
    }
}

fn sum_terms<B: Backend>(terms: &[Tensor<B, 1>], device: &B::Device) -> Tensor<B, 1> {
    terms
        .iter()
        .cloned()
        .reduce(|acc, term| acc + term)
        .unwrap_or_else(|| Tensor::zeros([1], device))
}
