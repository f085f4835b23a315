//! Classification metrics and training output types.

use burn::prelude::*;
use burn::tensor::activation::softmax;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{NeuralCloudError, Result};

fn host_values<B: Backend, const D: usize, K>(tensor: Tensor<B, D, K>) -> Result<Vec<f32>>
where
    K: burn::tensor::BasicOps<B> + burn::tensor::TensorKind<B>,
{
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NeuralCloudError::InvalidData(format!("{:?}", e)))
}

/// Argmax class per row of `[B, C]` logits.
pub fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<i64>> {
    let [batch, _] = logits.dims();
    let values = host_values(logits.argmax(1).reshape([batch]))?;
    Ok(values.into_iter().map(|v| v as i64).collect())
}

/// Labels tensor as host integers.
pub fn label_values<B: Backend>(labels: Tensor<B, 1, Int>) -> Result<Vec<i64>> {
    Ok(host_values(labels)?.into_iter().map(|v| v as i64).collect())
}

/// Fraction of rows whose argmax equals the label. Empty batches score 0.
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> f32 {
    let [batch, _] = logits.dims();
    if batch == 0 {
        return 0.0;
    }
    let correct: i64 = logits
        .argmax(1)
        .reshape([batch])
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as f32 / batch as f32
}

/// Per-class correct and total counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAccuracy {
    correct: Vec<usize>,
    total: Vec<usize>,
}

impl ClassAccuracy {
    /// Create counters for `num_classes` classes.
    pub fn new(num_classes: usize) -> Self {
        Self {
            correct: vec![0; num_classes],
            total: vec![0; num_classes],
        }
    }

    /// Add a batch of predictions. Labels above the class range grow the
    /// counters; a negative label rejects the whole batch.
    pub fn update(&mut self, predictions: &[i64], labels: &[i64]) -> Result<()> {
        if let Some(label) = labels.iter().find(|&&l| l < 0) {
            return Err(NeuralCloudError::InvalidData(format!("negative class label {}", label)));
        }
        for (&pred, &label) in predictions.iter().zip(labels) {
            let class = label as usize;
            if class >= self.total.len() {
                self.total.resize(class + 1, 0);
                self.correct.resize(class + 1, 0);
            }
            self.total[class] += 1;
            if pred == label {
                self.correct[class] += 1;
            }
        }
        Ok(())
    }

    /// Accuracy over every sample seen.
    pub fn overall(&self) -> f32 {
        let total: usize = self.total.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.correct.iter().sum::<usize>() as f32 / total as f32
    }

    /// Mean of per-class accuracies over observed classes.
    pub fn mean(&self) -> f32 {
        let per_class: Vec<f32> = self
            .correct
            .iter()
            .zip(&self.total)
            .filter(|(_, &t)| t > 0)
            .map(|(&c, &t)| c as f32 / t as f32)
            .collect();
        if per_class.is_empty() {
            0.0
        } else {
            per_class.iter().sum::<f32>() / per_class.len() as f32
        }
    }
}

/// Running mean of a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageMeter {
    sum: f64,
    count: usize,
}

impl AverageMeter {
    /// Create an empty meter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` observed `n` times.
    pub fn update(&mut self, value: f32, n: usize) {
        self.sum += value as f64 * n as f64;
        self.count += n;
    }

    /// Current mean (0 when empty).
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }

    /// Number of observations.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Scalars of one optimization step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Total loss.
    pub loss: f32,
    /// Cross-entropy per head.
    pub ce: Vec<f32>,
    /// KL per shallower head.
    pub kl: Vec<f32>,
    /// Completion Chamfer term, for completion models.
    pub chamfer: Option<f32>,
    /// Accuracy per head on the batch.
    pub accuracy: Vec<f32>,
    /// Learning rate used for the step.
    pub learning_rate: f64,
}

/// Validation results of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Overall accuracy per head.
    pub head_accuracy: Vec<f32>,
    /// Mean per-class accuracy per head.
    pub head_class_mean: Vec<f32>,
    /// Accuracy of the averaged softmax over heads.
    pub ensemble_accuracy: f32,
    /// Accuracy of confidence-thresholded early exit.
    pub early_exit_accuracy: f32,
    /// Mean number of heads evaluated per sample under early exit.
    pub mean_exit_depth: f32,
    /// Mean validation loss.
    pub loss: f32,
}

impl EvalReport {
    /// Best accuracy among heads.
    pub fn max_accuracy(&self) -> f32 {
        self.head_accuracy.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Element-wise best validation metrics across epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMetrics {
    /// Best overall accuracy per head.
    #[serde(with = "unbounded")]
    pub accuracy: Vec<f32>,
    /// Best mean per-class accuracy per head.
    #[serde(with = "unbounded")]
    pub class_mean: Vec<f32>,
}

// JSON has no infinities; unset entries are stored as null.
mod unbounded {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f32>, D::Error> {
        let values = Vec::<Option<f32>>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|v| v.unwrap_or(f32::NEG_INFINITY))
            .collect())
    }
}

impl BestMetrics {
    /// Metrics for `heads` heads, all at negative infinity.
    pub fn new(heads: usize) -> Self {
        Self {
            accuracy: vec![f32::NEG_INFINITY; heads],
            class_mean: vec![f32::NEG_INFINITY; heads],
        }
    }

    /// Best accuracy among heads.
    pub fn max_accuracy(&self) -> f32 {
        self.accuracy.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Whether `report`'s best head beats the best head seen so far.
    pub fn improves(&self, report: &EvalReport) -> bool {
        report.max_accuracy() > self.max_accuracy()
    }

    /// Take the element-wise maximum with `report`.
    pub fn update(&mut self, report: &EvalReport) {
        merge_max(&mut self.accuracy, &report.head_accuracy);
        merge_max(&mut self.class_mean, &report.head_class_mean);
    }
}

fn merge_max(best: &mut Vec<f32>, current: &[f32]) {
    if best.len() < current.len() {
        best.resize(current.len(), f32::NEG_INFINITY);
    }
    for (b, &c) in best.iter_mut().zip(current) {
        *b = b.max(c);
    }
}

/// Training averages of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// One-based epoch index.
    pub epoch: usize,
    /// Mean total loss.
    pub loss: f32,
    /// Mean cross-entropy per term.
    pub ce: Vec<f32>,
    /// Mean KL per shallower head.
    pub kl: Vec<f32>,
    /// Mean Chamfer term, for completion models.
    pub chamfer: Option<f32>,
    /// Mean batch accuracy per head.
    pub accuracy: Vec<f32>,
    /// Learning rate of the last step.
    pub learning_rate: f64,
    /// Optimizer steps taken.
    pub steps: usize,
    /// Wall-clock duration in seconds.
    pub seconds: f64,
}

impl EpochSummary {
    /// Log the summary at info level.
    pub fn log(&self, prefix: &str) {
        log::info!(
            "{} epoch={} loss={:.6} acc={:?} lr={:.2e} steps={} time={:.1}s",
            prefix,
            self.epoch,
            self.loss,
            self.accuracy,
            self.learning_rate,
            self.steps,
            self.seconds,
        );
    }
}

/// Outcome of a full training run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    /// Epoch training started after (0 for a fresh run).
    pub start_epoch: usize,
    /// Per-epoch training summaries.
    pub train: Vec<EpochSummary>,
    /// Per-epoch validation reports.
    pub eval: Vec<EvalReport>,
    /// Best validation metrics at the end of the run.
    pub best: BestMetrics,
}

impl FitSummary {
    /// Last completed epoch.
    pub fn last_epoch(&self) -> usize {
        self.train.last().map(|s| s.epoch).unwrap_or(self.start_epoch)
    }
}

/// Early-exit decisions for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarlyExit {
    /// Predicted class per sample.
    pub predictions: Vec<i64>,
    /// Head that produced each prediction; `num_heads` marks the ensemble fallback.
    pub exit_head: Vec<usize>,
}

/// Per sample, the prediction of the first head whose top softmax probability
/// reaches `threshold`; samples no head is confident about fall back to the
/// mean of all heads' probabilities.
pub fn early_exit_predict<B: Backend>(logits: &[Tensor<B, 2>], threshold: f32) -> Result<EarlyExit> {
    let Some(first) = logits.first() else {
        return Ok(EarlyExit {
            predictions: Vec::new(),
            exit_head: Vec::new(),
        });
    };
    let [batch, classes] = first.dims();

    let probs = logits
        .iter()
        .map(|head| host_values(softmax(head.clone(), 1)))
        .collect::<Result<Vec<_>>>()?;

    let argmax = |row: &[f32]| -> (usize, f32) {
        row.iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
    };

    let mut predictions = Vec::with_capacity(batch);
    let mut exit_head = Vec::with_capacity(batch);
    for sample in 0..batch {
        let range = sample * classes..(sample + 1) * classes;
        let confident = probs.iter().enumerate().find_map(|(head, p)| {
            let (class, prob) = argmax(&p[range.clone()]);
            (prob >= threshold).then_some((head, class))
        });
        let (head, class) = confident.unwrap_or_else(|| {
            let mean: Vec<f32> = (0..classes)
                .map(|c| probs.iter().map(|p| p[range.start + c]).sum::<f32>() / probs.len() as f32)
                .collect();
            (probs.len(), argmax(&mean).0)
        });
        predictions.push(class as i64);
        exit_head.push(head);
    }

    Ok(EarlyExit {
        predictions,
        exit_head,
    })
}
