//! Training configuration types.

use std::path::PathBuf;

use burn::config::Config;

use super::{ModelConfig, PointMlpConfig};
use crate::error::NeuralCloudError;

/// How per-head logits are combined into a classification loss.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum LossMode {
    /// Per-head cross-entropy plus KL from every shallower head to the deepest one.
    Cascade,
    /// Cross-entropy of the averaged logits plus per-head cross-entropy.
    Ensemble,
}

/// Configuration for the multi-head classification loss.
#[derive(Config, Debug)]
pub struct CascadeLossConfig {
    /// Combination mode.
    #[config(default = "LossMode::Cascade")]
    pub mode: LossMode,

    /// Weight of every cross-entropy term.
    #[config(default = 1.0)]
    pub ce_weight: f32,

    /// Weight of every KL term.
    #[config(default = 1.0)]
    pub kl_weight: f32,

    /// Softmax temperature for the KL terms.
    #[config(default = 1.0)]
    pub temperature: f32,

    /// Label smoothing for cross-entropy.
    pub label_smoothing: Option<f32>,

    /// Weight of the Chamfer term when the model produces completion clouds.
    #[config(default = 1.0)]
    pub chamfer_weight: f32,
}

impl Default for CascadeLossConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadeLossConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.temperature <= 0.0 {
            return Err(NeuralCloudError::config("temperature must be positive"));
        }
        if let Some(alpha) = self.label_smoothing {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(NeuralCloudError::config(format!(
                    "label smoothing {} is outside [0, 1]",
                    alpha
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the cascade trainer.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Architecture to train.
    pub model: ModelConfig,

    /// Loss configuration.
    #[config(default = "CascadeLossConfig::new()")]
    pub loss: CascadeLossConfig,

    /// Points per input cloud.
    #[config(default = 1024)]
    pub num_points: usize,

    /// Number of training epochs.
    #[config(default = 300)]
    pub num_epochs: usize,

    /// Batch size.
    #[config(default = 32)]
    pub batch_size: usize,

    /// Data loader worker threads.
    #[config(default = 4)]
    pub num_workers: usize,

    /// Peak learning rate.
    #[config(default = 1e-3)]
    pub learning_rate: f64,

    /// L2 weight decay.
    #[config(default = 1e-4)]
    pub weight_decay: f32,

    /// Adam first-moment decay.
    #[config(default = 0.9)]
    pub beta_1: f32,

    /// Adam second-moment decay.
    #[config(default = 0.999)]
    pub beta_2: f32,

    /// Gradient L2-norm clipping threshold (0 = no clipping).
    #[config(default = 1.0)]
    pub gradient_clip: f32,

    /// Optimizer steps of linear warmup.
    #[config(default = 0)]
    pub warmup_steps: usize,

    /// Cosine annealing period in epochs.
    #[config(default = 300)]
    pub cosine_period: usize,

    /// Learning rate at the end of the cosine period. Must not exceed
    /// `learning_rate`.
    #[config(default = 5e-6)]
    pub min_learning_rate: f64,

    /// Save a numbered checkpoint every this many epochs (0 = never).
    #[config(default = 10)]
    pub save_freq: usize,

    /// Best checkpoints are only written after this epoch.
    #[config(default = 50)]
    pub best_after_epoch: usize,

    /// Random seed for the backend and the data pipeline.
    #[config(default = 42)]
    pub seed: u64,

    /// Directory receiving checkpoints and scalar logs.
    #[config(default = "PathBuf::from(\"output\")")]
    pub output_dir: PathBuf,

    /// Checkpoint directory to resume from.
    pub weights: Option<PathBuf>,

    /// Whether training batches are augmented.
    #[config(default = true)]
    pub augment: bool,

    /// Confidence threshold used by early-exit evaluation.
    #[config(default = 0.9)]
    pub early_exit_threshold: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(ModelConfig::PointMlp(PointMlpConfig::new()))
    }
}

impl TrainingConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(NeuralCloudError::config("learning_rate must be positive"));
        }
        if self.min_learning_rate < 0.0 || self.min_learning_rate > self.learning_rate {
            return Err(NeuralCloudError::config(
                "min_learning_rate must lie in [0, learning_rate]",
            ));
        }
        if self.batch_size == 0 {
            return Err(NeuralCloudError::config("batch_size must be positive"));
        }
        if self.num_epochs == 0 {
            return Err(NeuralCloudError::config("num_epochs must be positive"));
        }
        if !(0.0..1.0).contains(&self.beta_1) || !(0.0..1.0).contains(&self.beta_2) {
            return Err(NeuralCloudError::config("Adam betas must lie in [0, 1)"));
        }
        if self.gradient_clip < 0.0 {
            return Err(NeuralCloudError::config("gradient_clip must be non-negative"));
        }
        self.loss.validate()?;
        self.model.validate(self.num_points)
    }

    /// Scalar log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    /// Checkpoint directory.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.output_dir.join("checkpoints")
    }
}
