//! Learning-rate schedule: per-step linear warmup on top of per-epoch cosine annealing.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;

/// Learning-rate schedule state.
///
/// The cosine factor advances once per epoch and stays at the minimum after
/// `cosine_period` epochs. During the first `warmup_steps` optimizer steps the
/// rate is additionally scaled by `(step + 1) / warmup_steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrSchedule {
    base_lr: f64,
    min_lr: f64,
    warmup_steps: usize,
    cosine_period: usize,
    step: usize,
    epoch: usize,
}

impl LrSchedule {
    /// Schedule starting at step 0, epoch 0.
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            base_lr: config.learning_rate,
            min_lr: config.min_learning_rate,
            warmup_steps: config.warmup_steps,
            cosine_period: config.cosine_period,
            step: 0,
            epoch: 0,
        }
    }

    /// Rate for the next optimizer step.
    pub fn learning_rate(&self) -> f64 {
        let cosine = if self.cosine_period == 0 {
            self.base_lr
        } else {
            let progress = self.epoch.min(self.cosine_period) as f64 / self.cosine_period as f64;
            self.min_lr + (self.base_lr - self.min_lr) * (1.0 + (PI * progress).cos()) / 2.0
        };
        if self.step < self.warmup_steps {
            cosine * (self.step + 1) as f64 / self.warmup_steps as f64
        } else {
            cosine
        }
    }

    /// Record one optimizer step.
    pub fn on_step(&mut self) {
        self.step += 1;
    }

    /// Record the end of an epoch.
    pub fn on_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Optimizer steps taken.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Epochs completed.
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}
