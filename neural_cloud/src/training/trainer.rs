//! Cascade classifier trainer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataloader::DataLoader;
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;

use super::checkpoint::{
    epoch_checkpoint_name, load_checkpoint, save_checkpoint, CheckpointMetadata, BEST_CHECKPOINT,
};
use super::metrics::{
    accuracy, early_exit_predict, label_values, predictions, AverageMeter, BestMetrics,
    ClassAccuracy, EpochSummary, EvalReport, FitSummary, StepOutput,
};
use super::schedule::LrSchedule;
use super::sink::ScalarSink;
use crate::config::TrainingConfig;
use crate::data::{epoch_seed, EpochLoader, PointCloudBatch};
use crate::error::{NeuralCloudError, Result};
use crate::loss::{completion_loss, CascadeLoss};
use crate::nn::{CascadeModel, CascadeNet};

fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f32 {
    tensor.clone().into_scalar().elem()
}

/// Adam with the configured betas, weight decay and gradient-norm clipping.
///
/// Clipping bounds the L2 norm of every parameter tensor's gradient on its
/// own rather than the norm over all parameters.
pub fn adam_optimizer<B: AutodiffBackend>(config: &TrainingConfig) -> impl Optimizer<CascadeNet<B>, B> {
    let mut adam = AdamConfig::new()
        .with_beta_1(config.beta_1)
        .with_beta_2(config.beta_2);
    if config.weight_decay > 0.0 {
        adam = adam.with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay)));
    }
    if config.gradient_clip > 0.0 {
        adam = adam.with_grad_clipping(Some(GradientClippingConfig::Norm(config.gradient_clip)));
    }
    adam.init::<B, CascadeNet<B>>()
}

/// Seed the backend, build the configured model and Adam, and resume from
/// `config.weights` when set.
pub fn build_trainer<B: AutodiffBackend>(
    config: TrainingConfig,
    device: &B::Device,
) -> Result<CascadeTrainer<B, impl Optimizer<CascadeNet<B>, B>>> {
    config.validate()?;
    B::seed(config.seed);

    let model = config.model.init::<B>(device)?;
    let optim = adam_optimizer::<B>(&config);
    let weights = config.weights.clone();
    let trainer = CascadeTrainer::with_optimizer(config, model, optim, device)?;

    match weights {
        Some(path) => trainer.resume(&path),
        None => Ok(trainer),
    }
}

/// Trains a [`CascadeNet`] with the cascade loss, cosine schedule and
/// periodic validation.
pub struct CascadeTrainer<B: AutodiffBackend, O> {
    model: CascadeNet<B>,
    optim: O,
    loss: CascadeLoss,
    schedule: LrSchedule,
    best: BestMetrics,
    epoch: usize,
    config: TrainingConfig,
    device: B::Device,
}

impl<B, O> CascadeTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<CascadeNet<B>, B>,
{
    /// Create a trainer around an existing model and optimizer.
    pub fn with_optimizer(config: TrainingConfig, model: CascadeNet<B>, optim: O, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let heads = model.num_heads();
        if heads == 0 {
            return Err(NeuralCloudError::config("model has no classification heads"));
        }

        Ok(Self {
            model,
            optim,
            loss: CascadeLoss::new(config.loss.clone()),
            schedule: LrSchedule::new(&config),
            best: BestMetrics::new(heads),
            epoch: 0,
            config,
            device: device.clone(),
        })
    }

    /// Get the training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The model being trained.
    pub fn model(&self) -> &CascadeNet<B> {
        &self.model
    }

    /// Last completed epoch.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Best validation metrics so far.
    pub fn best_metrics(&self) -> &BestMetrics {
        &self.best
    }

    /// Learning-rate schedule state.
    pub fn schedule(&self) -> &LrSchedule {
        &self.schedule
    }

    /// Run one optimization step on `batch`.
    ///
    /// A non-finite loss aborts with [`NeuralCloudError::TrainingError`]
    /// before the parameters are touched.
    pub fn train_step(&mut self, batch: &PointCloudBatch<B>) -> Result<StepOutput> {
        let learning_rate = self.schedule.learning_rate();

        let output = self.model.forward_cascade(batch.points.clone())?;
        let terms = self.loss.forward(&output.logits, batch.labels.clone())?;

        let mut total = terms.total;
        let chamfer = match &output.completion {
            Some(clouds) => {
                let term = completion_loss(clouds, batch.points.clone());
                let value = scalar(&term);
                total = total + term.mul_scalar(self.config.loss.chamfer_weight);
                Some(value)
            }
            None => None,
        };

        let loss = scalar(&total);
        if !loss.is_finite() {
            return Err(NeuralCloudError::TrainingError {
                message: format!("loss is {} at step {}", loss, self.schedule.step()),
            });
        }

        let step = StepOutput {
            loss,
            ce: terms.ce.iter().map(scalar).collect(),
            kl: terms.kl.iter().map(scalar).collect(),
            chamfer,
            accuracy: output
                .logits
                .iter()
                .map(|logits| accuracy(logits.clone(), batch.labels.clone()))
                .collect(),
            learning_rate,
        };

        let grads = GradientsParams::from_grads(total.backward(), &self.model);
        self.model = self.optim.step(learning_rate, self.model.clone(), grads);
        self.schedule.on_step();

        Ok(step)
    }

    /// Run one pass over `loader` and advance the epoch-level schedule.
    ///
    /// The backend is reseeded from the run seed and the epoch number first,
    /// so dropout draws are reproducible across a resume.
    pub fn train_epoch(&mut self, loader: &Arc<dyn DataLoader<PointCloudBatch<B>>>) -> Result<EpochSummary> {
        let start = instant::Instant::now();
        let epoch = self.epoch + 1;
        B::seed(epoch_seed(self.config.seed, epoch));

        let mut loss = AverageMeter::new();
        let mut ce: Vec<AverageMeter> = Vec::new();
        let mut kl: Vec<AverageMeter> = Vec::new();
        let mut acc: Vec<AverageMeter> = Vec::new();
        let mut chamfer: Option<AverageMeter> = None;
        let mut learning_rate = self.schedule.learning_rate();
        let mut steps = 0;

        for batch in loader.iter() {
            let [n, _, _] = batch.points.dims();
            let step = self.train_step(&batch)?;

            loss.update(step.loss, n);
            accumulate(&mut ce, &step.ce, n);
            accumulate(&mut kl, &step.kl, n);
            accumulate(&mut acc, &step.accuracy, n);
            if let Some(value) = step.chamfer {
                chamfer.get_or_insert_with(AverageMeter::new).update(value, n);
            }
            learning_rate = step.learning_rate;
            steps += 1;
        }

        self.schedule.on_epoch();
        self.epoch = epoch;

        let means = |meters: &[AverageMeter]| meters.iter().map(AverageMeter::mean).collect();
        Ok(EpochSummary {
            epoch,
            loss: loss.mean(),
            ce: means(&ce),
            kl: means(&kl),
            chamfer: chamfer.map(|m| m.mean()),
            accuracy: means(&acc),
            learning_rate,
            steps,
            seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Evaluate the current parameters on `loader` without autodiff.
    pub fn evaluate(&self, loader: &Arc<dyn DataLoader<PointCloudBatch<B::InnerBackend>>>) -> Result<EvalReport> {
        let model = self.model.valid();
        let heads = model.num_heads();
        let num_classes = self.config.model.num_classes();
        let threshold = self.config.early_exit_threshold;

        let mut per_head = vec![ClassAccuracy::new(num_classes); heads];
        let mut ensemble = ClassAccuracy::new(num_classes);
        let mut early_exit = ClassAccuracy::new(num_classes);
        let mut depth = AverageMeter::new();
        let mut loss = AverageMeter::new();

        for batch in loader.iter() {
            let [n, _, _] = batch.points.dims();
            let output = model.forward_cascade(batch.points.clone())?;
            let labels = label_values(batch.labels.clone())?;

            let terms = self.loss.forward(&output.logits, batch.labels.clone())?;
            let mut batch_loss = scalar(&terms.total);
            if let Some(clouds) = &output.completion {
                batch_loss += self.config.loss.chamfer_weight
                    * scalar(&completion_loss(clouds, batch.points.clone()));
            }
            loss.update(batch_loss, n);

            for (head, logits) in output.logits.iter().enumerate() {
                per_head[head].update(&predictions(logits.clone())?, &labels)?;
            }

            if let Some(probs) = output
                .logits
                .iter()
                .map(|logits| softmax(logits.clone(), 1))
                .reduce(|acc, p| acc + p)
            {
                ensemble.update(&predictions(probs)?, &labels)?;
            }

            let exit = early_exit_predict(&output.logits, threshold)?;
            early_exit.update(&exit.predictions, &labels)?;
            for head in exit.exit_head {
                depth.update((head + 1).min(heads) as f32, 1);
            }
        }

        Ok(EvalReport {
            head_accuracy: per_head.iter().map(ClassAccuracy::overall).collect(),
            head_class_mean: per_head.iter().map(ClassAccuracy::mean).collect(),
            ensemble_accuracy: ensemble.overall(),
            early_exit_accuracy: early_exit.overall(),
            mean_exit_depth: depth.mean(),
            loss: loss.mean(),
        })
    }

    /// Train from the epoch after the last completed one up to
    /// `num_epochs`, validating after every epoch.
    ///
    /// Periodic checkpoints are written every `save_freq` epochs; the best
    /// checkpoint is rewritten whenever the best head accuracy improves after
    /// `best_after_epoch`.
    pub fn fit(
        &mut self,
        train: &EpochLoader<B>,
        valid: &Arc<dyn DataLoader<PointCloudBatch<B::InnerBackend>>>,
        train_sink: &mut dyn ScalarSink,
        test_sink: &mut dyn ScalarSink,
    ) -> Result<FitSummary> {
        let start_epoch = self.epoch;
        let mut summary = FitSummary {
            start_epoch,
            train: Vec::new(),
            eval: Vec::new(),
            best: self.best.clone(),
        };

        log::info!(
            "Training epochs {}..={} ({} train / {} valid items)",
            start_epoch + 1,
            self.config.num_epochs,
            train.num_items(),
            valid.num_items()
        );

        while self.epoch < self.config.num_epochs {
            let epoch_summary = self.train_epoch(&train.for_epoch(self.epoch + 1))?;
            epoch_summary.log("train");
            emit_train(train_sink, &epoch_summary)?;

            let report = self.evaluate(valid)?;
            let epoch = self.epoch;
            emit_eval(test_sink, &report, epoch)?;
            log::info!(
                "valid epoch={} loss={:.6} acc={:?} ensemble={:.4} early_exit={:.4} depth={:.2}",
                epoch,
                report.loss,
                report.head_accuracy,
                report.ensemble_accuracy,
                report.early_exit_accuracy,
                report.mean_exit_depth
            );

            let improved = self.best.improves(&report);
            self.best.update(&report);

            if self.config.save_freq > 0 && epoch % self.config.save_freq == 0 {
                self.save(&self.config.checkpoint_dir().join(epoch_checkpoint_name(epoch)))?;
            }
            if improved && epoch > self.config.best_after_epoch {
                self.save(&self.config.checkpoint_dir().join(BEST_CHECKPOINT))?;
            }

            train_sink.flush()?;
            test_sink.flush()?;
            summary.train.push(epoch_summary);
            summary.eval.push(report);
        }

        summary.best = self.best.clone();
        Ok(summary)
    }

    /// Write a checkpoint of the current state into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let metadata = CheckpointMetadata::new(
            self.epoch,
            self.schedule.step(),
            self.best.clone(),
            self.schedule.clone(),
        );
        save_checkpoint::<B, _, _>(dir, self.model.clone(), self.optim.to_record(), &metadata)
    }

    /// Restore model, optimizer, schedule, epoch and best metrics from `dir`.
    pub fn resume(mut self, dir: &Path) -> Result<Self> {
        let (model, record, metadata) = load_checkpoint::<B, _, _>(dir, self.model.clone(), &self.device)?;
        self.model = model;
        self.optim = self.optim.load_record(record);
        self.schedule = metadata.schedule;
        self.best = metadata.best_metrics;
        self.epoch = metadata.epoch;
        log::info!("Resuming after epoch {} from {:?}", self.epoch, dir);
        Ok(self)
    }

    /// Path of the latest periodic checkpoint, if any.
    pub fn latest_checkpoint(&self) -> Option<PathBuf> {
        super::checkpoint::find_latest_checkpoint(&self.config.checkpoint_dir())
    }
}

fn accumulate(meters: &mut Vec<AverageMeter>, values: &[f32], n: usize) {
    if meters.len() < values.len() {
        meters.resize(values.len(), AverageMeter::new());
    }
    for (meter, &value) in meters.iter_mut().zip(values) {
        meter.update(value, n);
    }
}

fn emit_train(sink: &mut dyn ScalarSink, summary: &EpochSummary) -> Result<()> {
    let step = summary.epoch;
    sink.add_scalar("Loss/Epoch/total", summary.loss as f64, step)?;
    for (i, value) in summary.ce.iter().enumerate() {
        sink.add_scalar(&format!("Loss/Epoch/ce_s{}", i), *value as f64, step)?;
    }
    for (i, value) in summary.kl.iter().enumerate() {
        sink.add_scalar(&format!("Loss/Epoch/kl_r{}", i), *value as f64, step)?;
    }
    if let Some(value) = summary.chamfer {
        sink.add_scalar("Loss/Epoch/chamfer", value as f64, step)?;
    }
    for (i, value) in summary.accuracy.iter().enumerate() {
        sink.add_scalar(&format!("Accuracy/Epoch/head{}", i), *value as f64, step)?;
    }
    sink.add_scalar("Learning_Rate/Hyper/lr", summary.learning_rate, step)
}

fn emit_eval(sink: &mut dyn ScalarSink, report: &EvalReport, step: usize) -> Result<()> {
    sink.add_scalar("Loss/Epoch/total", report.loss as f64, step)?;
    for (i, value) in report.head_accuracy.iter().enumerate() {
        sink.add_scalar(&format!("Accuracy/Epoch/head{}", i), *value as f64, step)?;
    }
    for (i, value) in report.head_class_mean.iter().enumerate() {
        sink.add_scalar(&format!("Accuracy/Epoch/class_mean{}", i), *value as f64, step)?;
    }
    sink.add_scalar("Accuracy/Epoch/ensemble", report.ensemble_accuracy as f64, step)?;
    sink.add_scalar("Accuracy/Epoch/early_exit", report.early_exit_accuracy as f64, step)
}
