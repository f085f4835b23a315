//! Training infrastructure for cascade classifiers.
//!
//! This module provides:
//! - `CascadeTrainer`: epoch loop, validation and resumption
//! - `LrSchedule`: warmup plus cosine annealing
//! - Classification metrics and early-exit evaluation
//! - Scalar sinks for per-epoch logging
//! - Checkpoint save/load for training resumption

mod checkpoint;
mod metrics;
mod schedule;
mod sink;
mod trainer;

pub use checkpoint::{
    checkpoint_exists, epoch_checkpoint_name, find_latest_checkpoint, load_checkpoint,
    save_checkpoint, CheckpointMetadata, BEST_CHECKPOINT, CHECKPOINT_VERSION,
};
pub use metrics::{
    accuracy, early_exit_predict, label_values, predictions, AverageMeter, BestMetrics,
    ClassAccuracy, EarlyExit, EpochSummary, EvalReport, FitSummary, StepOutput,
};
pub use schedule::LrSchedule;
pub use sink::{JsonlScalarWriter, MemorySink, ScalarSink};
pub use trainer::{adam_optimizer, build_trainer, CascadeTrainer};
