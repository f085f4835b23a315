//! # neural_cloud
//!
//! Hierarchical point-cloud classification and completion with Burn.
//!
//! This crate provides multi-head ("cascade") classifiers that attach a
//! classification head to every stage of a point-cloud encoder, a
//! coarse-to-fine completion decoder, and the training loop that supervises
//! every head jointly. Neighbourhood indices come from cloud_core.
//!
//! ## Features
//!
//! - **PointMLP cascade**: residual MLP stages over k-NN neighbourhoods, one head per stage
//! - **PointNet++ cascade**: set abstraction followed by multi-scale branches
//! - **Snowflake completion**: seed generation plus point deconvolution, classified by PointMLP
//! - **Cascade loss**: per-head cross-entropy with KL alignment to the deepest head
//! - **Training**: Adam, warmup plus cosine schedule, early-exit evaluation, checkpoints
//!
//! ## Quick Start
//!
//! ```ignore
//! use burn::backend::{Autodiff, NdArray};
//! use neural_cloud::prelude::*;
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let config = TrainingConfig::default().with_num_epochs(10);
//! let device = Default::default();
//! let (train, valid) = training_loaders::<MyBackend, _, _>(
//!     &config,
//!     SyntheticShapes::new(512, 1024, 40, 0, Partition::Train),
//!     SyntheticShapes::new(128, 1024, 40, 0, Partition::Test),
//!     &device,
//! );
//!
//! let mut trainer = build_trainer::<MyBackend>(config, &device)?;
//! let summary = trainer.fit(&train, &valid, &mut MemorySink::new(), &mut MemorySink::new())?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! cloud_core (FPS, k-NN indices)
//!     │
//!     ▼
//! nn::ops ──► grouper / set abstraction ──► stages ──► heads
//!                                                       │
//!                        loss::CascadeLoss ◄────────────┘
//!                                │
//!                                ▼
//!                     training::CascadeTrainer
//! ```
//!
//! ## Feature Flags
//!
//! - `ndarray` (default): CPU backend
//! - `wgpu`: GPU acceleration via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod loss;
pub mod nn;
pub mod training;

// Re-export key types for convenience
pub use config::{ModelConfig, TrainingConfig};
pub use error::{NeuralCloudError, Result};
pub use loss::CascadeLoss;
pub use nn::{CascadeModel, CascadeNet, CascadeOutput};
pub use training::{build_trainer, CascadeTrainer};

pub use cloud_core::Point3;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{
        CascadeLossConfig, LossMode, ModelConfig, NormalizeMode, PointMlpConfig,
        PointNetCascadeConfig, SnowflakeConfig, TrainingConfig,
    };
    pub use crate::data::{
        epoch_seed, normalize_unit_sphere, point_cloud_loader, training_loaders, Augmentation,
        EpochLoader, LoaderOptions, Partition, PointCloudBatch, PointCloudBatcher, PointCloudItem,
        ShapeKind, SyntheticShapes,
    };
    pub use crate::error::{NeuralCloudError, Result};
    pub use crate::loss::{chamfer_distance, completion_loss, CascadeLoss, CascadeLossOutput};
    pub use crate::nn::{
        CascadeModel, CascadeNet, CascadeOutput, CompletionDecoder, PointMlp, PointNetCascade,
        SnowflakeNet,
    };
    pub use crate::training::{
        accuracy, build_trainer, checkpoint_exists, early_exit_predict, find_latest_checkpoint,
        load_checkpoint, save_checkpoint, BestMetrics, CascadeTrainer, CheckpointMetadata,
        EvalReport, FitSummary, JsonlScalarWriter, LrSchedule, MemorySink, ScalarSink,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use config::PointMlpConfig;

    type TestBackend = NdArray;

    #[test]
    fn test_public_api() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.num_classes(), 40);
    }

    #[test]
    fn test_model_creation() {
        let device = Default::default();
        let config = ModelConfig::PointMlp(
            PointMlpConfig::new()
                .with_points(32)
                .with_embed_dim(4)
                .with_dim_expansion(vec![2])
                .with_pre_blocks(vec![1])
                .with_pos_blocks(vec![1])
                .with_reducers(vec![2])
                .with_k_neighbors(vec![4])
                .with_head_hidden([8, 8]),
        );
        let model = config.init::<TestBackend>(&device).unwrap();
        assert_eq!(model.num_heads(), 1);
    }
}
