//! Configuration types for neural_cloud.
//!
//! Burn-style configuration structs for the networks, the loss and the
//! training loop. Every config serializes to JSON through the `Config` derive.

mod network;
mod training;

pub use network::{
    ModelConfig, NormalizeMode, PointMlpConfig, PointNetCascadeConfig, SnowflakeConfig,
};
pub use training::{CascadeLossConfig, LossMode, TrainingConfig};
