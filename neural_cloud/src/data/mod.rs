//! Data loading and preprocessing for training.

mod batcher;
mod loader;
mod point_cloud;
mod synthetic;

pub use batcher::{PointCloudBatch, PointCloudBatcher};
pub use loader::{epoch_seed, point_cloud_loader, training_loaders, EpochLoader, LoaderOptions};
pub use point_cloud::{normalize_unit_sphere, Augmentation, PointCloudItem};
pub use synthetic::{Partition, ShapeKind, SyntheticShapes};
