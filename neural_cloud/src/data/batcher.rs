//! Collation of point-cloud items into tensors.

use std::sync::{Arc, Mutex};

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::point_cloud::{Augmentation, PointCloudItem};

/// A batch of equally sized clouds.
#[derive(Debug, Clone)]
pub struct PointCloudBatch<B: Backend> {
    /// Points `[B, N, 3]`.
    pub points: Tensor<B, 3>,
    /// Class labels `[B]`.
    pub labels: Tensor<B, 1, Int>,
}

/// Stacks items into a [`PointCloudBatch`], optionally augmenting each cloud.
///
/// Clouds of differing sizes are truncated to the smallest one.
#[derive(Debug, Clone)]
pub struct PointCloudBatcher<B: Backend> {
    device: B::Device,
    augmentation: Option<Augmentation>,
    rng: Arc<Mutex<StdRng>>,
}

impl<B: Backend> PointCloudBatcher<B> {
    /// Create a batcher without augmentation.
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            augmentation: None,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(0))),
        }
    }

    /// Enable augmentation driven by a seeded generator.
    pub fn with_augmentation(mut self, augmentation: Augmentation, seed: u64) -> Self {
        self.augmentation = Some(augmentation);
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }
}

impl<B: Backend> Batcher<PointCloudItem, PointCloudBatch<B>> for PointCloudBatcher<B> {
    fn batch(&self, mut items: Vec<PointCloudItem>) -> PointCloudBatch<B> {
        let batch = items.len();
        let num_points = items.iter().map(|i| i.len()).min().unwrap_or(0);
        if items.iter().any(|i| i.len() != num_points) {
            log::warn!(
                "batch mixes cloud sizes; truncating {} clouds to {} points",
                batch,
                num_points
            );
        }

        if let Some(augmentation) = &self.augmentation {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for item in &mut items {
                augmentation.apply(&mut item.points, &mut *rng);
            }
        }

        let mut coords = Vec::<f32>::with_capacity(batch * num_points * 3);
        let mut labels = Vec::with_capacity(batch);
        for item in &items {
            coords.extend(item.points[..num_points].iter().flatten());
            labels.push(item.label as i64);
        }

        PointCloudBatch {
            points: Tensor::from_data(TensorData::new(coords, [batch, num_points, 3]), &self.device),
            labels: Tensor::from_data(TensorData::new(labels, [batch]), &self.device),
        }
    }
}
