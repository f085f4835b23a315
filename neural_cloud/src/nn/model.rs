//! The model seam used by the trainer.

use burn::module::Module;
use burn::prelude::*;

use super::{PointMlp, PointNetCascade, SnowflakeNet};
use crate::config::ModelConfig;
use crate::error::{NeuralCloudError, Result};

/// Outputs of a multi-head forward pass.
#[derive(Debug, Clone)]
pub struct CascadeOutput<B: Backend> {
    /// Logits `[B, num_classes]` per head, shallowest first.
    pub logits: Vec<Tensor<B, 2>>,
    /// Feature map `[B, C_i, S_i]` feeding each head.
    pub features: Vec<Tensor<B, 3>>,
    /// Generated clouds `[B, N_i, 3]`, coarsest first, for completion models.
    pub completion: Option<Vec<Tensor<B, 3>>>,
}

impl<B: Backend> CascadeOutput<B> {
    /// Logits of the deepest head.
    pub fn final_logits(&self) -> Option<&Tensor<B, 2>> {
        self.logits.last()
    }
}

/// A network producing one set of logits per head from `[B, N, 3]` points.
pub trait CascadeModel<B: Backend> {
    /// Run the forward pass.
    fn forward_cascade(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>>;

    /// Number of classification heads.
    fn num_heads(&self) -> usize;
}

/// Whichever architecture a [`ModelConfig`] selected.
#[derive(Module, Debug)]
pub struct CascadeNet<B: Backend> {
    point_mlp: Option<PointMlp<B>>,
    pointnet: Option<PointNetCascade<B>>,
    snowflake: Option<SnowflakeNet<B>>,
}

impl ModelConfig {
    /// Build the selected architecture.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CascadeNet<B>> {
        let mut net = CascadeNet {
            point_mlp: None,
            pointnet: None,
            snowflake: None,
        };
        match self {
            ModelConfig::PointMlp(config) => net.point_mlp = Some(config.init(device)?),
            ModelConfig::PointNetCascade(config) => net.pointnet = Some(config.init(device)?),
            ModelConfig::Snowflake(config) => net.snowflake = Some(config.init(device)?),
        }
        Ok(net)
    }
}

impl<B: Backend> CascadeNet<B> {
    fn inner(&self) -> Result<&dyn CascadeModel<B>> {
        if let Some(model) = &self.point_mlp {
            Ok(model)
        } else if let Some(model) = &self.pointnet {
            Ok(model)
        } else if let Some(model) = &self.snowflake {
            Ok(model)
        } else {
            Err(NeuralCloudError::config("CascadeNet holds no architecture"))
        }
    }
}

impl<B: Backend> CascadeModel<B> for CascadeNet<B> {
    fn forward_cascade(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>> {
        self.inner()?.forward_cascade(points)
    }

    fn num_heads(&self) -> usize {
        self.inner().map(|m| m.num_heads()).unwrap_or(0)
    }
}
