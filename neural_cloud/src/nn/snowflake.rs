//! Coarse-to-fine point generation with a deep multi-head classifier on the
//! finest cloud.
//!
//! The encoder compresses the input into one global feature. The decoder
//! generates a seed cloud from it, merges the seed with the input, resamples
//! to `num_p0` points and refines them through point deconvolution stages,
//! each splitting every point into `factor` children displaced by learned
//! offsets.

use burn::module::Module;
use burn::nn::conv::{ConvTranspose1d, ConvTranspose1dConfig};
use burn::nn::Relu;
use burn::prelude::*;

use super::attention::{PointTransformer, SkipTransformer};
use super::blocks::{MlpConv, MlpRes};
use super::model::{CascadeModel, CascadeOutput};
use super::ops::{fps_subsample, global_max, upsample_nearest};
use super::pointmlp::PointMlp;
use super::pointnet::SetAbstraction;
use crate::config::SnowflakeConfig;
use crate::error::{NeuralCloudError, Result};

/// Width of the per-point displacement features.
const DISPLACEMENT_DIM: usize = 128;

/// Two abstraction levels with self-attention, then a global abstraction.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    sa_1: SetAbstraction<B>,
    transformer_1: PointTransformer<B>,
    sa_2: SetAbstraction<B>,
    transformer_2: PointTransformer<B>,
    sa_3: SetAbstraction<B>,
}

impl<B: Backend> FeatureExtractor<B> {
    /// Create the encoder.
    pub fn new(config: &SnowflakeConfig, device: &B::Device) -> Self {
        let [p1, p2] = config.extractor_points;
        let k = config.extractor_k;
        Self {
            sa_1: SetAbstraction::new(p1, k, 3, &[64, 128], false, device),
            transformer_1: PointTransformer::new(128, config.attention_dim, config.attention_k, device),
            sa_2: SetAbstraction::new(p2, k, 128, &[128, 256], false, device),
            transformer_2: PointTransformer::new(256, config.attention_dim, config.attention_k, device),
            sa_3: SetAbstraction::group_all(256, &[512, config.dim_feat], false, device),
        }
    }

    /// `[B, N, 3]` → global feature `[B, dim_feat, 1]`.
    pub fn forward(&self, points: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let (l1_xyz, l1_points) = self.sa_1.forward(points.clone(), points.swap_dims(1, 2))?;
        let l1_points = self
            .transformer_1
            .forward(l1_points, l1_xyz.clone().swap_dims(1, 2))?;

        let (l2_xyz, l2_points) = self.sa_2.forward(l1_xyz, l1_points)?;
        let l2_points = self
            .transformer_2
            .forward(l2_points, l2_xyz.clone().swap_dims(1, 2))?;

        let (_, l3_points) = self.sa_3.forward(l2_xyz, l2_points)?;
        Ok(l3_points)
    }
}

/// Generates a coarse seed cloud from the global feature.
#[derive(Module, Debug)]
pub struct SeedGenerator<B: Backend> {
    ps: ConvTranspose1d<B>,
    mlp_1: MlpRes<B>,
    mlp_2: MlpRes<B>,
    mlp_3: MlpRes<B>,
    mlp_4: MlpConv<B>,
}

impl<B: Backend> SeedGenerator<B> {
    /// Create a generator of `num_pc` points.
    pub fn new(dim_feat: usize, num_pc: usize, device: &B::Device) -> Self {
        Self {
            ps: ConvTranspose1dConfig::new([dim_feat, DISPLACEMENT_DIM], num_pc).init(device),
            mlp_1: MlpRes::new(dim_feat + DISPLACEMENT_DIM, 128, 128, device),
            mlp_2: MlpRes::new(128, 64, 128, device),
            mlp_3: MlpRes::new(dim_feat + 128, 128, 128, device),
            mlp_4: MlpConv::new(128, &[64, 3], false, device),
        }
    }

    /// `[B, dim_feat, 1]` → seed points `[B, 3, num_pc]`.
    pub fn forward(&self, feat: Tensor<B, 3>) -> Tensor<B, 3> {
        let x1 = self.ps.forward(feat.clone());
        let n = x1.dims()[2];
        let x1 = self
            .mlp_1
            .forward(Tensor::cat(vec![x1, feat.clone().repeat_dim(2, n)], 1));
        let x2 = self.mlp_2.forward(x1);
        let x3 = self
            .mlp_3
            .forward(Tensor::cat(vec![x2, feat.repeat_dim(2, n)], 1));
        self.mlp_4.forward(x3)
    }
}

/// One point deconvolution stage: splits every point into `up_factor`
/// children displaced by `tanh(mlp(relu(K))) / radius^stage`.
#[derive(Module, Debug)]
pub struct PointDeconvolution<B: Backend> {
    mlp_1: MlpConv<B>,
    mlp_2: MlpConv<B>,
    skip_transformer: SkipTransformer<B>,
    mlp_ps: MlpConv<B>,
    ps: ConvTranspose1d<B>,
    mlp_delta_feature: MlpRes<B>,
    mlp_delta: MlpConv<B>,
    activation: Relu,
    up_factor: usize,
    damping: f64,
}

impl<B: Backend> PointDeconvolution<B> {
    /// Create stage `stage` with the given split factor.
    pub fn new(
        dim_feat: usize,
        up_factor: usize,
        stage: usize,
        radius: f64,
        attention_dim: usize,
        attention_k: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            mlp_1: MlpConv::new(3, &[64, 128], false, device),
            mlp_2: MlpConv::new(128 * 2 + dim_feat, &[256, DISPLACEMENT_DIM], false, device),
            skip_transformer: SkipTransformer::new(DISPLACEMENT_DIM, attention_dim, attention_k, device),
            mlp_ps: MlpConv::new(DISPLACEMENT_DIM, &[64, 32], false, device),
            ps: ConvTranspose1dConfig::new([32, DISPLACEMENT_DIM], up_factor)
                .with_stride(up_factor)
                .with_bias(false)
                .init(device),
            mlp_delta_feature: MlpRes::new(2 * DISPLACEMENT_DIM, 128, DISPLACEMENT_DIM, device),
            mlp_delta: MlpConv::new(DISPLACEMENT_DIM, &[64, 3], false, device),
            activation: Relu::new(),
            up_factor,
            damping: radius.powi(stage as i32),
        }
    }

    /// Refine `pcd_prev` (`[B, 3, N]`) under the global feature
    /// (`[B, dim_feat, 1]`).
    ///
    /// Returns the child cloud `[B, 3, N * up_factor]` and its displacement
    /// features `[B, 128, N * up_factor]`, which condition the next stage.
    pub fn forward(
        &self,
        pcd_prev: Tensor<B, 3>,
        feat_global: Tensor<B, 3>,
        k_prev: Option<Tensor<B, 3>>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let n_prev = pcd_prev.dims()[2];
        let feat_1 = self.mlp_1.forward(pcd_prev.clone());
        let pooled = global_max(feat_1.clone()).repeat_dim(2, n_prev);
        let feat_1 = Tensor::cat(vec![feat_1, pooled, feat_global.repeat_dim(2, n_prev)], 1);
        let query = self.mlp_2.forward(feat_1);

        let key = k_prev.unwrap_or_else(|| query.clone());
        let h = self.skip_transformer.forward(pcd_prev.clone(), key, query)?;

        let feat_child = self.ps.forward(self.mlp_ps.forward(h.clone()));
        let h_up = upsample_nearest(h, self.up_factor);
        let k_curr = self
            .mlp_delta_feature
            .forward(Tensor::cat(vec![feat_child, h_up], 1));

        let delta = self
            .mlp_delta
            .forward(self.activation.forward(k_curr.clone()))
            .tanh()
            .div_scalar(self.damping);
        let pcd_child = upsample_nearest(pcd_prev, self.up_factor) + delta;

        Ok((pcd_child, k_curr))
    }
}

/// Clouds and classifier outputs of the completion decoder.
#[derive(Debug, Clone)]
pub struct CompletionOutput<B: Backend> {
    /// Generated clouds `[B, N_i, 3]`, coarsest first.
    pub clouds: Vec<Tensor<B, 3>>,
    /// Deep classifier outputs on the finest cloud.
    pub classification: CascadeOutput<B>,
}

/// Seed generation, merge with the partial input and progressive refinement.
#[derive(Module, Debug)]
pub struct CompletionDecoder<B: Backend> {
    seed: SeedGenerator<B>,
    uppers: Vec<PointDeconvolution<B>>,
    classifier: PointMlp<B>,
    num_p0: usize,
    return_p0: bool,
}

impl<B: Backend> CompletionDecoder<B> {
    /// Create the decoder.
    pub fn new(config: &SnowflakeConfig, device: &B::Device) -> Result<Self> {
        let uppers = config
            .stage_factors()
            .into_iter()
            .enumerate()
            .map(|(stage, factor)| {
                PointDeconvolution::new(
                    config.dim_feat,
                    factor,
                    stage,
                    config.radius,
                    config.attention_dim,
                    config.attention_k,
                    device,
                )
            })
            .collect();
        Ok(Self {
            seed: SeedGenerator::new(config.dim_feat, config.num_pc, device),
            uppers,
            classifier: config.classifier_config().init(device)?,
            num_p0: config.num_p0,
            return_p0: config.return_p0,
        })
    }

    /// Decode the global feature `[B, dim_feat, 1]` guided by the partial
    /// input `[B, N, 3]`.
    pub fn forward(&self, feat: Tensor<B, 3>, partial: Tensor<B, 3>) -> Result<CompletionOutput<B>> {
        let seed = self.seed.forward(feat.clone()).swap_dims(1, 2);
        let mut clouds = vec![seed.clone()];

        let merged = fps_subsample(Tensor::cat(vec![seed, partial], 1), self.num_p0)?;
        if self.return_p0 {
            clouds.push(merged.clone());
        }

        let mut pcd = merged.swap_dims(1, 2);
        let mut k_prev = None;
        for upper in &self.uppers {
            let (child, k_curr) = upper.forward(pcd, feat.clone(), k_prev)?;
            clouds.push(child.clone().swap_dims(1, 2));
            pcd = child;
            k_prev = Some(k_curr);
        }

        let classification = self.classifier.forward(pcd.swap_dims(1, 2))?;
        Ok(CompletionOutput {
            clouds,
            classification,
        })
    }
}

/// Encoder plus completion decoder.
#[derive(Module, Debug)]
pub struct SnowflakeNet<B: Backend> {
    extractor: FeatureExtractor<B>,
    decoder: CompletionDecoder<B>,
}

impl SnowflakeConfig {
    /// Initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SnowflakeNet<B>> {
        self.check_radius()?;
        if self.up_factors.contains(&0) {
            return Err(NeuralCloudError::config("up-sampling factors must be positive"));
        }
        Ok(SnowflakeNet {
            extractor: FeatureExtractor::new(self, device),
            decoder: CompletionDecoder::new(self, device)?,
        })
    }
}

impl<B: Backend> SnowflakeNet<B> {
    /// Forward pass over `[B, N, 3]` points.
    pub fn forward(&self, points: Tensor<B, 3>) -> Result<CompletionOutput<B>> {
        let code = self.extractor.forward(points.clone())?;
        self.decoder.forward(code, points)
    }
}

impl<B: Backend> CascadeModel<B> for SnowflakeNet<B> {
    fn forward_cascade(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>> {
        let output = self.forward(points)?;
        Ok(CascadeOutput {
            completion: Some(output.clouds),
            ..output.classification
        })
    }

    fn num_heads(&self) -> usize {
        self.decoder.classifier.num_heads()
    }
}
