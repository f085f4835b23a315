//! PointNet++ set abstraction and the three-branch cascade classifier.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Relu};
use burn::prelude::*;

use super::blocks::ClassifierHead;
use super::model::{CascadeModel, CascadeOutput};
use super::ops::{farthest_point_indices, group_points, index_points, knn_indices};
use crate::config::PointNetCascadeConfig;
use crate::error::Result;

/// Set abstraction with k-NN grouping.
///
/// Samples anchors by farthest-point sampling, gathers each anchor's `k`
/// nearest points, applies a shared point-wise MLP and max-pools over the
/// neighbourhood. With `group_all` the whole cloud is one neighbourhood around
/// the origin. Relative neighbour coordinates are always prepended to the
/// features.
#[derive(Module, Debug)]
pub struct SetAbstraction<B: Backend> {
    layers: Vec<Conv1d<B>>,
    norms: Vec<BatchNorm<B, 1>>,
    activation: Relu,
    npoint: usize,
    k: usize,
    group_all: bool,
}

impl<B: Backend> SetAbstraction<B> {
    /// Create a k-NN abstraction producing `npoint` anchors.
    pub fn new(
        npoint: usize,
        k: usize,
        in_channel: usize,
        mlp: &[usize],
        use_bn: bool,
        device: &B::Device,
    ) -> Self {
        Self::build(npoint, k, in_channel, mlp, use_bn, false, device)
    }

    /// Create an abstraction pooling the whole cloud into one feature.
    pub fn group_all(in_channel: usize, mlp: &[usize], use_bn: bool, device: &B::Device) -> Self {
        Self::build(1, 0, in_channel, mlp, use_bn, true, device)
    }

    fn build(
        npoint: usize,
        k: usize,
        in_channel: usize,
        mlp: &[usize],
        use_bn: bool,
        group_all: bool,
        device: &B::Device,
    ) -> Self {
        let mut last = in_channel + 3;
        let mut layers = Vec::with_capacity(mlp.len());
        let mut norms = Vec::new();
        for (i, &out) in mlp.iter().enumerate() {
            layers.push(Conv1dConfig::new(last, out, 1).init(device));
            if use_bn && i + 1 < mlp.len() {
                norms.push(BatchNormConfig::new(out).init(device));
            }
            last = out;
        }
        Self {
            layers,
            norms,
            activation: Relu::new(),
            npoint,
            k,
            group_all,
        }
    }

    /// Output channel count.
    pub fn out_channels(&self) -> usize {
        self.layers.last().map(|l| l.weight.val().dims()[0]).unwrap_or(0)
    }

    /// Abstract `points` (`[B, C, N]`) located at `xyz` (`[B, N, 3]`).
    ///
    /// Returns anchor coordinates `[B, S, 3]` and features `[B, C', S]`.
    pub fn forward(&self, xyz: Tensor<B, 3>, points: Tensor<B, 3>) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let [batch, num_points, _] = xyz.dims();
        let device = xyz.device();

        let (new_xyz, grouped, samples, k) = if self.group_all {
            let grouped = Tensor::cat(vec![xyz.swap_dims(1, 2), points], 1);
            (Tensor::zeros([batch, 1, 3], &device), grouped, 1, num_points)
        } else {
            let fps_idx = farthest_point_indices(&xyz, self.npoint)?;
            let new_xyz = index_points(xyz.clone(), fps_idx);
            let idx = knn_indices(self.k, &xyz, &new_xyz)?;

            let grouped_xyz = group_points(xyz, idx.clone()) - new_xyz.clone().unsqueeze_dim(2);
            let grouped_points = group_points(points.swap_dims(1, 2), idx);
            let grouped = Tensor::cat(vec![grouped_xyz, grouped_points], 3);
            let channels = grouped.dims()[3];
            let grouped = grouped
                .permute([0, 3, 1, 2])
                .reshape([batch, channels, self.npoint * self.k]);
            (new_xyz, grouped, self.npoint, self.k)
        };

        let mut x = grouped;
        let hidden = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < hidden {
                if let Some(norm) = self.norms.get(i) {
                    x = norm.forward(x);
                }
                x = self.activation.forward(x);
            }
        }

        let channels = x.dims()[1];
        let pooled = x
            .reshape([batch, channels, samples, k])
            .max_dim(3)
            .reshape([batch, channels, samples]);
        Ok((new_xyz, pooled))
    }
}

/// Shared first abstraction, then parallel branches with growing
/// neighbourhoods, each pooled globally into its own head.
#[derive(Module, Debug)]
pub struct PointNetCascade<B: Backend> {
    sa1: SetAbstraction<B>,
    branches: Vec<SetAbstraction<B>>,
    globals: Vec<SetAbstraction<B>>,
    heads: Vec<ClassifierHead<B>>,
}

impl PointNetCascadeConfig {
    /// Initialize the classifier.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PointNetCascade<B>> {
        self.validate(self.sa1_points)?;

        let sa1 = SetAbstraction::new(self.sa1_points, self.sa1_k, 3, &[64, 128], self.use_bn, device);
        let branches = self
            .branch_k
            .iter()
            .map(|&k| SetAbstraction::new(self.sa2_points, k, 128, &[128, 256], self.use_bn, device))
            .collect();
        let globals = self
            .branch_k
            .iter()
            .map(|_| SetAbstraction::group_all(256, &[512, 512], self.use_bn, device))
            .collect();
        let heads = self
            .branch_k
            .iter()
            .map(|_| ClassifierHead::new(512, self.head_hidden, self.num_classes, self.dropout, device))
            .collect();

        Ok(PointNetCascade {
            sa1,
            branches,
            globals,
            heads,
        })
    }
}

impl<B: Backend> PointNetCascade<B> {
    /// Forward pass over `[B, N, 3]` points.
    pub fn forward(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>> {
        let (l1_xyz, l1_points) = self.sa1.forward(points.clone(), points.swap_dims(1, 2))?;

        let mut logits = Vec::with_capacity(self.heads.len());
        let mut features = Vec::with_capacity(self.heads.len());
        for ((branch, global), head) in self.branches.iter().zip(&self.globals).zip(&self.heads) {
            let (l2_xyz, l2_points) = branch.forward(l1_xyz.clone(), l1_points.clone())?;
            let (_, l3_points) = global.forward(l2_xyz, l2_points.clone())?;

            let [batch, channels, _] = l3_points.dims();
            logits.push(head.forward(l3_points.reshape([batch, channels])));
            features.push(l2_points);
        }

        Ok(CascadeOutput {
            logits,
            features,
            completion: None,
        })
    }
}

impl<B: Backend> CascadeModel<B> for PointNetCascade<B> {
    fn forward_cascade(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>> {
        self.forward(points)
    }

    fn num_heads(&self) -> usize {
        self.heads.len()
    }
}
