//! Vector attention over k-NN neighbourhoods.
//!
//! Attention weights are per channel: `softmax_k(mlp(q_i - k_j + δ_ij))`,
//! where `δ_ij` embeds the relative position of neighbour `j`. Values carry
//! the same positional embedding before aggregation.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::blocks::{GridMlp, MlpRes};
use super::ops::{group_channels, knn_indices};
use crate::error::Result;

const POS_HIDDEN: usize = 64;
const ATTN_EXPANSION: usize = 4;

fn pointwise<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> Conv1d<B> {
    Conv1dConfig::new(in_ch, out_ch, 1).init(device)
}

/// Positional and attention MLPs shared by both attention blocks.
#[derive(Module, Debug)]
pub struct NeighbourhoodAttention<B: Backend> {
    pos_mlp: GridMlp<B>,
    attn_mlp: GridMlp<B>,
    k: usize,
}

impl<B: Backend> NeighbourhoodAttention<B> {
    fn new(dim: usize, k: usize, device: &B::Device) -> Self {
        Self {
            pos_mlp: GridMlp::new(3, POS_HIDDEN, dim, device),
            attn_mlp: GridMlp::new(dim, dim * ATTN_EXPANSION, dim, device),
            k,
        }
    }

    /// `pos`: `[B, 3, N]`; `query`, `key`: `[B, dim, N]`; `value`: either
    /// per-point `[B, dim, N]` (broadcast over neighbours) or gathered.
    fn aggregate(
        &self,
        pos: Tensor<B, 3>,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
        group_value: bool,
    ) -> Result<Tensor<B, 3>> {
        let xyz = pos.clone().swap_dims(1, 2);
        let idx = knn_indices(self.k, &xyz, &xyz)?;

        let qk_rel = query.unsqueeze_dim::<4>(3) - group_channels(key, idx.clone());
        let pos_rel = pos.clone().unsqueeze_dim::<4>(3) - group_channels(pos, idx.clone());
        let pos_embedding = self.pos_mlp.forward(pos_rel);

        let attention = softmax(self.attn_mlp.forward(qk_rel + pos_embedding.clone()), 3);
        let value = if group_value {
            group_channels(value, idx)
        } else {
            value.unsqueeze_dim::<4>(3)
        };
        let value = value + pos_embedding;

        Ok((attention * value).sum_dim(3).squeeze(3))
    }
}

/// Residual vector-attention block over a cloud's own features.
#[derive(Module, Debug)]
pub struct PointTransformer<B: Backend> {
    linear_start: Conv1d<B>,
    conv_key: Conv1d<B>,
    conv_query: Conv1d<B>,
    conv_value: Conv1d<B>,
    neighbourhood: NeighbourhoodAttention<B>,
    linear_end: Conv1d<B>,
}

impl<B: Backend> PointTransformer<B> {
    /// Create the block for `in_channel` features, attending in `dim` channels
    /// over `k` neighbours.
    pub fn new(in_channel: usize, dim: usize, k: usize, device: &B::Device) -> Self {
        Self {
            linear_start: pointwise(in_channel, dim, device),
            conv_key: pointwise(dim, dim, device),
            conv_query: pointwise(dim, dim, device),
            conv_value: pointwise(dim, dim, device),
            neighbourhood: NeighbourhoodAttention::new(dim, k, device),
            linear_end: pointwise(dim, in_channel, device),
        }
    }

    /// `x`: `[B, C, N]`, `pos`: `[B, 3, N]` → `[B, C, N]`.
    pub fn forward(&self, x: Tensor<B, 3>, pos: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let identity = x.clone();
        let x = self.linear_start.forward(x);

        let key = self.conv_key.forward(x.clone());
        let query = self.conv_query.forward(x.clone());
        let value = self.conv_value.forward(x);

        let agg = self.neighbourhood.aggregate(pos, query, key, value, false)?;
        Ok(self.linear_end.forward(agg) + identity)
    }
}

/// Attention whose keys and queries come from two feature sources; the value
/// is derived from both and is also the residual.
#[derive(Module, Debug)]
pub struct SkipTransformer<B: Backend> {
    mlp_v: MlpRes<B>,
    conv_key: Conv1d<B>,
    conv_query: Conv1d<B>,
    conv_value: Conv1d<B>,
    neighbourhood: NeighbourhoodAttention<B>,
    conv_end: Conv1d<B>,
}

impl<B: Backend> SkipTransformer<B> {
    /// Create the block for `in_channel` features.
    pub fn new(in_channel: usize, dim: usize, k: usize, device: &B::Device) -> Self {
        Self {
            mlp_v: MlpRes::new(in_channel * 2, in_channel, in_channel, device),
            conv_key: pointwise(in_channel, dim, device),
            conv_query: pointwise(in_channel, dim, device),
            conv_value: pointwise(in_channel, dim, device),
            neighbourhood: NeighbourhoodAttention::new(dim, k, device),
            conv_end: pointwise(dim, in_channel, device),
        }
    }

    /// `pos`: `[B, 3, N]`, `key`, `query`: `[B, C, N]` → `[B, C, N]`.
    pub fn forward(&self, pos: Tensor<B, 3>, key: Tensor<B, 3>, query: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let value = self
            .mlp_v
            .forward(Tensor::cat(vec![key.clone(), query.clone()], 1));
        let identity = value.clone();

        let key = self.conv_key.forward(key);
        let query = self.conv_query.forward(query);
        let value = self.conv_value.forward(value);

        let agg = self.neighbourhood.aggregate(pos, query, key, value, true)?;
        Ok(self.conv_end.forward(agg) + identity)
    }
}
