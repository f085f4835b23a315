//! Point-wise convolution building blocks.
//!
//! All blocks operate channel-first on `[batch, channels, points]` with 1×1
//! convolutions, so they apply the same MLP to every point independently.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;

fn pointwise<B: Backend>(in_ch: usize, out_ch: usize, bias: bool, device: &B::Device) -> Conv1d<B> {
    Conv1dConfig::new(in_ch, out_ch, 1).with_bias(bias).init(device)
}

/// Batch normalization over the feature axis of a `[batch, features]` tensor.
pub(crate) fn norm_features<B: Backend>(norm: &BatchNorm<B, 1>, x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, features] = x.dims();
    norm.forward(x.reshape([batch, features, 1])).reshape([batch, features])
}

/// 1×1 convolution, batch normalization and ReLU.
#[derive(Module, Debug)]
pub struct ConvBnRelu1d<B: Backend> {
    conv: Conv1d<B>,
    norm: BatchNorm<B, 1>,
    activation: Relu,
}

impl<B: Backend> ConvBnRelu1d<B> {
    /// Create the block.
    pub fn new(in_ch: usize, out_ch: usize, bias: bool, device: &B::Device) -> Self {
        Self {
            conv: pointwise(in_ch, out_ch, bias, device),
            norm: BatchNormConfig::new(out_ch).init(device),
            activation: Relu::new(),
        }
    }

    /// `[B, in, N]` → `[B, out, N]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.activation.forward(self.norm.forward(self.conv.forward(x)))
    }
}

/// Bottleneck residual block: expand, normalize, activate, contract,
/// normalize, add the input and activate.
#[derive(Module, Debug)]
pub struct ConvBnReluRes1d<B: Backend> {
    expand: Conv1d<B>,
    expand_norm: BatchNorm<B, 1>,
    contract: Conv1d<B>,
    contract_norm: BatchNorm<B, 1>,
    activation: Relu,
}

impl<B: Backend> ConvBnReluRes1d<B> {
    /// Create the block. The hidden width is `channels * res_expansion`.
    pub fn new(channels: usize, res_expansion: f64, bias: bool, device: &B::Device) -> Self {
        let hidden = ((channels as f64 * res_expansion) as usize).max(1);
        Self {
            expand: pointwise(channels, hidden, bias, device),
            expand_norm: BatchNormConfig::new(hidden).init(device),
            contract: pointwise(hidden, channels, bias, device),
            contract_norm: BatchNormConfig::new(channels).init(device),
            activation: Relu::new(),
        }
    }

    /// `[B, C, N]` → `[B, C, N]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let h = self
            .activation
            .forward(self.expand_norm.forward(self.expand.forward(x.clone())));
        let h = self.contract_norm.forward(self.contract.forward(h));
        self.activation.forward(h + x)
    }
}

/// Two-layer point-wise MLP with a linear shortcut.
#[derive(Module, Debug)]
pub struct MlpRes<B: Backend> {
    conv_1: Conv1d<B>,
    conv_2: Conv1d<B>,
    shortcut: Conv1d<B>,
    activation: Relu,
}

impl<B: Backend> MlpRes<B> {
    /// Create the block.
    pub fn new(in_dim: usize, hidden_dim: usize, out_dim: usize, device: &B::Device) -> Self {
        Self {
            conv_1: pointwise(in_dim, hidden_dim, true, device),
            conv_2: pointwise(hidden_dim, out_dim, true, device),
            shortcut: pointwise(in_dim, out_dim, true, device),
            activation: Relu::new(),
        }
    }

    /// `[B, in, N]` → `[B, out, N]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let shortcut = self.shortcut.forward(x.clone());
        self.conv_2.forward(self.activation.forward(self.conv_1.forward(x))) + shortcut
    }
}

/// Stack of point-wise convolutions with ReLU (and optional batch norm)
/// between layers; the last layer is linear.
#[derive(Module, Debug)]
pub struct MlpConv<B: Backend> {
    layers: Vec<Conv1d<B>>,
    norms: Vec<BatchNorm<B, 1>>,
    activation: Relu,
}

impl<B: Backend> MlpConv<B> {
    /// Create the stack. `channels` lists every layer's output width.
    pub fn new(in_ch: usize, channels: &[usize], use_bn: bool, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(channels.len());
        let mut norms = Vec::new();
        let mut last = in_ch;
        for (i, &out) in channels.iter().enumerate() {
            layers.push(pointwise(last, out, true, device));
            if use_bn && i + 1 < channels.len() {
                norms.push(BatchNormConfig::new(out).init(device));
            }
            last = out;
        }
        Self {
            layers,
            norms,
            activation: Relu::new(),
        }
    }

    /// `[B, in, N]` → `[B, channels.last(), N]`.
    pub fn forward(&self, mut x: Tensor<B, 3>) -> Tensor<B, 3> {
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
        x
    }
}

/// Point-wise MLP over a `[B, C, N, K]` neighbourhood grid:
/// conv → batch norm → ReLU → conv.
#[derive(Module, Debug)]
pub struct GridMlp<B: Backend> {
    hidden: Conv1d<B>,
    norm: BatchNorm<B, 1>,
    output: Conv1d<B>,
    activation: Relu,
}

impl<B: Backend> GridMlp<B> {
    /// Create the block.
    pub fn new(in_ch: usize, hidden_ch: usize, out_ch: usize, device: &B::Device) -> Self {
        Self {
            hidden: pointwise(in_ch, hidden_ch, true, device),
            norm: BatchNormConfig::new(hidden_ch).init(device),
            output: pointwise(hidden_ch, out_ch, true, device),
            activation: Relu::new(),
        }
    }

    /// `[B, in, N, K]` → `[B, out, N, K]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, n, k] = x.dims();
        let x = x.reshape([batch, channels, n * k]);
        let x = self
            .activation
            .forward(self.norm.forward(self.hidden.forward(x)));
        let x = self.output.forward(x);
        let out_ch = x.dims()[1];
        x.reshape([batch, out_ch, n, k])
    }
}

/// Classification head over a pooled global feature:
/// Linear → BN → ReLU → Dropout → Linear → BN → ReLU → Dropout → Linear.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    fc_1: Linear<B>,
    norm_1: BatchNorm<B, 1>,
    fc_2: Linear<B>,
    norm_2: BatchNorm<B, 1>,
    output: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> ClassifierHead<B> {
    /// Create the head.
    pub fn new(
        in_dim: usize,
        hidden: [usize; 2],
        num_classes: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let [h1, h2] = hidden;
        Self {
            fc_1: LinearConfig::new(in_dim, h1).init(device),
            norm_1: BatchNormConfig::new(h1).init(device),
            fc_2: LinearConfig::new(h1, h2).init(device),
            norm_2: BatchNormConfig::new(h2).init(device),
            output: LinearConfig::new(h2, num_classes).init(device),
            dropout: DropoutConfig::new(dropout).init(),
            activation: Relu::new(),
        }
    }

    /// `[B, in_dim]` → logits `[B, num_classes]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc_1.forward(x);
        let x = self.dropout.forward(self.activation.forward(norm_features(&self.norm_1, x)));
        let x = self.fc_2.forward(x);
        let x = self.dropout.forward(self.activation.forward(norm_features(&self.norm_2, x)));
        self.output.forward(x)
    }
}
