//! Feature extraction inside neighbourhoods and across anchors.

use burn::module::Module;
use burn::prelude::*;

use super::blocks::{ConvBnRelu1d, ConvBnReluRes1d};

/// Transfer convolution plus residual blocks applied to every neighbourhood,
/// followed by a max over neighbours.
#[derive(Module, Debug)]
pub struct PreExtraction<B: Backend> {
    transfer: ConvBnRelu1d<B>,
    blocks: Vec<ConvBnReluRes1d<B>>,
}

impl<B: Backend> PreExtraction<B> {
    /// Create the block mapping `in_ch` grouped channels to `out_ch`.
    pub fn new(
        in_ch: usize,
        out_ch: usize,
        blocks: usize,
        res_expansion: f64,
        bias: bool,
        device: &B::Device,
    ) -> Self {
        Self {
            transfer: ConvBnRelu1d::new(in_ch, out_ch, bias, device),
            blocks: (0..blocks)
                .map(|_| ConvBnReluRes1d::new(out_ch, res_expansion, bias, device))
                .collect(),
        }
    }

    /// `[B, S, K, D]` → `[B, D', S]`.
    pub fn forward(&self, grouped: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, samples, k, channels] = grouped.dims();
        let x = grouped
            .permute([0, 1, 3, 2])
            .reshape([batch * samples, channels, k]);

        let mut x = self.transfer.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let out_ch = x.dims()[1];
        x.max_dim(2)
            .reshape([batch, samples, out_ch])
            .swap_dims(1, 2)
    }
}

/// Residual blocks applied across anchors.
#[derive(Module, Debug)]
pub struct PosExtraction<B: Backend> {
    blocks: Vec<ConvBnReluRes1d<B>>,
}

impl<B: Backend> PosExtraction<B> {
    /// Create `blocks` residual blocks of width `channels`.
    pub fn new(channels: usize, blocks: usize, res_expansion: f64, bias: bool, device: &B::Device) -> Self {
        Self {
            blocks: (0..blocks)
                .map(|_| ConvBnReluRes1d::new(channels, res_expansion, bias, device))
                .collect(),
        }
    }

    /// `[B, D, S]` → `[B, D, S]`.
    pub fn forward(&self, mut x: Tensor<B, 3>) -> Tensor<B, 3> {
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_pre_extraction_pools_neighbours() {
        let device = Default::default();
        let block = PreExtraction::<TestBackend>::new(16, 32, 2, 1.0, false, &device);
        let out = block.forward(Tensor::ones([2, 8, 4, 16], &device));
        assert_eq!(out.dims(), [2, 32, 8]);
    }

    #[test]
    fn test_pos_extraction_identity_shape() {
        let device = Default::default();
        let block = PosExtraction::<TestBackend>::new(32, 2, 1.0, false, &device);
        assert_eq!(block.forward(Tensor::ones([2, 32, 8], &device)).dims(), [2, 32, 8]);

        let empty = PosExtraction::<TestBackend>::new(32, 0, 1.0, false, &device);
        let x = Tensor::<TestBackend, 3>::ones([1, 32, 3], &device);
        let y = empty.forward(x.clone());
        let diff: f32 = (y - x).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }
}
