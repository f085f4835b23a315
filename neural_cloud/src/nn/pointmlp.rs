//! Multi-stage residual MLP classifier with one head per stage.

use burn::module::Module;
use burn::prelude::*;

use super::blocks::{ClassifierHead, ConvBnRelu1d};
use super::extraction::{PosExtraction, PreExtraction};
use super::grouper::LocalGrouper;
use super::model::{CascadeModel, CascadeOutput};
use crate::config::PointMlpConfig;
use crate::error::Result;

/// PointMLP encoder whose every stage feeds its own classifier head.
///
/// Stage `i` samples `points / prod(reducers[..=i])` anchors, groups their
/// neighbourhoods, aggregates them with residual point-wise MLPs and pools the
/// result into the stage's head. Shallow heads allow early exit at inference.
#[derive(Module, Debug)]
pub struct PointMlp<B: Backend> {
    embedding: ConvBnRelu1d<B>,
    groupers: Vec<LocalGrouper<B>>,
    pre_blocks: Vec<PreExtraction<B>>,
    pos_blocks: Vec<PosExtraction<B>>,
    heads: Vec<ClassifierHead<B>>,
}

impl PointMlpConfig {
    /// Initialize the classifier.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PointMlp<B>> {
        self.validate()?;

        let mut groupers = Vec::with_capacity(self.num_stages());
        let mut pre_blocks = Vec::with_capacity(self.num_stages());
        let mut pos_blocks = Vec::with_capacity(self.num_stages());
        let mut heads = Vec::with_capacity(self.num_stages());

        let mut last_channel = self.embed_dim;
        for (stage, (anchors, out_channel)) in self
            .stage_points()
            .into_iter()
            .zip(self.stage_channels())
            .enumerate()
        {
            let grouper = LocalGrouper::new(
                last_channel,
                anchors,
                self.k_neighbors[stage],
                self.use_xyz,
                self.normalize.clone(),
                device,
            );
            pre_blocks.push(PreExtraction::new(
                grouper.out_channels(last_channel),
                out_channel,
                self.pre_blocks[stage],
                self.res_expansion,
                self.bias,
                device,
            ));
            pos_blocks.push(PosExtraction::new(
                out_channel,
                self.pos_blocks[stage],
                self.res_expansion,
                self.bias,
                device,
            ));
            heads.push(ClassifierHead::new(
                out_channel,
                self.head_hidden,
                self.num_classes,
                self.dropout,
                device,
            ));
            groupers.push(grouper);
            last_channel = out_channel;
        }

        Ok(PointMlp {
            embedding: ConvBnRelu1d::new(3, self.embed_dim, self.bias, device),
            groupers,
            pre_blocks,
            pos_blocks,
            heads,
        })
    }
}

impl<B: Backend> PointMlp<B> {
    /// Forward pass over `[B, N, 3]` points.
    pub fn forward(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>> {
        let mut xyz = points.clone();
        let mut x = self.embedding.forward(points.swap_dims(1, 2));

        let mut features = Vec::with_capacity(self.heads.len());
        let mut logits = Vec::with_capacity(self.heads.len());
        for (((grouper, pre), pos), head) in self
            .groupers
            .iter()
            .zip(&self.pre_blocks)
            .zip(&self.pos_blocks)
            .zip(&self.heads)
        {
            let (new_xyz, grouped) = grouper.forward(xyz, x.swap_dims(1, 2))?;
            x = pos.forward(pre.forward(grouped));
            xyz = new_xyz;

            let [batch, channels, _] = x.dims();
            let pooled = x.clone().max_dim(2).reshape([batch, channels]);
            logits.push(head.forward(pooled));
            features.push(x.clone());
        }

        Ok(CascadeOutput {
            logits,
            features,
            completion: None,
        })
    }
}

impl<B: Backend> CascadeModel<B> for PointMlp<B> {
    fn forward_cascade(&self, points: Tensor<B, 3>) -> Result<CascadeOutput<B>> {
        self.forward(points)
    }

    fn num_heads(&self) -> usize {
        self.heads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeMode;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn small_config() -> PointMlpConfig {
        PointMlpConfig::new()
            .with_points(64)
            .with_num_classes(5)
            .with_embed_dim(8)
            .with_dim_expansion(vec![2, 2])
            .with_pre_blocks(vec![1, 1])
            .with_pos_blocks(vec![1, 1])
            .with_k_neighbors(vec![4, 4])
            .with_reducers(vec![2, 2])
            .with_head_hidden([16, 8])
    }

    #[test]
    fn test_pointmlp_heads_and_stage_shapes() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let points = Tensor::random([2, 64, 3], Distribution::Default, &device);

        let out = model.forward(points).unwrap();
        assert_eq!(model.num_heads(), 2);
        assert_eq!(out.logits.len(), 2);
        for logits in &out.logits {
            assert_eq!(logits.dims(), [2, 5]);
        }
        assert_eq!(out.features[0].dims(), [2, 16, 32]);
        assert_eq!(out.features[1].dims(), [2, 32, 16]);
        assert!(out.completion.is_none());
    }

    #[test]
    fn test_pointmlp_center_with_xyz() {
        let device = Default::default();
        let config = small_config()
            .with_use_xyz(true)
            .with_normalize(Some(NormalizeMode::Center));
        let model = config.init::<TestBackend>(&device).unwrap();
        let out = model
            .forward(Tensor::random([1, 64, 3], Distribution::Default, &device))
            .unwrap();
        assert_eq!(out.logits[1].dims(), [1, 5]);
    }

    #[test]
    fn test_pointmlp_invalid_config() {
        let device = Default::default();
        let config = small_config().with_reducers(vec![2]);
        assert!(config.init::<TestBackend>(&device).is_err());
    }
}
