//! Local neighbourhood grouping with learned affine normalization.

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;

use super::ops::{farthest_point_indices, group_points, index_points, knn_indices};
use crate::config::NormalizeMode;
use crate::error::Result;

const STD_EPS: f32 = 1e-5;

/// Samples anchors, gathers their k-NN neighbourhoods and normalizes them.
///
/// Output features per neighbour are the (normalized) neighbour feature
/// followed by the anchor's own feature, giving `2D` channels (`2D + 3` with
/// `use_xyz`).
#[derive(Module, Debug)]
pub struct LocalGrouper<B: Backend> {
    alpha: Option<Param<Tensor<B, 4>>>,
    beta: Option<Param<Tensor<B, 4>>>,
    groups: usize,
    k: usize,
    use_xyz: bool,
    normalize: Ignored<Option<NormalizeMode>>,
}

impl<B: Backend> LocalGrouper<B> {
    /// Create a grouper for `channels`-wide input features.
    pub fn new(
        channels: usize,
        groups: usize,
        k: usize,
        use_xyz: bool,
        normalize: Option<NormalizeMode>,
        device: &B::Device,
    ) -> Self {
        let affine_ch = if use_xyz { channels + 3 } else { channels };
        let (alpha, beta) = if normalize.is_some() {
            (
                Some(Param::from_tensor(Tensor::ones([1, 1, 1, affine_ch], device))),
                Some(Param::from_tensor(Tensor::zeros([1, 1, 1, affine_ch], device))),
            )
        } else {
            (None, None)
        };
        Self {
            alpha,
            beta,
            groups,
            k,
            use_xyz,
            normalize: Ignored(normalize),
        }
    }

    /// Number of anchors produced.
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Output channels for `channels`-wide input features.
    pub fn out_channels(&self, channels: usize) -> usize {
        if self.use_xyz {
            2 * channels + 3
        } else {
            2 * channels
        }
    }

    /// Group `points` (`[B, N, D]`) around anchors sampled from `xyz` (`[B, N, 3]`).
    ///
    /// Returns anchor coordinates `[B, S, 3]` and grouped features `[B, S, K, 2D(+3)]`.
    pub fn forward(&self, xyz: Tensor<B, 3>, points: Tensor<B, 3>) -> Result<(Tensor<B, 3>, Tensor<B, 4>)> {
        let fps_idx = farthest_point_indices(&xyz, self.groups)?;
        let new_xyz = index_points(xyz.clone(), fps_idx.clone());
        let new_points = index_points(points.clone(), fps_idx);

        // Neighbours come from the full pre-sampling set.
        let idx = knn_indices(self.k, &xyz, &new_xyz)?;
        let grouped_xyz = group_points(xyz, idx.clone());
        let mut grouped = group_points(points, idx);
        if self.use_xyz {
            grouped = Tensor::cat(vec![grouped, grouped_xyz], 3);
        }

        if let (Some(mode), Some(alpha), Some(beta)) = (&self.normalize.0, &self.alpha, &self.beta) {
            let mean = match mode {
                NormalizeMode::Center => grouped.clone().mean_dim(2),
                NormalizeMode::Anchor => {
                    let anchor = if self.use_xyz {
                        Tensor::cat(vec![new_points.clone(), new_xyz.clone()], 2)
                    } else {
                        new_points.clone()
                    };
                    anchor.unsqueeze_dim(2)
                }
            };
            let centered = grouped - mean;
            let std = batch_std(centered.clone());
            grouped = centered / (std + STD_EPS);
            grouped = grouped * alpha.val() + beta.val();
        }

        let [batch, samples, k, _] = grouped.dims();
        let channels = new_points.dims()[2];
        let anchor = new_points
            .reshape([batch, samples, 1, channels])
            .repeat_dim(2, k);

        Ok((new_xyz, Tensor::cat(vec![grouped, anchor], 3)))
    }
}

/// Unbiased standard deviation over all entries of each batch element → `[B, 1, 1, 1]`.
fn batch_std<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [batch, s, k, c] = x.dims();
    let count = s * k * c;
    let flat = x.reshape([batch, count]);
    let mean = flat.clone().mean_dim(1);
    let var = (flat - mean)
        .powf_scalar(2.0)
        .sum_dim(1)
        .div_scalar(count.saturating_sub(1).max(1) as f32);
    var.sqrt().reshape([batch, 1, 1, 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_grouper_shapes() {
        let device = Default::default();
        let xyz = Tensor::<TestBackend, 3>::random([2, 32, 3], Distribution::Default, &device);
        let feats = Tensor::<TestBackend, 3>::random([2, 32, 8], Distribution::Default, &device);

        let grouper = LocalGrouper::new(8, 16, 4, false, Some(NormalizeMode::Anchor), &device);
        let (new_xyz, grouped) = grouper.forward(xyz, feats).unwrap();
        assert_eq!(new_xyz.dims(), [2, 16, 3]);
        assert_eq!(grouped.dims(), [2, 16, 4, 16]);
        assert_eq!(grouper.out_channels(8), 16);
    }

    #[test]
    fn test_grouper_use_xyz_center() {
        let device = Default::default();
        let xyz = Tensor::<TestBackend, 3>::random([1, 20, 3], Distribution::Default, &device);
        let feats = Tensor::<TestBackend, 3>::random([1, 20, 4], Distribution::Default, &device);

        let grouper = LocalGrouper::new(4, 5, 3, true, Some(NormalizeMode::Center), &device);
        let (_, grouped) = grouper.forward(xyz, feats).unwrap();
        assert_eq!(grouped.dims(), [1, 5, 3, 11]);
    }

    #[test]
    fn test_anchor_normalization_zeroes_self() {
        let device = Default::default();
        let xyz = Tensor::<TestBackend, 3>::random([1, 16, 3], Distribution::Default, &device);

        let grouper = LocalGrouper::new(3, 4, 4, false, Some(NormalizeMode::Anchor), &device);
        let (_, grouped) = grouper.forward(xyz.clone(), xyz).unwrap();
        // Every anchor is its own first neighbour, so its normalized offset is zero.
        let first: Vec<f32> = grouped
            .slice([0..1, 0..4, 0..1, 0..3])
            .into_data()
            .to_vec()
            .unwrap();
        assert!(first.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_without_normalization_has_no_params() {
        let device = Default::default();
        let grouper = LocalGrouper::<TestBackend>::new(4, 2, 2, false, None, &device);
        assert_eq!(grouper.num_params(), 0);
    }

    #[test]
    fn test_k_larger_than_cloud_fails() {
        let device = Default::default();
        let xyz = Tensor::<TestBackend, 3>::zeros([1, 4, 3], &device);
        let grouper = LocalGrouper::new(3, 2, 8, false, None, &device);
        assert!(grouper.forward(xyz.clone(), xyz).is_err());
    }
}
