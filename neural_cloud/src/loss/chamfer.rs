//! Chamfer distance between point clouds.

use burn::prelude::*;

/// Squared pairwise distances `[B, N, M]` between `a` (`[B, N, 3]`) and `b` (`[B, M, 3]`).
pub fn pairwise_sq_distances<B: Backend>(a: Tensor<B, 3>, b: Tensor<B, 3>) -> Tensor<B, 3> {
    let a_sq = a.clone().powf_scalar(2.0).sum_dim(2);
    let b_sq = b.clone().powf_scalar(2.0).sum_dim(2).swap_dims(1, 2);
    let cross = a.matmul(b.swap_dims(1, 2));
    (a_sq + b_sq - cross.mul_scalar(2.0)).clamp_min(0.0)
}

/// Symmetric L2 Chamfer distance: the mean squared distance from every point
/// to its nearest neighbour in the other cloud, averaged over both directions
/// and the batch.
pub fn chamfer_distance<B: Backend>(a: Tensor<B, 3>, b: Tensor<B, 3>) -> Tensor<B, 1> {
    let dist = pairwise_sq_distances(a, b);
    let a_to_b = dist.clone().min_dim(2).mean();
    let b_to_a = dist.min_dim(1).mean();
    (a_to_b + b_to_a).div_scalar(2.0)
}

/// Sum of Chamfer distances from every generated cloud to the target.
pub fn completion_loss<B: Backend>(clouds: &[Tensor<B, 3>], target: Tensor<B, 3>) -> Tensor<B, 1> {
    let device = target.device();
    clouds
        .iter()
        .map(|cloud| chamfer_distance(cloud.clone(), target.clone()))
        .reduce(|acc, term| acc + term)
        .unwrap_or_else(|| Tensor::zeros([1], &device))
}
