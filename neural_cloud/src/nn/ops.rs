//! Tensor bridge to the cloud_core index kernels.
//!
//! Index selection runs on the host over `f32` coordinates; the resulting
//! indices are applied on the device with flattened `select`, so gathers stay
//! differentiable and the same indices serve coordinates and features alike.

use burn::prelude::*;
use cloud_core::{farthest_point_sample_batch, knn_batch, CloudShape, COORDS};

use crate::error::{NeuralCloudError, Result};

fn host_coords<B: Backend>(xyz: &Tensor<B, 3>) -> Result<(CloudShape, Vec<f32>)> {
    let [batch, num_points, coords] = xyz.dims();
    if coords != COORDS {
        return Err(NeuralCloudError::ShapeMismatch {
            expected: vec![batch, num_points, COORDS],
            got: vec![batch, num_points, coords],
        });
    }
    let values = xyz
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NeuralCloudError::InvalidData(format!("{:?}", e)))?;
    Ok((CloudShape::new(batch, num_points), values))
}

fn index_tensor<B: Backend, const D: usize>(
    indices: Vec<usize>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    let values: Vec<i64> = indices.into_iter().map(|i| i as i64).collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Farthest-point sample `m` anchors per batch element.
///
/// `xyz`: `[B, N, 3]` → indices `[B, m]`.
pub fn farthest_point_indices<B: Backend>(xyz: &Tensor<B, 3>, m: usize) -> Result<Tensor<B, 2, Int>> {
    let (shape, coords) = host_coords(xyz)?;
    let indices = farthest_point_sample_batch(&coords, shape, m)?;
    Ok(index_tensor(indices, [shape.batch, m], &xyz.device()))
}

/// The `k` nearest points of `xyz` for every query in `new_xyz`.
///
/// `xyz`: `[B, N, 3]`, `new_xyz`: `[B, S, 3]` → indices `[B, S, k]`.
pub fn knn_indices<B: Backend>(
    k: usize,
    xyz: &Tensor<B, 3>,
    new_xyz: &Tensor<B, 3>,
) -> Result<Tensor<B, 3, Int>> {
    let (ref_shape, reference) = host_coords(xyz)?;
    let (query_shape, queries) = host_coords(new_xyz)?;
    let indices = knn_batch(&reference, ref_shape, &queries, query_shape, k)?;
    Ok(index_tensor(
        indices,
        [query_shape.batch, query_shape.num_points, k],
        &xyz.device(),
    ))
}

/// Gather rows per batch element: `[B, N, C]` with `[B, S]` → `[B, S, C]`.
pub fn index_points<B: Backend>(points: Tensor<B, 3>, idx: Tensor<B, 2, Int>) -> Tensor<B, 3> {
    let [batch, num_points, channels] = points.dims();
    let [_, samples] = idx.dims();
    let device = points.device();

    let offsets = Tensor::<B, 1, Int>::arange(0..batch as i64, &device)
        .mul_scalar(num_points as i64)
        .reshape([batch, 1]);
    let flat = (idx + offsets).reshape([batch * samples]);

    points
        .reshape([batch * num_points, channels])
        .select(0, flat)
        .reshape([batch, samples, channels])
}

/// Gather neighbourhoods: `[B, N, C]` with `[B, S, K]` → `[B, S, K, C]`.
pub fn group_points<B: Backend>(points: Tensor<B, 3>, idx: Tensor<B, 3, Int>) -> Tensor<B, 4> {
    let [batch, samples, k] = idx.dims();
    let channels = points.dims()[2];
    index_points(points, idx.reshape([batch, samples * k])).reshape([batch, samples, k, channels])
}

/// Channel-first neighbourhood gather: `[B, C, N]` with `[B, S, K]` → `[B, C, S, K]`.
pub fn group_channels<B: Backend>(features: Tensor<B, 3>, idx: Tensor<B, 3, Int>) -> Tensor<B, 4> {
    group_points(features.swap_dims(1, 2), idx).permute([0, 3, 1, 2])
}

/// Resample every cloud of `[B, N, 3]` to `m` points by farthest-point sampling.
pub fn fps_subsample<B: Backend>(pcd: Tensor<B, 3>, m: usize) -> Result<Tensor<B, 3>> {
    let idx = farthest_point_indices(&pcd, m)?;
    Ok(index_points(pcd, idx))
}

/// Repeat every point `factor` times along the last axis: `[B, C, N]` → `[B, C, N * factor]`.
pub fn upsample_nearest<B: Backend>(x: Tensor<B, 3>, factor: usize) -> Tensor<B, 3> {
    if factor == 1 {
        return x;
    }
    let [batch, channels, num_points] = x.dims();
    x.unsqueeze_dim::<4>(3)
        .repeat_dim(3, factor)
        .reshape([batch, channels, num_points * factor])
}

/// Max-pool over the point axis keeping it: `[B, C, N]` → `[B, C, 1]`.
pub fn global_max<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    x.max_dim(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn line_cloud(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 3> {
        // Two batch elements of 5 points on the x axis; the second is mirrored.
        let mut values = Vec::new();
        for sign in [1.0f32, -1.0] {
            for i in 0..5 {
                values.extend([sign * i as f32, 0.0, 0.0]);
            }
        }
        Tensor::from_data(TensorData::new(values, [2, 5, 3]), device)
    }

    #[test]
    fn test_farthest_point_indices() {
        let device = Default::default();
        let idx = farthest_point_indices(&line_cloud(&device), 3).unwrap();
        let values = idx.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(values, vec![0, 4, 2, 0, 4, 2]);
    }

    #[test]
    fn test_index_points_per_batch() {
        let device = Default::default();
        let points = line_cloud(&device);
        let idx = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![4i64, 1, 2, 3], [2, 2]),
            &device,
        );
        let out = index_points(points, idx);
        assert_eq!(out.dims(), [2, 2, 3]);
        let xs: Vec<f32> = out.slice([0..2, 0..2, 0..1]).into_data().to_vec().unwrap();
        assert_eq!(xs, vec![4.0, 1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_knn_and_group() {
        let device = Default::default();
        let points = line_cloud(&device);
        let anchors = index_points(
            points.clone(),
            Tensor::from_data(TensorData::new(vec![2i64, 0], [2, 1]), &device),
        );
        let idx = knn_indices(3, &points, &anchors).unwrap();
        assert_eq!(idx.dims(), [2, 1, 3]);

        let grouped = group_points(points, idx);
        assert_eq!(grouped.dims(), [2, 1, 3, 3]);
        let xs: Vec<f32> = grouped.slice([0..2, 0..1, 0..3, 0..1]).into_data().to_vec().unwrap();
        assert_eq!(xs, vec![2.0, 1.0, 3.0, 0.0, -1.0, -2.0]);
    }

    #[test]
    fn test_knn_too_many_neighbours() {
        let device = Default::default();
        let points = line_cloud(&device);
        assert!(matches!(
            knn_indices(6, &points, &points),
            Err(NeuralCloudError::Geometry(_))
        ));
    }

    #[test]
    fn test_rejects_non_xyz() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 3>::zeros([1, 4, 2], &device);
        assert!(matches!(
            farthest_point_indices(&features, 2),
            Err(NeuralCloudError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_upsample_nearest_repeats() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0], [1, 1, 3]),
            &device,
        );
        let out: Vec<f32> = upsample_nearest(x, 2).into_data().to_vec().unwrap();
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_fps_subsample_shape() {
        let device = Default::default();
        let out = fps_subsample(line_cloud(&device), 2).unwrap();
        assert_eq!(out.dims(), [2, 2, 3]);
    }
}
