//! Index application helpers.
//!
//! Sampling and grouping return index sets; these functions apply them to
//! coordinates so the same selection can be reused for every co-indexed array.

use crate::error::{CloudCoreError, Result};
use crate::sampling::farthest_point_sample;
use crate::types::Point3;

/// Gather `points[i]` for every index, in index order.
pub fn gather_points(points: &[Point3], indices: &[usize]) -> Result<Vec<Point3>> {
    indices
        .iter()
        .map(|&i| {
            points
                .get(i)
                .copied()
                .ok_or(CloudCoreError::IndexOutOfRange {
                    index: i,
                    len: points.len(),
                })
        })
        .collect()
}

/// Gather rows of width `width` from a flat row-major buffer.
pub fn gather_rows(values: &[f32], width: usize, indices: &[usize]) -> Result<Vec<f32>> {
    let rows = if width == 0 { 0 } else { values.len() / width };
    let mut out = Vec::with_capacity(indices.len() * width);
    for &i in indices {
        if i >= rows {
            return Err(CloudCoreError::IndexOutOfRange { index: i, len: rows });
        }
        out.extend_from_slice(&values[i * width..(i + 1) * width]);
    }
    Ok(out)
}

/// Resample a cloud to exactly `m` points with farthest-point sampling.
pub fn fps_subsample(points: &[Point3], m: usize) -> Result<Vec<Point3>> {
    let idx = farthest_point_sample(points, m, 0)?;
    gather_points(points, &idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_points() {
        let points = vec![Point3::splat(0.0), Point3::splat(1.0), Point3::splat(2.0)];
        let out = gather_points(&points, &[2, 0, 2]).unwrap();
        assert_eq!(out, vec![Point3::splat(2.0), Point3::splat(0.0), Point3::splat(2.0)]);
        assert!(gather_points(&points, &[3]).is_err());
    }

    #[test]
    fn test_gather_rows_consistent_with_points() {
        let values = vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1];
        let out = gather_rows(&values, 2, &[1, 2]).unwrap();
        assert_eq!(out, vec![1.0, 1.1, 2.0, 2.1]);
        assert_eq!(
            gather_rows(&values, 2, &[3]),
            Err(CloudCoreError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_fps_subsample_len() {
        let points: Vec<Point3> = (0..20).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect();
        let out = fps_subsample(&points, 5).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], points[0]);
        assert_eq!(out[1], points[19]);
    }
}
