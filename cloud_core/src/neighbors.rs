//! k-nearest-neighbour grouping.
//!
//! Brute-force search by squared Euclidean distance. Neighbours come back in
//! ascending distance order; equal distances are ordered by reference index.

use core::cmp::Ordering;

use crate::batch::map_batch;
use crate::error::{CloudCoreError, Result};
use crate::types::{CloudShape, Point3};

#[inline]
fn by_distance_then_index(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// For every query, return the `k` nearest reference indices.
///
/// The output is flat: `queries.len() * k` indices, query-major. A query that
/// coincides with a reference point gets that point first.
///
/// # Errors
/// [`CloudCoreError::NeighborCountExceeds`] if `k > reference.len()`.
pub fn knn(reference: &[Point3], queries: &[Point3], k: usize) -> Result<Vec<usize>> {
    if k > reference.len() {
        return Err(CloudCoreError::NeighborCountExceeds {
            k,
            available: reference.len(),
        });
    }
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(queries.len() * k);
    let mut scratch: Vec<(f32, usize)> = Vec::with_capacity(reference.len());

    for q in queries {
        scratch.clear();
        scratch.extend(
            reference
                .iter()
                .enumerate()
                .map(|(i, p)| (p.distance_squared(*q), i)),
        );
        if k < scratch.len() {
            scratch.select_nth_unstable_by(k - 1, by_distance_then_index);
        }
        let nearest = &mut scratch[..k];
        nearest.sort_unstable_by(by_distance_then_index);
        out.extend(nearest.iter().map(|&(_, i)| i));
    }

    Ok(out)
}

/// Batched k-NN: queries of batch element `b` search the reference points of
/// the same element.
///
/// Returns `query_shape.batch * query_shape.num_points * k` local indices.
pub fn knn_batch(
    reference: &[f32],
    ref_shape: CloudShape,
    queries: &[f32],
    query_shape: CloudShape,
    k: usize,
) -> Result<Vec<usize>> {
    ref_shape.validate(reference)?;
    query_shape.validate(queries)?;
    if ref_shape.batch != query_shape.batch {
        return Err(CloudCoreError::BatchMismatch {
            reference: ref_shape.batch,
            queries: query_shape.batch,
        });
    }

    map_batch(ref_shape.batch, |b| {
        let refs = ref_shape.points_of(reference, b);
        let qs = query_shape.points_of(queries, b);
        knn(&refs, &qs, k)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_orders_by_distance() {
        let reference = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let idx = knn(&reference, &[Point3::new(0.1, 0.0, 0.0)], 3).unwrap();
        assert_eq!(idx, vec![0, 2, 3]);
    }

    #[test]
    fn test_knn_self_first() {
        let reference: Vec<Point3> = (0..10).map(|i| Point3::new(i as f32, 1.0, -1.0)).collect();
        let idx = knn(&reference, &reference, 4).unwrap();
        for (q, chunk) in idx.chunks(4).enumerate() {
            assert_eq!(chunk[0], q);
        }
    }

    #[test]
    fn test_knn_ties_by_index() {
        let reference = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let idx = knn(&reference, &[Point3::splat(0.0)], 2).unwrap();
        assert_eq!(idx, vec![0, 1]);
    }

    #[test]
    fn test_knn_k_exceeds() {
        let reference = vec![Point3::splat(0.0); 2];
        assert_eq!(
            knn(&reference, &reference, 3),
            Err(CloudCoreError::NeighborCountExceeds { k: 3, available: 2 })
        );
    }

    #[test]
    fn test_knn_batch_shapes() {
        let ref_shape = CloudShape::new(2, 6);
        let query_shape = CloudShape::new(2, 3);
        let reference: Vec<f32> = (0..ref_shape.buffer_len()).map(|i| i as f32 * 0.1).collect();
        let queries: Vec<f32> = reference[..query_shape.batch_stride()]
            .iter()
            .chain(reference[ref_shape.batch_stride()..ref_shape.batch_stride() + query_shape.batch_stride()].iter())
            .copied()
            .collect();

        let idx = knn_batch(&reference, ref_shape, &queries, query_shape, 2).unwrap();
        assert_eq!(idx.len(), 2 * 3 * 2);
        // Queries are the first three points of each element, so each finds itself.
        assert_eq!(idx[0], 0);
        assert_eq!(idx[6], 0);
        assert!(idx.iter().all(|&i| i < 6));
    }

    #[test]
    fn test_knn_batch_mismatch() {
        let err = knn_batch(&[0.0; 6], CloudShape::new(1, 2), &[0.0; 6], CloudShape::new(2, 1), 1);
        assert_eq!(
            err,
            Err(CloudCoreError::BatchMismatch {
                reference: 1,
                queries: 2
            })
        );
    }
}
