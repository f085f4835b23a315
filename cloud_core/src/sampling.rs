//! Farthest-point sampling.
//!
//! Greedy selection of a well-spread subset: starting from a seed point, each
//! step picks the point whose distance to the already-selected set is largest.
//! The result is deterministic for a given input and seed index.

use crate::batch::map_batch;
use crate::error::{CloudCoreError, Result};
use crate::types::{CloudShape, Point3};

/// Marker for points already selected, so duplicates are never re-picked.
const SELECTED: f32 = f32::NEG_INFINITY;

/// Select `m` point indices by farthest-point sampling, seeded at `start`.
///
/// Ties on the farthest distance resolve to the lowest index. Indices are
/// distinct even when the cloud contains duplicate points.
///
/// # Errors
/// - [`CloudCoreError::EmptyCloud`] if `points` is empty and `m > 0`
/// - [`CloudCoreError::SampleCountExceeds`] if `m > points.len()`
/// - [`CloudCoreError::IndexOutOfRange`] if `start` is not a valid index
pub fn farthest_point_sample(points: &[Point3], m: usize, start: usize) -> Result<Vec<usize>> {
    let n = points.len();
    if m == 0 {
        return Ok(Vec::new());
    }
    if n == 0 {
        return Err(CloudCoreError::EmptyCloud);
    }
    if m > n {
        return Err(CloudCoreError::SampleCountExceeds {
            requested: m,
            available: n,
        });
    }
    if start >= n {
        return Err(CloudCoreError::IndexOutOfRange { index: start, len: n });
    }

    let mut selected = Vec::with_capacity(m);
    let mut min_dist = vec![f32::INFINITY; n];
    let mut current = start;
    min_dist[current] = SELECTED;
    selected.push(current);

    while selected.len() < m {
        let anchor = points[current];
        let mut best = usize::MAX;
        let mut best_dist = f32::NEG_INFINITY;

        for (i, p) in points.iter().enumerate() {
            if min_dist[i] == SELECTED {
                continue;
            }
            let d = p.distance_squared(anchor);
            if d < min_dist[i] {
                min_dist[i] = d;
            }
            // Strict comparison keeps the lowest index on ties.
            if best == usize::MAX || min_dist[i] > best_dist {
                best = i;
                best_dist = min_dist[i];
            }
        }

        min_dist[best] = SELECTED;
        selected.push(best);
        current = best;
    }

    Ok(selected)
}

/// Farthest-point sampling over every element of a flat batch.
///
/// Returns `shape.batch * m` indices local to each batch element, seeded at
/// point 0 of every element.
pub fn farthest_point_sample_batch(coords: &[f32], shape: CloudShape, m: usize) -> Result<Vec<usize>> {
    shape.validate(coords)?;
    map_batch(shape.batch, |b| {
        let points = shape.points_of(coords, b);
        farthest_point_sample(&points, m, 0)
    })
}
