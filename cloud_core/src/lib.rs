//! # cloud_core
//!
//! Pure index kernels for hierarchical point-cloud networks.
//!
//! This crate computes the neighbourhood structure that set-abstraction layers
//! need: which points to keep at the next resolution, and which points make up
//! each kept point's local neighbourhood. Everything here returns plain index
//! arrays, so the same selection can be applied to coordinates and to any
//! co-indexed feature tensor by the numerical layer above.
//!
//! ## Features
//!
//! - **Farthest-point sampling**: deterministic greedy selection, lowest index on ties
//! - **k-nearest neighbours**: ascending distance, index-ordered ties, self first
//! - **Flat batches**: `[batch][point][xyz]` buffers described by [`CloudShape`]
//! - **Batch parallelism**: batch elements are processed on the rayon pool
//!
//! ## Feature Flags
//!
//! - `parallel` (default): process batch elements in parallel via rayon
//!
//! ## Usage
//!
//! ```
//! use cloud_core::prelude::*;
//!
//! let points: Vec<Point3> = (0..8).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect();
//! let anchors = farthest_point_sample(&points, 2, 0).unwrap();
//! assert_eq!(anchors, vec![0, 7]);
//!
//! let queries = gather_points(&points, &anchors).unwrap();
//! let groups = knn(&points, &queries, 3).unwrap();
//! assert_eq!(&groups[..3], &[0, 1, 2]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod batch;
pub mod error;
pub mod gather;
pub mod neighbors;
pub mod sampling;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{CloudCoreError, Result};
    pub use crate::gather::{fps_subsample, gather_points, gather_rows};
    pub use crate::neighbors::{knn, knn_batch};
    pub use crate::sampling::{farthest_point_sample, farthest_point_sample_batch};
    pub use crate::types::{sampled_count, CloudShape, Point3, COORDS};
}

pub use error::{CloudCoreError, Result};
pub use gather::{fps_subsample, gather_points, gather_rows};
pub use neighbors::{knn, knn_batch};
pub use sampling::{farthest_point_sample, farthest_point_sample_batch};
pub use types::{sampled_count, CloudShape, Point3, COORDS};

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_sample_then_group_uses_pre_sampling_set() {
        let points: Vec<Point3> = (0..32)
            .map(|i| {
                let t = i as f32 / 32.0 * std::f32::consts::TAU;
                Point3::new(t.cos(), t.sin(), 0.0)
            })
            .collect();

        let anchors = farthest_point_sample(&points, 8, 0).unwrap();
        let queries = gather_points(&points, &anchors).unwrap();
        let groups = knn(&points, &queries, 4).unwrap();

        assert_eq!(groups.len(), 8 * 4);
        for (s, chunk) in groups.chunks(4).enumerate() {
            assert_eq!(chunk[0], anchors[s], "anchor must be its own nearest neighbour");
            assert!(chunk.iter().all(|&i| i < points.len()));
        }
    }
}
