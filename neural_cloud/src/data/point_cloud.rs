//! Labelled point clouds and per-item preprocessing.

use cloud_core::Point3;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One labelled point cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudItem {
    /// Point positions.
    pub points: Vec<[f32; 3]>,
    /// Class index.
    pub label: usize,
}

impl PointCloudItem {
    /// Create a new item.
    pub fn new(points: Vec<[f32; 3]>, label: usize) -> Self {
        Self { points, label }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Compute the centroid.
    pub fn centroid(&self) -> Option<Point3> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Point3::splat(0.0), |acc, p| acc + Point3::from(*p));
        Some(sum / self.points.len() as f32)
    }
}

/// Center a cloud at the origin and scale it into the unit sphere.
pub fn normalize_unit_sphere(points: &mut [[f32; 3]]) {
    if points.is_empty() {
        return;
    }
    let centroid = points
        .iter()
        .fold(Point3::splat(0.0), |acc, p| acc + Point3::from(*p))
        / points.len() as f32;

    let mut radius = 0.0f32;
    for p in points.iter_mut() {
        let centered = Point3::from(*p) - centroid;
        radius = radius.max(centered.length());
        *p = centered.as_array();
    }
    if radius > 0.0 {
        for p in points.iter_mut() {
            *p = (Point3::from(*p) / radius).as_array();
        }
    }
}

/// Random training-time augmentation: anisotropic scaling, translation and
/// point order shuffling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Augmentation {
    /// Per-axis scale range.
    pub scale: (f32, f32),
    /// Per-axis translation range.
    pub translate: (f32, f32),
    /// Whether point order is shuffled.
    pub shuffle: bool,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            scale: (2.0 / 3.0, 1.5),
            translate: (-0.2, 0.2),
            shuffle: true,
        }
    }
}

impl Augmentation {
    /// Augment `points` in place.
    pub fn apply<R: Rng + ?Sized>(&self, points: &mut [[f32; 3]], rng: &mut R) {
        let scale: [f32; 3] = std::array::from_fn(|_| rng.gen_range(self.scale.0..=self.scale.1));
        let shift: [f32; 3] =
            std::array::from_fn(|_| rng.gen_range(self.translate.0..=self.translate.1));

        for p in points.iter_mut() {
            for axis in 0..3 {
                p[axis] = p[axis] * scale[axis] + shift[axis];
            }
        }
        if self.shuffle {
            points.shuffle(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normalize_unit_sphere() {
        let mut points = vec![[1.0, 1.0, 1.0], [3.0, 1.0, 1.0], [2.0, 2.0, 1.0]];
        normalize_unit_sphere(&mut points);

        let item = PointCloudItem::new(points.clone(), 0);
        let c = item.centroid().unwrap();
        assert!(c.length() < 1e-6);
        let max_r = points
            .iter()
            .map(|p| Point3::from(*p).length())
            .fold(0.0f32, f32::max);
        assert!((max_r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_degenerate() {
        let mut points = vec![[2.0, 2.0, 2.0]; 4];
        normalize_unit_sphere(&mut points);
        assert!(points.iter().all(|p| *p == [0.0, 0.0, 0.0]));

        let mut empty: Vec<[f32; 3]> = Vec::new();
        normalize_unit_sphere(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_augmentation_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let original = vec![[1.0, -1.0, 0.5]];
        let mut points = original.clone();
        Augmentation::default().apply(&mut points, &mut rng);

        for axis in 0..3 {
            let lo = (original[0][axis] * (2.0 / 3.0)).min(original[0][axis] * 1.5) - 0.2;
            let hi = (original[0][axis] * (2.0 / 3.0)).max(original[0][axis] * 1.5) + 0.2;
            assert!(points[0][axis] >= lo - 1e-6 && points[0][axis] <= hi + 1e-6);
        }
    }

    #[test]
    fn test_shuffle_preserves_points() {
        let mut rng = StdRng::seed_from_u64(11);
        let augmentation = Augmentation {
            scale: (1.0, 1.0),
            translate: (0.0, 0.0),
            shuffle: true,
        };
        let original: Vec<[f32; 3]> = (0..32).map(|i| [i as f32, 0.0, 0.0]).collect();
        let mut points = original.clone();
        augmentation.apply(&mut points, &mut rng);

        let mut sorted = points.clone();
        sorted.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(sorted, original);
    }
}
