//! Procedural labelled shapes for training runs without dataset files.

use std::f32::consts::{PI, TAU};

use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::point_cloud::{normalize_unit_sphere, PointCloudItem};

/// Surface families generated by [`SyntheticShapes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Sphere surface.
    Sphere,
    /// Axis-aligned cube surface.
    Cube,
    /// Open cylinder.
    Cylinder,
    /// Cone mantle.
    Cone,
    /// Torus.
    Torus,
    /// Square plane.
    Plane,
}

impl ShapeKind {
    /// All families in label order.
    pub const ALL: [ShapeKind; 6] = [
        ShapeKind::Sphere,
        ShapeKind::Cube,
        ShapeKind::Cylinder,
        ShapeKind::Cone,
        ShapeKind::Torus,
        ShapeKind::Plane,
    ];

    fn sample<R: Rng>(self, rng: &mut R, aspect: f32) -> [f32; 3] {
        match self {
            ShapeKind::Sphere => {
                let z: f32 = rng.gen_range(-1.0..=1.0);
                let theta: f32 = rng.gen_range(0.0..TAU);
                let r = (1.0 - z * z).max(0.0).sqrt();
                [r * theta.cos(), r * theta.sin(), z * aspect]
            }
            ShapeKind::Cube => {
                let face = rng.gen_range(0..6);
                let u: f32 = rng.gen_range(-1.0..=1.0);
                let v: f32 = rng.gen_range(-1.0..=1.0);
                let s = if face % 2 == 0 { 1.0 } else { -1.0 };
                match face / 2 {
                    0 => [s, u, v * aspect],
                    1 => [u, s, v * aspect],
                    _ => [u, v, s * aspect],
                }
            }
            ShapeKind::Cylinder => {
                let theta: f32 = rng.gen_range(0.0..TAU);
                let h: f32 = rng.gen_range(-1.0..=1.0);
                [theta.cos(), theta.sin(), h * aspect]
            }
            ShapeKind::Cone => {
                let theta: f32 = rng.gen_range(0.0..TAU);
                let t: f32 = rng.gen_range(0.0f32..=1.0).sqrt();
                [t * theta.cos(), t * theta.sin(), (1.0 - 2.0 * t) * aspect]
            }
            ShapeKind::Torus => {
                let u: f32 = rng.gen_range(0.0..TAU);
                let v: f32 = rng.gen_range(0.0..TAU);
                let minor = 0.3 * aspect;
                let ring = 1.0 + minor * v.cos();
                [ring * u.cos(), ring * u.sin(), minor * v.sin()]
            }
            ShapeKind::Plane => {
                let u: f32 = rng.gen_range(-1.0..=1.0);
                let v: f32 = rng.gen_range(-1.0..=1.0);
                [u, v * aspect, 0.0]
            }
        }
    }
}

/// Dataset partition; each draws from an independent seed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Training split.
    Train,
    /// Held-out split.
    Test,
}

impl Partition {
    fn salt(self) -> u64 {
        match self {
            Partition::Train => 0x5EED_7A41,
            Partition::Test => 0x7E57_0B1E,
        }
    }
}

/// Deterministic procedural dataset: item `i` is fully determined by the
/// seed, the partition and `i`.
///
/// Label `l` draws from family `l % 6`; labels sharing a family differ in
/// aspect ratio.
#[derive(Debug, Clone)]
pub struct SyntheticShapes {
    len: usize,
    num_points: usize,
    num_classes: usize,
    seed: u64,
    partition: Partition,
    jitter: f32,
}

impl SyntheticShapes {
    /// Create a dataset of `len` clouds with `num_points` points each.
    pub fn new(len: usize, num_points: usize, num_classes: usize, seed: u64, partition: Partition) -> Self {
        Self {
            len,
            num_points,
            num_classes: num_classes.max(1),
            seed,
            partition,
            jitter: 0.01,
        }
    }

    /// Set the uniform per-coordinate jitter amplitude.
    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Partition of this dataset.
    pub fn partition(&self) -> Partition {
        self.partition
    }

    fn generate(&self, index: usize) -> PointCloudItem {
        let stream = self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ self.partition.salt();
        let mut rng = StdRng::seed_from_u64(stream.wrapping_add(index as u64));

        let label = index % self.num_classes;
        let kind = ShapeKind::ALL[label % ShapeKind::ALL.len()];
        let aspect = 1.0 + 0.5 * (label / ShapeKind::ALL.len()) as f32;

        let yaw: f32 = rng.gen_range(0.0..TAU);
        let tilt: f32 = rng.gen_range(-PI / 8.0..=PI / 8.0);
        let (sy, cy) = yaw.sin_cos();
        let (st, ct) = tilt.sin_cos();

        let mut points: Vec<[f32; 3]> = (0..self.num_points)
            .map(|_| {
                let [x, y, z] = kind.sample(&mut rng, aspect);
                // Tilt about x, then yaw about z.
                let (y, z) = (y * ct - z * st, y * st + z * ct);
                let (x, y) = (x * cy - y * sy, x * sy + y * cy);
                let mut jitter = || {
                    if self.jitter > 0.0 {
                        rng.gen_range(-self.jitter..=self.jitter)
                    } else {
                        0.0
                    }
                };
                [x + jitter(), y + jitter(), z + jitter()]
            })
            .collect();
        normalize_unit_sphere(&mut points);

        PointCloudItem::new(points, label)
    }
}

impl Dataset<PointCloudItem> for SyntheticShapes {
    fn get(&self, index: usize) -> Option<PointCloudItem> {
        (index < self.len).then(|| self.generate(index))
    }

    fn len(&self) -> usize {
        self.len
    }
}
