//! Core types for point-set index kernels.
//!
//! Point batches are flat `f32` buffers laid out as `[batch][point][xyz]`.
//! [`CloudShape`] carries the strides needed to address them.

use core::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::{CloudCoreError, Result};

/// Number of coordinates per point.
pub const COORDS: usize = 3;

/// A 3D point with named fields for clarity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Point3 {
    /// Create a new Point3.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Create a Point3 with all components set to the same value.
    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Convert to an array.
    #[inline]
    pub const fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Read the point stored at `offset` in a flat xyz buffer.
    #[inline]
    pub fn from_slice(buf: &[f32], offset: usize) -> Self {
        Self::new(buf[offset], buf[offset + 1], buf[offset + 2])
    }

    /// Dot product with another point (treating both as vectors).
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Squared length of the vector.
    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length (magnitude) of the vector.
    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Squared Euclidean distance to another point.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Component-wise minimum.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl From<[f32; 3]> for Point3 {
    #[inline]
    fn from(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

impl From<Point3> for [f32; 3] {
    #[inline]
    fn from(p: Point3) -> Self {
        p.as_array()
    }
}

impl Add for Point3 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Point3 {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f32) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Div<f32> for Point3 {
    type Output = Self;

    #[inline]
    fn div(self, scalar: f32) -> Self {
        Self::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl Neg for Point3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Shape of a flat batch of point sets.
///
/// Point `p` of batch element `b` starts at `(b * num_points + p) * 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudShape {
    /// Number of point sets in the batch.
    pub batch: usize,
    /// Points per set (fixed within a batch).
    pub num_points: usize,
}

impl CloudShape {
    /// Create a new shape.
    #[inline]
    pub const fn new(batch: usize, num_points: usize) -> Self {
        Self { batch, num_points }
    }

    /// Stride between consecutive batch elements, in floats.
    #[inline]
    pub const fn batch_stride(&self) -> usize {
        self.num_points * COORDS
    }

    /// Total number of floats the buffer must hold.
    #[inline]
    pub const fn buffer_len(&self) -> usize {
        self.batch * self.batch_stride()
    }

    /// Check that a buffer matches this shape.
    pub fn validate(&self, buffer: &[f32]) -> Result<()> {
        if buffer.len() != self.buffer_len() {
            return Err(CloudCoreError::BufferLengthMismatch {
                expected: self.buffer_len(),
                got: buffer.len(),
            });
        }
        Ok(())
    }

    /// Decode batch element `b` into points.
    pub fn points_of(&self, buffer: &[f32], b: usize) -> Vec<Point3> {
        let start = b * self.batch_stride();
        buffer[start..start + self.batch_stride()]
            .chunks_exact(COORDS)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect()
    }
}

/// Anchor count after reducing `num_points` by `reducer` (floor division).
///
/// A zero reducer leaves the count unchanged.
#[inline]
pub const fn sampled_count(num_points: usize, reducer: usize) -> usize {
    if reducer == 0 {
        num_points
    } else {
        num_points / reducer
    }
}
