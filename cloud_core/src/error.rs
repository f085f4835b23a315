//! Error types for cloud_core operations.
//!
//! A plain enum with a hand-written `Display`, so the crate carries no
//! dependencies beyond the optional thread pool.

use core::fmt;

/// Errors raised by the sampling and grouping kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudCoreError {
    /// An operation that needs at least one point received none.
    EmptyCloud,
    /// More samples were requested than points exist.
    SampleCountExceeds {
        /// Number of samples requested.
        requested: usize,
        /// Number of points available.
        available: usize,
    },
    /// More neighbours were requested than reference points exist.
    NeighborCountExceeds {
        /// Neighbours requested per query.
        k: usize,
        /// Reference points available.
        available: usize,
    },
    /// A flat buffer does not match its declared shape.
    BufferLengthMismatch {
        /// Expected length in floats.
        expected: usize,
        /// Actual length in floats.
        got: usize,
    },
    /// Reference and query buffers disagree on batch size.
    BatchMismatch {
        /// Batch size of the reference buffer.
        reference: usize,
        /// Batch size of the query buffer.
        queries: usize,
    },
    /// An index referenced a point outside the set.
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Size of the indexed set.
        len: usize,
    },
}

impl fmt::Display for CloudCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudCoreError::EmptyCloud => write!(f, "point cloud is empty"),
            CloudCoreError::SampleCountExceeds {
                requested,
                available,
            } => write!(
                f,
                "cannot sample {} points from a cloud of {}",
                requested, available
            ),
            CloudCoreError::NeighborCountExceeds { k, available } => write!(
                f,
                "cannot gather {} neighbours from {} reference points",
                k, available
            ),
            CloudCoreError::BufferLengthMismatch { expected, got } => {
                write!(f, "buffer length {} does not match shape ({} expected)", got, expected)
            }
            CloudCoreError::BatchMismatch { reference, queries } => write!(
                f,
                "reference batch of {} does not match query batch of {}",
                reference, queries
            ),
            CloudCoreError::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range for {} points", index, len)
            }
        }
    }
}

impl std::error::Error for CloudCoreError {}

/// Result type for cloud_core operations.
pub type Result<T> = core::result::Result<T, CloudCoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CloudCoreError::SampleCountExceeds {
            requested: 10,
            available: 4,
        };
        assert_eq!(format!("{}", err), "cannot sample 10 points from a cloud of 4");

        let err = CloudCoreError::NeighborCountExceeds { k: 16, available: 8 };
        assert_eq!(
            format!("{}", err),
            "cannot gather 16 neighbours from 8 reference points"
        );

        let err = CloudCoreError::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(format!("{}", err), "index 7 out of range for 3 points");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(CloudCoreError::EmptyCloud, CloudCoreError::EmptyCloud);
        assert_ne!(
            CloudCoreError::NeighborCountExceeds { k: 1, available: 0 },
            CloudCoreError::NeighborCountExceeds { k: 2, available: 0 }
        );
    }
}
