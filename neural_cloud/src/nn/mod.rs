//! Neural network modules for hierarchical point-cloud learning.
//!
//! This module provides:
//! - A tensor bridge to the cloud_core sampling and grouping kernels
//! - Point-wise convolution blocks and classifier heads
//! - Multi-head classifiers (PointMLP, PointNet++ cascade)
//! - Vector attention and the coarse-to-fine completion network

pub mod attention;
pub mod blocks;
pub mod extraction;
pub mod grouper;
pub mod model;
pub mod ops;
pub mod pointmlp;
pub mod pointnet;
pub mod snowflake;

pub use attention::{PointTransformer, SkipTransformer};
pub use blocks::{ClassifierHead, ConvBnRelu1d, ConvBnReluRes1d, MlpConv, MlpRes};
pub use extraction::{PosExtraction, PreExtraction};
pub use grouper::LocalGrouper;
pub use model::{CascadeModel, CascadeNet, CascadeOutput};
pub use pointmlp::PointMlp;
pub use pointnet::{PointNetCascade, SetAbstraction};
pub use snowflake::{
    CompletionDecoder, CompletionOutput, FeatureExtractor, PointDeconvolution, SeedGenerator,
    SnowflakeNet,
};
