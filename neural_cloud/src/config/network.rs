//! Neural network configuration types.

use burn::config::Config;

use crate::error::NeuralCloudError;

/// How a k-NN neighbourhood is normalized before aggregation.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Subtract the neighbourhood mean.
    Center,
    /// Subtract the sampled (anchor) point's own feature.
    Anchor,
}

/// Configuration for the multi-stage PointMLP classifier.
///
/// Every per-stage list must have the same length; that length is the number
/// of stages and of classifier heads.
#[derive(Config, Debug)]
pub struct PointMlpConfig {
    /// Number of input points.
    #[config(default = 1024)]
    pub points: usize,

    /// Number of output classes.
    #[config(default = 40)]
    pub num_classes: usize,

    /// Width of the per-point embedding before the first stage.
    #[config(default = 64)]
    pub embed_dim: usize,

    /// Channel expansion inside residual blocks.
    #[config(default = 1.0)]
    pub res_expansion: f64,

    /// Whether convolutions carry a bias.
    #[config(default = false)]
    pub bias: bool,

    /// Whether neighbour coordinates are concatenated to neighbour features.
    #[config(default = false)]
    pub use_xyz: bool,

    /// Neighbourhood normalization (`None` disables it).
    #[config(default = "Some(NormalizeMode::Anchor)")]
    pub normalize: Option<NormalizeMode>,

    /// Feature width multiplier per stage.
    #[config(default = "vec![2, 2, 2]")]
    pub dim_expansion: Vec<usize>,

    /// Residual blocks applied inside each neighbourhood, per stage.
    #[config(default = "vec![2, 2, 2]")]
    pub pre_blocks: Vec<usize>,

    /// Residual blocks applied across anchors, per stage.
    #[config(default = "vec![2, 2, 2]")]
    pub pos_blocks: Vec<usize>,

    /// Neighbourhood size per stage.
    #[config(default = "vec![8, 16, 24]")]
    pub k_neighbors: Vec<usize>,

    /// Point-count reduction factor per stage.
    #[config(default = "vec![2, 2, 2]")]
    pub reducers: Vec<usize>,

    /// Hidden widths of every classifier head.
    #[config(default = "[512, 256]")]
    pub head_hidden: [usize; 2],

    /// Dropout probability inside classifier heads.
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl PointMlpConfig {
    /// Number of stages (and classifier heads).
    pub fn num_stages(&self) -> usize {
        self.pre_blocks.len()
    }

    /// Anchor count of every stage: `points` floor-divided by the running
    /// product of reducers.
    pub fn stage_points(&self) -> Vec<usize> {
        let mut anchors = self.points;
        self.reducers
            .iter()
            .map(|&r| {
                anchors = cloud_core::sampled_count(anchors, r);
                anchors
            })
            .collect()
    }

    /// Output feature width of every stage.
    pub fn stage_channels(&self) -> Vec<usize> {
        let mut channels = self.embed_dim;
        self.dim_expansion
            .iter()
            .map(|&e| {
                channels *= e;
                channels
            })
            .collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        let stages = self.pre_blocks.len();
        if stages == 0 {
            return Err(NeuralCloudError::config("PointMLP needs at least one stage"));
        }
        if [
            self.pos_blocks.len(),
            self.k_neighbors.len(),
            self.reducers.len(),
            self.dim_expansion.len(),
        ]
        .iter()
        .any(|&len| len != stages)
        {
            return Err(NeuralCloudError::config(
                "stage count must agree for pre_blocks, pos_blocks, k_neighbors, reducers and dim_expansion",
            ));
        }
        if self.num_classes == 0 {
            return Err(NeuralCloudError::config("num_classes must be positive"));
        }
        if self.reducers.contains(&0) || self.dim_expansion.contains(&0) {
            return Err(NeuralCloudError::config("reducers and dim_expansion must be positive"));
        }

        // Stage i groups anchors of stage i from the points of stage i-1.
        let mut available = self.points;
        for (anchors, &k) in self.stage_points().into_iter().zip(&self.k_neighbors) {
            if anchors == 0 {
                return Err(NeuralCloudError::config(format!(
                    "{} points cannot be reduced by {:?}",
                    self.points, self.reducers
                )));
            }
            if k == 0 || k > available {
                return Err(NeuralCloudError::config(format!(
                    "k = {} is invalid for a stage with {} input points",
                    k, available
                )));
            }
            available = anchors;
        }
        Ok(())
    }
}

/// Configuration for the PointNet++ cascade classifier (three parallel
/// grouping branches after a shared first abstraction).
#[derive(Config, Debug)]
pub struct PointNetCascadeConfig {
    /// Number of output classes.
    #[config(default = 40)]
    pub num_classes: usize,

    /// Anchors of the shared first abstraction.
    #[config(default = 512)]
    pub sa1_points: usize,

    /// Neighbourhood of the shared first abstraction.
    #[config(default = 16)]
    pub sa1_k: usize,

    /// Anchors of every branch abstraction.
    #[config(default = 128)]
    pub sa2_points: usize,

    /// Neighbourhood size of each branch (one head per branch).
    #[config(default = "vec![16, 32, 48]")]
    pub branch_k: Vec<usize>,

    /// Whether abstraction MLPs use batch normalization.
    #[config(default = false)]
    pub use_bn: bool,

    /// Hidden widths of every classifier head.
    #[config(default = "[256, 128]")]
    pub head_hidden: [usize; 2],

    /// Dropout probability inside classifier heads.
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl PointNetCascadeConfig {
    /// Validate the configuration against an input point count.
    pub fn validate(&self, num_points: usize) -> crate::error::Result<()> {
        if self.branch_k.is_empty() {
            return Err(NeuralCloudError::config("at least one branch is required"));
        }
        if self.sa1_points > num_points || self.sa1_k > num_points {
            return Err(NeuralCloudError::config(format!(
                "first abstraction ({} anchors, k = {}) exceeds {} input points",
                self.sa1_points, self.sa1_k, num_points
            )));
        }
        if self.sa2_points > self.sa1_points || self.branch_k.iter().any(|&k| k > self.sa1_points) {
            return Err(NeuralCloudError::config(format!(
                "branch abstractions exceed the {} points of the first abstraction",
                self.sa1_points
            )));
        }
        Ok(())
    }
}

/// Configuration for the coarse-to-fine completion network with auxiliary
/// classification heads.
#[derive(Config, Debug)]
pub struct SnowflakeConfig {
    /// Width of the global feature.
    #[config(default = 512)]
    pub dim_feat: usize,

    /// Size of the generated seed cloud.
    #[config(default = 256)]
    pub num_pc: usize,

    /// Working resolution after merging seed and partial input.
    #[config(default = 512)]
    pub num_p0: usize,

    /// Displacement damping base: stage `i` divides by `radius^i`.
    #[config(default = 1.0)]
    pub radius: f64,

    /// Up-sampling factors after the initial factor-1 refinement stage.
    #[config(default = "vec![2]")]
    pub up_factors: Vec<usize>,

    /// Anchors of the two encoder abstractions.
    #[config(default = "[512, 128]")]
    pub extractor_points: [usize; 2],

    /// Neighbourhood size of the encoder abstractions.
    #[config(default = 16)]
    pub extractor_k: usize,

    /// Neighbourhood size of every attention block.
    #[config(default = 16)]
    pub attention_k: usize,

    /// Hidden width of the attention blocks.
    #[config(default = 64)]
    pub attention_dim: usize,

    /// Whether the merged, resampled seed cloud is reported as an output.
    #[config(default = false)]
    pub return_p0: bool,

    /// Deep classifier applied to the finest cloud. Its `points` field is
    /// overwritten with the finest resolution.
    #[config(default = "PointMlpConfig::new().with_k_neighbors(vec![16, 32, 48])")]
    pub classifier: PointMlpConfig,
}

impl SnowflakeConfig {
    /// Stage factors including the leading factor-1 refinement.
    pub fn stage_factors(&self) -> Vec<usize> {
        std::iter::once(1).chain(self.up_factors.iter().copied()).collect()
    }

    /// Point count after every decoder stage.
    pub fn stage_points(&self) -> Vec<usize> {
        let mut count = self.num_p0;
        self.stage_factors()
            .into_iter()
            .map(|f| {
                count *= f;
                count
            })
            .collect()
    }

    /// Resolution of the finest cloud.
    pub fn output_points(&self) -> usize {
        self.num_p0 * self.up_factors.iter().product::<usize>()
    }

    /// The deep classifier configuration with its input size resolved.
    pub fn classifier_config(&self) -> PointMlpConfig {
        self.classifier.clone().with_points(self.output_points())
    }

    /// Reject radii that would make the stage damping zero or non-finite.
    pub fn check_radius(&self) -> crate::error::Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(NeuralCloudError::InvalidRadius { radius: self.radius });
        }
        Ok(())
    }

    /// Validate the configuration against an input point count.
    pub fn validate(&self, num_points: usize) -> crate::error::Result<()> {
        self.check_radius()?;
        if self.up_factors.contains(&0) {
            return Err(NeuralCloudError::config("up-sampling factors must be positive"));
        }
        if self.num_pc + num_points < self.num_p0 {
            return Err(NeuralCloudError::config(format!(
                "seed ({}) plus input ({}) cannot be resampled to {} points",
                self.num_pc, num_points, self.num_p0
            )));
        }
        let [p1, p2] = self.extractor_points;
        if p1 > num_points || p2 > p1 || self.extractor_k > p2.max(1).min(num_points) {
            return Err(NeuralCloudError::config(format!(
                "encoder abstractions {:?} with k = {} do not fit {} input points",
                self.extractor_points, self.extractor_k, num_points
            )));
        }
        if self.attention_k > p2 || self.attention_k > self.num_p0 {
            return Err(NeuralCloudError::config(format!(
                "attention k = {} exceeds the smallest attended cloud",
                self.attention_k
            )));
        }
        self.classifier_config().validate()
    }
}

/// Architecture selection for training.
#[derive(Config, Debug)]
pub enum ModelConfig {
    /// Multi-stage PointMLP with one head per stage.
    PointMlp(PointMlpConfig),
    /// PointNet++ with parallel grouping branches.
    PointNetCascade(PointNetCascadeConfig),
    /// Coarse-to-fine completion with a deep multi-head classifier.
    Snowflake(SnowflakeConfig),
}

impl ModelConfig {
    /// Number of classes predicted by every head.
    pub fn num_classes(&self) -> usize {
        match self {
            ModelConfig::PointMlp(c) => c.num_classes,
            ModelConfig::PointNetCascade(c) => c.num_classes,
            ModelConfig::Snowflake(c) => c.classifier.num_classes,
        }
    }

    /// Validate the architecture against the input point count.
    pub fn validate(&self, num_points: usize) -> crate::error::Result<()> {
        match self {
            ModelConfig::PointMlp(c) => {
                if c.points > num_points {
                    return Err(NeuralCloudError::config(format!(
                        "PointMLP expects {} points but the data has {}",
                        c.points, num_points
                    )));
                }
                c.validate()
            }
            ModelConfig::PointNetCascade(c) => c.validate(num_points),
            ModelConfig::Snowflake(c) => c.validate(num_points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointmlp_defaults() {
        let config = PointMlpConfig::new();
        assert_eq!(config.points, 1024);
        assert_eq!(config.k_neighbors, vec![8, 16, 24]);
        assert_eq!(config.normalize, Some(NormalizeMode::Anchor));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stage_points_floor() {
        let config = PointMlpConfig::new().with_points(1000).with_reducers(vec![3, 2, 2]);
        assert_eq!(config.stage_points(), vec![333, 166, 83]);
        assert_eq!(config.stage_channels(), vec![128, 256, 512]);
    }

    #[test]
    fn test_pointmlp_stage_mismatch() {
        let config = PointMlpConfig::new().with_k_neighbors(vec![8, 16]);
        assert!(matches!(
            config.validate(),
            Err(NeuralCloudError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_pointmlp_k_too_large() {
        let config = PointMlpConfig::new()
            .with_points(16)
            .with_k_neighbors(vec![8, 8, 8]);
        // Third stage groups from the 4 anchors of stage two.
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_snowflake_stage_points() {
        let config = SnowflakeConfig::new().with_up_factors(vec![2, 4]);
        assert_eq!(config.stage_factors(), vec![1, 2, 4]);
        assert_eq!(config.stage_points(), vec![512, 1024, 4096]);
        assert_eq!(config.classifier_config().points, 4096);
    }

    #[test]
    fn test_snowflake_rejects_degenerate_radius() {
        for radius in [0.0, -1.0, f64::NAN] {
            let config = SnowflakeConfig::new().with_radius(radius);
            assert!(matches!(
                config.validate(1024),
                Err(NeuralCloudError::InvalidRadius { .. })
            ));
        }
        assert!(SnowflakeConfig::new().with_radius(0.5).check_radius().is_ok());
    }

    #[test]
    fn test_model_config_num_classes() {
        let config = ModelConfig::PointNetCascade(PointNetCascadeConfig::new().with_num_classes(10));
        assert_eq!(config.num_classes(), 10);
        assert!(config.validate(1024).is_ok());
        assert!(config.validate(256).is_err());
    }
}
