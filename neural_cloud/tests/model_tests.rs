//! Shape contracts of the cascade architectures.

use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;

use neural_cloud::{
    config::{ModelConfig, PointMlpConfig, PointNetCascadeConfig, SnowflakeConfig},
    nn::CascadeModel,
};

type TestBackend = NdArray;

fn point_mlp(points: usize, reducers: Vec<usize>) -> PointMlpConfig {
    let stages = reducers.len();
    PointMlpConfig::new()
        .with_points(points)
        .with_num_classes(7)
        .with_embed_dim(8)
        .with_dim_expansion(vec![2; stages])
        .with_pre_blocks(vec![1; stages])
        .with_pos_blocks(vec![1; stages])
        .with_k_neighbors(vec![4; stages])
        .with_reducers(reducers)
        .with_head_hidden([16, 8])
}

#[test]
fn test_stage_counts_floor_divide() {
    let device = Default::default();
    let config = point_mlp(100, vec![2, 3, 2]);
    assert_eq!(config.stage_points(), vec![50, 16, 8]);

    let model = ModelConfig::PointMlp(config.clone())
        .init::<TestBackend>(&device)
        .unwrap();
    let out = model
        .forward_cascade(Tensor::random([2, 100, 3], Distribution::Default, &device))
        .unwrap();

    let sampled: Vec<usize> = out.features.iter().map(|f| f.dims()[2]).collect();
    assert_eq!(sampled, config.stage_points());
    let channels: Vec<usize> = out.features.iter().map(|f| f.dims()[1]).collect();
    assert_eq!(channels, config.stage_channels());
    assert_eq!(out.logits.len(), 3);
    for logits in &out.logits {
        assert_eq!(logits.dims(), [2, 7]);
    }
    assert!(out.completion.is_none());
}

#[test]
fn test_pointnet_cascade_through_model_config() {
    let device = Default::default();
    let config = ModelConfig::PointNetCascade(
        PointNetCascadeConfig::new()
            .with_num_classes(5)
            .with_sa1_points(16)
            .with_sa1_k(4)
            .with_sa2_points(8)
            .with_branch_k(vec![4, 6, 8]),
    );
    assert!(config.validate(32).is_ok());
    let model = config.init::<TestBackend>(&device).unwrap();
    let out = model
        .forward_cascade(Tensor::random([3, 32, 3], Distribution::Default, &device))
        .unwrap();
    assert_eq!(model.num_heads(), 3);
    assert_eq!(out.final_logits().unwrap().dims(), [3, 5]);
}

#[test]
fn test_decoder_counts_follow_factors() {
    let device = Default::default();
    let config = SnowflakeConfig::new()
        .with_dim_feat(32)
        .with_num_pc(16)
        .with_num_p0(16)
        .with_up_factors(vec![2, 2])
        .with_extractor_points([16, 8])
        .with_extractor_k(4)
        .with_attention_k(4)
        .with_attention_dim(8)
        .with_classifier(point_mlp(64, vec![2, 2]).with_num_classes(3));
    assert_eq!(config.stage_points(), vec![16, 32, 64]);
    assert_eq!(config.output_points(), 64);

    let model = ModelConfig::Snowflake(config)
        .init::<TestBackend>(&device)
        .unwrap();
    let out = model
        .forward_cascade(Tensor::random([1, 24, 3], Distribution::Default, &device))
        .unwrap();
    let counts: Vec<usize> = out
        .completion
        .unwrap()
        .iter()
        .map(|c| c.dims()[1])
        .collect();
    assert_eq!(counts, vec![16, 16, 32, 64]);
    assert_eq!(out.logits.len(), 2);
}

#[test]
fn test_too_few_points_rejected() {
    let config = ModelConfig::PointMlp(point_mlp(1024, vec![2, 2]));
    assert!(config.validate(512).is_err());
    assert!(config.validate(1024).is_ok());
}
