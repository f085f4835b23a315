//! Checkpoint round trips through the trainer.

use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;

use neural_cloud::{
    config::{ModelConfig, PointMlpConfig, TrainingConfig},
    data::{
        point_cloud_loader, training_loaders, EpochLoader, LoaderOptions, Partition, PointCloudBatcher,
        SyntheticShapes,
    },
    nn::{CascadeModel, CascadeNet},
    training::{build_trainer, checkpoint_exists, find_latest_checkpoint, MemorySink},
    NeuralCloudError,
};

type TestBackend = Autodiff<NdArray>;

const POINTS: usize = 64;

fn config(output_dir: &Path) -> TrainingConfig {
    let model = PointMlpConfig::new()
        .with_points(POINTS)
        .with_num_classes(3)
        .with_embed_dim(8)
        .with_dim_expansion(vec![2, 2])
        .with_pre_blocks(vec![1, 1])
        .with_pos_blocks(vec![1, 1])
        .with_reducers(vec![2, 2])
        .with_k_neighbors(vec![4, 4])
        .with_head_hidden([16, 8])
        .with_dropout(0.0);
    TrainingConfig::new(ModelConfig::PointMlp(model))
        .with_num_points(POINTS)
        .with_num_epochs(2)
        .with_batch_size(4)
        .with_num_workers(0)
        .with_cosine_period(2)
        .with_save_freq(1)
        .with_best_after_epoch(0)
        .with_augment(false)
        .with_output_dir(output_dir.to_path_buf())
}

fn reference_logits(model: &CascadeNet<TestBackend>) -> Vec<f32> {
    let items = SyntheticShapes::new(2, POINTS, 3, 5, Partition::Test).iter().collect();
    let batch = PointCloudBatcher::<NdArray>::new(Default::default()).batch(items);
    let out = model.valid().forward_cascade(batch.points).unwrap();
    out.logits
        .into_iter()
        .flat_map(|l| l.into_data().to_vec::<f32>().unwrap())
        .collect()
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let device = Default::default();
    let loaders = || {
        (
            EpochLoader::fixed(point_cloud_loader(
                SyntheticShapes::new(8, POINTS, 3, 11, Partition::Train),
                PointCloudBatcher::<TestBackend>::new(Default::default()),
                LoaderOptions::sequential(4),
            )),
            point_cloud_loader(
                SyntheticShapes::new(6, POINTS, 3, 11, Partition::Test),
                PointCloudBatcher::<NdArray>::new(Default::default()),
                LoaderOptions::sequential(6),
            ),
        )
    };

    let full_dir = temp_dir.path().join("full");
    let mut full = build_trainer::<TestBackend>(config(&full_dir), &device).unwrap();
    let (train, valid) = loaders();
    let uninterrupted = full
        .fit(&train, &valid, &mut MemorySink::new(), &mut MemorySink::new())
        .unwrap();

    let first = full_dir.join("checkpoints").join("ckpt-epoch-001");
    assert!(checkpoint_exists(&first));
    assert!(find_latest_checkpoint(&full_dir.join("checkpoints"))
        .unwrap()
        .ends_with("ckpt-epoch-002"));

    let resumed_dir = temp_dir.path().join("resumed");
    let mut resumed = build_trainer::<TestBackend>(
        config(&resumed_dir).with_weights(Some(first)).with_seed(99),
        &device,
    )
    .unwrap();
    assert_eq!(resumed.epoch(), 1);
    assert_eq!(resumed.schedule().step(), 2);

    let (train, valid) = loaders();
    let continued = resumed
        .fit(&train, &valid, &mut MemorySink::new(), &mut MemorySink::new())
        .unwrap();

    assert_eq!(continued.start_epoch, 1);
    assert_eq!(continued.train.len(), 1);
    let expected = &uninterrupted.train[1];
    let got = &continued.train[0];
    assert_eq!(got.epoch, 2);
    assert!((got.loss - expected.loss).abs() < 1e-5, "{} vs {}", got.loss, expected.loss);
    assert_eq!(continued.eval[0].head_accuracy, uninterrupted.eval[1].head_accuracy);
    assert!((continued.eval[0].loss - uninterrupted.eval[1].loss).abs() < 1e-5);

    let a = reference_logits(full.model());
    let b = reference_logits(resumed.model());
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-5);
    }
}

#[test]
fn test_resume_matches_with_shuffle_dropout_and_augmentation() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let device = Default::default();
    let noisy = |dir: &Path| {
        let mut config = config(dir).with_augment(true).with_seed(21);
        if let ModelConfig::PointMlp(model) = &mut config.model {
            model.dropout = 0.5;
        }
        config
    };
    let loaders = |config: &TrainingConfig| {
        training_loaders::<TestBackend, _, _>(
            config,
            SyntheticShapes::new(12, POINTS, 3, 4, Partition::Train),
            SyntheticShapes::new(6, POINTS, 3, 4, Partition::Test),
            &Default::default(),
        )
    };

    let full_config = noisy(&temp_dir.path().join("full"));
    let first = full_config.checkpoint_dir().join("ckpt-epoch-001");
    let (train, valid) = loaders(&full_config);
    let mut full = build_trainer::<TestBackend>(full_config, &device).unwrap();
    let uninterrupted = full
        .fit(&train, &valid, &mut MemorySink::new(), &mut MemorySink::new())
        .unwrap();
    assert_eq!(uninterrupted.train.len(), 2);

    let resumed_config = noisy(&temp_dir.path().join("resumed")).with_weights(Some(first));
    let (train, valid) = loaders(&resumed_config);
    let mut resumed = build_trainer::<TestBackend>(resumed_config, &device).unwrap();
    let continued = resumed
        .fit(&train, &valid, &mut MemorySink::new(), &mut MemorySink::new())
        .unwrap();

    let expected = &uninterrupted.train[1];
    let got = &continued.train[0];
    assert_eq!(got.epoch, 2);
    assert!((got.loss - expected.loss).abs() < 1e-5, "{} vs {}", got.loss, expected.loss);
    for (x, y) in reference_logits(full.model()).iter().zip(&reference_logits(resumed.model())) {
        assert!((x - y).abs() < 1e-5);
    }
}

#[test]
fn test_loaded_parameters_are_exact() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let device = Default::default();
    let trainer = build_trainer::<TestBackend>(config(temp_dir.path()), &device).unwrap();
    let dir = temp_dir.path().join("manual");
    trainer.save(&dir).unwrap();

    let restored = build_trainer::<TestBackend>(
        config(temp_dir.path()).with_seed(1234).with_weights(Some(dir)),
        &device,
    )
    .unwrap();
    assert_eq!(reference_logits(trainer.model()), reference_logits(restored.model()));
}

#[test]
fn test_missing_weights_fail() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let result = build_trainer::<TestBackend>(
        config(temp_dir.path()).with_weights(Some(temp_dir.path().join("absent"))),
        &Default::default(),
    );
    assert!(matches!(result, Err(NeuralCloudError::Checkpoint { .. })));
}
