//! Checkpoint save/load functionality for training state.
//!
//! A checkpoint is a directory holding `metadata.json`, the model record
//! `model.mpk` and the optimizer record `optimizer.mpk`.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder};
use serde::{Deserialize, Serialize};

use super::metrics::BestMetrics;
use super::schedule::LrSchedule;
use crate::error::{NeuralCloudError, Result};

/// Current metadata format version.
pub const CHECKPOINT_VERSION: u32 = 1;

const METADATA_FILE: &str = "metadata.json";
const MODEL_FILE: &str = "model";
const OPTIMIZER_FILE: &str = "optimizer";
const EPOCH_PREFIX: &str = "ckpt-epoch-";

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Checkpoint metadata stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Checkpoint version for compatibility.
    pub version: u32,
    /// Last completed epoch.
    pub epoch: usize,
    /// Total optimizer steps.
    pub total_steps: usize,
    /// Best validation metrics so far.
    pub best_metrics: BestMetrics,
    /// Learning-rate schedule state.
    pub schedule: LrSchedule,
}

impl CheckpointMetadata {
    /// Create metadata for the current training state.
    pub fn new(epoch: usize, total_steps: usize, best_metrics: BestMetrics, schedule: LrSchedule) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            epoch,
            total_steps,
            best_metrics,
            schedule,
        }
    }
}

/// Directory name of the periodic checkpoint for `epoch`.
pub fn epoch_checkpoint_name(epoch: usize) -> String {
    format!("{}{:03}", EPOCH_PREFIX, epoch)
}

/// Directory name of the best checkpoint.
pub const BEST_CHECKPOINT: &str = "ckpt-best";

/// Save model parameters, optimizer state and metadata into `dir`.
pub fn save_checkpoint<B, M, R>(
    dir: &Path,
    model: M,
    optimizer: R,
    metadata: &CheckpointMetadata,
) -> Result<()>
where
    B: Backend,
    M: Module<B>,
    R: Record<B>,
{
    fs::create_dir_all(dir)?;

    let recorder = CheckpointRecorder::new();
    model.save_file(dir.join(MODEL_FILE), &recorder)?;
    <CheckpointRecorder as Recorder<B>>::record(&recorder, optimizer, dir.join(OPTIMIZER_FILE))?;

    fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(metadata)?)?;

    log::info!(
        "Saved checkpoint to {:?} (epoch {}, {} steps)",
        dir,
        metadata.epoch,
        metadata.total_steps
    );

    Ok(())
}

/// Load a checkpoint from `dir` into `model`.
///
/// Returns the loaded model, the optimizer record and the metadata.
pub fn load_checkpoint<B, M, R>(dir: &Path, model: M, device: &B::Device) -> Result<(M, R, CheckpointMetadata)>
where
    B: Backend,
    M: Module<B>,
    R: Record<B>,
{
    if !checkpoint_exists(dir) {
        return Err(NeuralCloudError::Checkpoint {
            message: format!("no complete checkpoint at {:?}", dir),
        });
    }

    let text = fs::read_to_string(dir.join(METADATA_FILE))?;
    let metadata: CheckpointMetadata = serde_json::from_str(&text)
        .map_err(|e| NeuralCloudError::InvalidData(format!("checkpoint metadata: {}", e)))?;
    if metadata.version != CHECKPOINT_VERSION {
        return Err(NeuralCloudError::InvalidData(format!(
            "unsupported checkpoint version {}",
            metadata.version
        )));
    }

    let recorder = CheckpointRecorder::new();
    let model = model.load_file(dir.join(MODEL_FILE), &recorder, device)?;
    let optimizer = <CheckpointRecorder as Recorder<B>>::load(&recorder, dir.join(OPTIMIZER_FILE), device)?;

    log::info!(
        "Loaded checkpoint from {:?} (epoch {}, {} steps)",
        dir,
        metadata.epoch,
        metadata.total_steps
    );

    Ok((model, optimizer, metadata))
}

/// Check if a complete checkpoint exists at the given path.
pub fn checkpoint_exists(dir: &Path) -> bool {
    dir.join(METADATA_FILE).exists()
        && dir.join(MODEL_FILE).with_extension("mpk").exists()
        && dir.join(OPTIMIZER_FILE).with_extension("mpk").exists()
}

/// Get the latest periodic checkpoint under `base_dir`.
///
/// Looks for directories named `ckpt-epoch-N`.
pub fn find_latest_checkpoint(base_dir: &Path) -> Option<PathBuf> {
    fs::read_dir(base_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && checkpoint_exists(path))
        .filter_map(|path| {
            let epoch = path
                .file_name()?
                .to_str()?
                .strip_prefix(EPOCH_PREFIX)?
                .parse::<usize>()
                .ok()?;
            Some((epoch, path))
        })
        .max_by_key(|(epoch, _)| *epoch)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};
    use tempfile::TempDir;

    type TestBackend = NdArray;
    type LinearRecord = <Linear<TestBackend> as Module<TestBackend>>::Record;

    fn metadata() -> CheckpointMetadata {
        let mut best = BestMetrics::new(2);
        best.accuracy = vec![0.5, 0.75];
        CheckpointMetadata::new(5, 500, best, LrSchedule::new(&TrainingConfig::default()))
    }

    fn touch_checkpoint(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("metadata.json"), "{}").unwrap();
        fs::write(dir.join("model.mpk"), "").unwrap();
        fs::write(dir.join("optimizer.mpk"), "").unwrap();
    }

    #[test]
    fn test_metadata_json_roundtrip() {
        let metadata = metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_untouched_best_metrics_roundtrip() {
        let metadata = CheckpointMetadata::new(
            0,
            0,
            BestMetrics::new(3),
            LrSchedule::new(&TrainingConfig::default()),
        );
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert!(parsed.best_metrics.accuracy.iter().all(|a| *a == f32::NEG_INFINITY));
    }

    #[test]
    fn test_checkpoint_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(epoch_checkpoint_name(5));
        let device = Default::default();

        let model: Linear<TestBackend> = LinearConfig::new(4, 3).init(&device);
        let optimizer_state = model.clone().into_record();
        save_checkpoint::<TestBackend, _, _>(&path, model.clone(), optimizer_state, &metadata()).unwrap();
        assert!(checkpoint_exists(&path));

        let fresh: Linear<TestBackend> = LinearConfig::new(4, 3).init(&device);
        let (loaded, _state, loaded_metadata): (_, LinearRecord, _) =
            load_checkpoint::<TestBackend, _, _>(&path, fresh, &device).unwrap();

        assert_eq!(loaded_metadata, metadata());
        let orig: Vec<f32> = model.weight.val().into_data().to_vec().unwrap();
        let back: Vec<f32> = loaded.weight.val().into_data().to_vec().unwrap();
        assert_eq!(orig, back);
    }

    #[test]
    fn test_missing_checkpoint_errors() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        let result: Result<(Linear<TestBackend>, LinearRecord, _)> =
            load_checkpoint::<TestBackend, _, _>(temp_dir.path(), model, &device);
        assert!(matches!(result, Err(NeuralCloudError::Checkpoint { .. })));
    }

    #[test]
    fn test_malformed_metadata() {
        let temp_dir = TempDir::new().unwrap();
        touch_checkpoint(temp_dir.path());
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        let result: Result<(Linear<TestBackend>, LinearRecord, _)> =
            load_checkpoint::<TestBackend, _, _>(temp_dir.path(), model, &device);
        assert!(matches!(result, Err(NeuralCloudError::InvalidData(_))));
    }

    #[test]
    fn test_find_latest_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path();

        for epoch in [5, 10, 3, 15] {
            touch_checkpoint(&base_path.join(epoch_checkpoint_name(epoch)));
        }
        touch_checkpoint(&base_path.join(BEST_CHECKPOINT));
        // Incomplete checkpoints are ignored.
        fs::create_dir_all(base_path.join(epoch_checkpoint_name(20))).unwrap();

        let latest = find_latest_checkpoint(base_path);
        assert!(latest.unwrap().ends_with("ckpt-epoch-015"));
    }

    #[test]
    fn test_find_latest_in_missing_dir() {
        assert!(find_latest_checkpoint(Path::new("/nonexistent/checkpoints")).is_none());
    }
}
