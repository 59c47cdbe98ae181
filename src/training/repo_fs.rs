//! Filesystem layout of a run directory.
//!
//! ```text
//! <run>/checkpoints/ckpt-<step>.json
//! <run>/checkpoints/checkpoint        index of retained checkpoints
//! <run>/eval/metrics.jsonl
//! <run>/export/<exporter>/<epoch-secs>/saved_model.json
//! <run>/model_params.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};
use crate::common::json;
use crate::evaluation::domain::EvalMetrics;

use super::domain::{Checkpoint, CheckpointRepo};

/// File holding the fully resolved configuration of a finished run.
pub const PARAMS_FILE: &str = "model_params.json";

const CHECKPOINT_INDEX: &str = "checkpoint";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointIndex {
    latest: Option<String>,
    all: Vec<String>,
}

/// One run's directory. A run owns its directory exclusively.
#[derive(Clone, Debug)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    pub fn create(root: &Path) -> TrainResult<Self> {
        fs::create_dir_all(root).map_err(|err| TrainError::io(root, err))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn export_root(&self) -> PathBuf {
        self.root.join("export")
    }

    pub fn params_path(&self) -> PathBuf {
        self.root.join(PARAMS_FILE)
    }

    fn checkpoint_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    fn ensure_dir(&self, dir: &Path) -> TrainResult<()> {
        fs::create_dir_all(dir).map_err(|err| TrainError::io(dir, err))
    }

    fn read_index(&self) -> TrainResult<CheckpointIndex> {
        let path = self.checkpoint_dir().join(CHECKPOINT_INDEX);
        if !path.is_file() {
            return Ok(CheckpointIndex::default());
        }
        json::read(&path)
    }

    /// Append one evaluation result to `eval/metrics.jsonl`.
    pub fn append_metrics(&self, metrics: &EvalMetrics) -> TrainResult<()> {
        let dir = self.root.join("eval");
        self.ensure_dir(&dir)?;
        json::append_line(&dir.join("metrics.jsonl"), metrics)
    }

    /// Write the resolved configuration as `model_params.json`.
    pub fn persist_config(&self, config: &ConfigRecord) -> TrainResult<PathBuf> {
        let path = self.params_path();
        json::write_atomic(&path, config)?;
        Ok(path)
    }
}

impl CheckpointRepo for RunDirectory {
    fn put_checkpoint(&self, checkpoint: &Checkpoint, keep_max: Option<usize>) -> TrainResult<PathBuf> {
        let dir = self.checkpoint_dir();
        self.ensure_dir(&dir)?;

        let name = format!("ckpt-{}.json", checkpoint.step);
        let path = dir.join(&name);
        json::write_atomic(&path, checkpoint)?;

        let mut index = self.read_index()?;
        index.all.retain(|n| n != &name);
        index.all.push(name.clone());
        index.latest = Some(name);
        if let Some(keep) = keep_max.filter(|k| *k > 0) {
            while index.all.len() > keep {
                let stale = index.all.remove(0);
                let stale_path = dir.join(&stale);
                match fs::remove_file(&stale_path) {
                    Ok(()) => debug!(checkpoint = %stale, "pruned checkpoint"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(TrainError::io(stale_path, err)),
                }
            }
        }
        json::write_atomic(&dir.join(CHECKPOINT_INDEX), &index)?;
        Ok(path)
    }

    fn latest_checkpoint(&self) -> TrainResult<Option<Checkpoint>> {
        match self.read_index()?.latest {
            Some(name) => json::read(&self.checkpoint_dir().join(name)).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelVariant, Tensor};

    fn checkpoint(step: u64) -> Checkpoint {
        Checkpoint {
            step,
            variant: ModelVariant::Linear,
            tensors: vec![Tensor::zeros("output/bias", vec![1])],
        }
    }

    #[test]
    fn latest_checkpoint_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(&dir.path().join("run")).unwrap();
        assert!(run.latest_checkpoint().unwrap().is_none());

        run.put_checkpoint(&checkpoint(10), None).unwrap();
        run.put_checkpoint(&checkpoint(20), None).unwrap();
        assert_eq!(run.latest_checkpoint().unwrap(), Some(checkpoint(20)));
    }

    #[test]
    fn no_count_limit_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(dir.path()).unwrap();
        for step in 1..=4 {
            run.put_checkpoint(&checkpoint(step), None).unwrap();
        }
        let kept = fs::read_dir(dir.path().join("checkpoints"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("ckpt-")
            })
            .count();
        assert_eq!(kept, 4);
    }

    #[test]
    fn count_limit_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(dir.path()).unwrap();
        for step in 1..=4 {
            run.put_checkpoint(&checkpoint(step), Some(2)).unwrap();
        }
        let ckpts = dir.path().join("checkpoints");
        assert!(!ckpts.join("ckpt-1.json").exists());
        assert!(!ckpts.join("ckpt-2.json").exists());
        assert!(ckpts.join("ckpt-4.json").exists());
    }

    #[test]
    fn prune_tolerates_missing_files_but_reports_others() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(dir.path()).unwrap();
        let ckpts = dir.path().join("checkpoints");

        run.put_checkpoint(&checkpoint(1), None).unwrap();
        fs::remove_file(ckpts.join("ckpt-1.json")).unwrap();
        run.put_checkpoint(&checkpoint(2), Some(1)).unwrap();
        assert!(ckpts.join("ckpt-2.json").exists());

        fs::remove_file(ckpts.join("ckpt-2.json")).unwrap();
        fs::create_dir(ckpts.join("ckpt-2.json")).unwrap();
        let err = run.put_checkpoint(&checkpoint(3), Some(1)).unwrap_err();
        assert!(matches!(err, TrainError::Io { .. }));
    }

    #[test]
    fn persisted_config_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(dir.path()).unwrap();
        let mut config = ConfigRecord::new();
        config.set("features", serde_json::json!(["mutation"]));
        config.set("trainable_parameters", 12u64);

        let path = run.persist_config(&config).unwrap();
        assert_eq!(path, dir.path().join(PARAMS_FILE));
        assert_eq!(ConfigRecord::load(&path).unwrap(), config);
    }
}
