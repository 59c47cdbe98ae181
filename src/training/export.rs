//! Servable exports written after evaluations.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};
use crate::common::{json, time};
use crate::data::domain::LabelScaling;
use crate::evaluation::domain::EvalMetrics;
use crate::models::{Model, ModelVariant, Tensor};

pub const SAVED_MODEL_FILE: &str = "saved_model.json";

const DEFAULT_EXPORTS_TO_KEEP: usize = 5;

/// Self-contained servable artefact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub variant: ModelVariant,
    pub features: Vec<String>,
    pub label_scaling: Option<LabelScaling>,
    pub global_step: u64,
    pub metrics: EvalMetrics,
    pub tensors: Vec<Tensor>,
}

/// Offered the model after every qualifying evaluation.
pub trait Exporter {
    fn name(&self) -> &str;

    /// Returns the export directory when an artefact was written.
    fn export(
        &mut self,
        export_root: &Path,
        model: &dyn Model,
        metrics: &EvalMetrics,
    ) -> TrainResult<Option<PathBuf>>;
}

/// Exports on every evaluation and keeps the newest `exports_to_keep`.
pub struct LatestExporter {
    features: Vec<String>,
    label_scaling: Option<LabelScaling>,
    exports_to_keep: usize,
}

impl LatestExporter {
    pub fn from_config(config: &ConfigRecord, features: &[String]) -> Self {
        Self {
            features: features.to_vec(),
            label_scaling: LabelScaling::from_config(config),
            exports_to_keep: config
                .get_u64("exports_to_keep")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_EXPORTS_TO_KEEP),
        }
    }

    /// Export directories under `dir`, oldest first.
    fn existing(dir: &Path) -> TrainResult<Vec<(u64, PathBuf)>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut found: Vec<(u64, PathBuf)> = fs::read_dir(dir)
            .map_err(|err| TrainError::io(dir, err))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| {
                let stamp = path.file_name()?.to_str()?.parse::<u64>().ok()?;
                Some((stamp, path))
            })
            .collect();
        found.sort();
        Ok(found)
    }
}

impl Exporter for LatestExporter {
    fn name(&self) -> &str {
        "latest"
    }

    fn export(
        &mut self,
        export_root: &Path,
        model: &dyn Model,
        metrics: &EvalMetrics,
    ) -> TrainResult<Option<PathBuf>> {
        let dir = export_root.join(self.name());
        fs::create_dir_all(&dir).map_err(|err| TrainError::io(&dir, err))?;

        let existing = Self::existing(&dir)?;
        // Stamps are seconds; bump past the newest so same-second exports don't collide.
        let stamp = existing
            .last()
            .map_or(0, |(newest, _)| newest + 1)
            .max(time::now_secs());
        let target = dir.join(stamp.to_string());
        fs::create_dir_all(&target).map_err(|err| TrainError::io(&target, err))?;

        let saved = SavedModel {
            variant: model.variant(),
            features: self.features.clone(),
            label_scaling: self.label_scaling,
            global_step: metrics.step,
            metrics: metrics.clone(),
            tensors: model.parameters().to_vec(),
        };
        json::write_atomic(&target.join(SAVED_MODEL_FILE), &saved)?;
        info!(export = %target.display(), step = metrics.step, "exported model");

        let mut all = Self::existing(&dir)?;
        if self.exports_to_keep > 0 && all.len() > self.exports_to_keep {
            let excess = all.len() - self.exports_to_keep;
            for (_, stale) in all.drain(..excess) {
                debug!(export = %stale.display(), "removing old export");
                fs::remove_dir_all(&stale).map_err(|err| TrainError::io(&stale, err))?;
            }
        }
        Ok(Some(target))
    }
}
