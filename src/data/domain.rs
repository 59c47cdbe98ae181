//! Input pipeline definitions: what to read and how to batch it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};

/// Key holding the regression target in every record.
pub const LABEL_KEY: &str = "ic50";

/// One parsed example: the flattened feature vector and its label.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub inputs: Vec<f32>,
    pub label: f32,
}

/// A batch of records ready for a training or evaluation step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub inputs: Vec<Vec<f32>>,
    pub labels: Vec<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Min-max scaling applied to labels, taken from `ic50_min` / `ic50_max`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelScaling {
    pub min: f64,
    pub max: f64,
}

impl LabelScaling {
    pub fn from_config(config: &ConfigRecord) -> Option<Self> {
        let min = config.get_f64("ic50_min")?;
        let max = config.get_f64("ic50_max")?;
        (max > min).then_some(Self { min, max })
    }

    pub fn apply(&self, value: f64) -> f32 {
        ((value - self.min) / (self.max - self.min)) as f32
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Train,
    Eval,
}

/// Everything the input pipeline needs to produce batches.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSpec {
    pub mode: Mode,
    /// A JSON Lines file or a directory of `*.jsonl` files.
    pub path: PathBuf,
    pub features: Vec<String>,
    pub batch_size: usize,
    pub shuffle_buffer: usize,
    /// `None` parses on the calling thread.
    pub num_threads: Option<usize>,
    pub prefetch: usize,
    pub scaling: Option<LabelScaling>,
    pub seed: u64,
}

impl InputSpec {
    pub fn train(config: &ConfigRecord, features: &[String]) -> TrainResult<Self> {
        Self::from_config(Mode::Train, "train_filepath", config, features)
    }

    pub fn eval(config: &ConfigRecord, features: &[String]) -> TrainResult<Self> {
        Self::from_config(Mode::Eval, "eval_filepath", config, features)
    }

    /// Training input repeats forever and is shuffled; evaluation is one pass.
    pub fn repeat(&self) -> bool {
        self.mode == Mode::Train
    }

    fn from_config(
        mode: Mode,
        path_key: &str,
        config: &ConfigRecord,
        features: &[String],
    ) -> TrainResult<Self> {
        let path = config
            .get_str(path_key)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| TrainError::invalid(format!("missing '{path_key}'")))?;
        let batch_size = config.get_u64("batch_size").unwrap_or(64) as usize;
        if batch_size == 0 {
            return Err(TrainError::invalid("batch_size must be positive"));
        }

        Ok(Self {
            mode,
            path: PathBuf::from(path),
            features: features.to_vec(),
            batch_size,
            shuffle_buffer: config.get_u64("buffer_size").unwrap_or(20_000).max(1) as usize,
            num_threads: config
                .get_u64("number_of_threads")
                .map(|n| n as usize)
                .filter(|n| *n > 1),
            prefetch: config.get_u64("prefetch_buffer_size").unwrap_or(6).max(1) as usize,
            scaling: LabelScaling::from_config(config),
            seed: config.get_u64("seed").unwrap_or(42),
        })
    }
}
