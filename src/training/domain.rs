//! Domain types for a training run: specifications handed to the estimator,
//! the checkpoint policy, run states and persisted artefacts.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::config::ConfigRecord;
use crate::common::error::TrainResult;
use crate::data::domain::InputSpec;
use crate::evaluation::domain::EvalMetrics;
use crate::models::{ModelVariant, Tensor};

/// When checkpoints are written and how many are retained.
///
/// Passed by value into each training loop; nothing is process-wide.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CheckpointPolicy {
    pub save_every_steps: u64,
    /// Time-based trigger, from `save_checkpoints_secs`.
    pub save_every_secs: Option<u64>,
    /// `None` keeps every checkpoint. Read from `keep_checkpoint_max`.
    pub keep_max: Option<usize>,
}

impl CheckpointPolicy {
    /// Step cadence only, no time trigger, no count-based retention.
    pub fn every_steps(steps: u64) -> Self {
        Self {
            save_every_steps: steps.max(1),
            save_every_secs: None,
            keep_max: None,
        }
    }

    /// Step cadence plus the optional time trigger and retention limit of
    /// the configuration record. Zero disables either option.
    pub fn from_config(config: &ConfigRecord, steps: u64) -> Self {
        Self {
            save_every_secs: config.get_u64("save_checkpoints_secs").filter(|s| *s > 0),
            keep_max: config
                .get_u64("keep_checkpoint_max")
                .filter(|n| *n > 0)
                .map(|n| n as usize),
            ..Self::every_steps(steps)
        }
    }

    pub fn is_due(&self, steps_since_save: u64, since_save: Duration) -> bool {
        steps_since_save >= self.save_every_steps
            || self
                .save_every_secs
                .is_some_and(|secs| since_save >= Duration::from_secs(secs))
    }
}

/// Input and step budget of the training half of the loop.
#[derive(Clone, Debug)]
pub struct TrainSpec {
    pub input: InputSpec,
    pub max_steps: u64,
}

impl TrainSpec {
    pub fn from_config(config: &ConfigRecord, features: &[String], max_steps: u64) -> TrainResult<Self> {
        Ok(Self {
            input: InputSpec::train(config, features)?,
            max_steps,
        })
    }
}

/// Input and cadence of the evaluation half of the loop.
#[derive(Clone, Debug)]
pub struct EvalSpec {
    pub input: InputSpec,
    /// Minimum seconds between two evaluations.
    pub throttle_secs: u64,
    /// Batches per evaluation; `None` reads the whole evaluation input.
    pub steps: Option<usize>,
}

impl EvalSpec {
    pub fn from_config(config: &ConfigRecord, features: &[String], throttle_secs: u64) -> TrainResult<Self> {
        Ok(Self {
            input: InputSpec::eval(config, features)?,
            throttle_secs,
            steps: config.get_u64("eval_steps").map(|n| n as usize),
        })
    }
}

/// Lifecycle of one run. Any state may move to `Failed`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    Configured,
    Building,
    Running,
    Persisted,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Configured => "configured",
            RunState::Building => "building",
            RunState::Running => "running",
            RunState::Persisted => "persisted",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Serialized model state at a given global step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: u64,
    pub variant: ModelVariant,
    pub tensors: Vec<Tensor>,
}

/// Storage contract for checkpoints of one run.
pub trait CheckpointRepo {
    fn put_checkpoint(&self, checkpoint: &Checkpoint, keep_max: Option<usize>) -> TrainResult<PathBuf>;
    fn latest_checkpoint(&self) -> TrainResult<Option<Checkpoint>>;
}

/// What the train/evaluate loop reports back.
#[derive(Clone, Debug)]
pub struct TrainOutcome {
    pub global_step: u64,
    pub final_metrics: EvalMetrics,
    pub exports: Vec<PathBuf>,
}

/// Result of a successful run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub variant: ModelVariant,
    pub features: Vec<String>,
    pub global_step: u64,
    pub trainable_parameters: u64,
    pub final_metrics: EvalMetrics,
}
