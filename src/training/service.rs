//! Training driver: resolves, validates and names a run, then drives the
//! estimator to completion and persists the resolved configuration.
//!
//! Nothing is written to disk before the model variant, the configuration and
//! the feature request have all been accepted.

use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::common::config::{self, RunOptions};
use crate::common::error::{TrainError, TrainResult};
use crate::features;
use crate::models::ModelVariant;

use super::domain::{CheckpointPolicy, EvalSpec, RunState, RunSummary, TrainSpec};
use super::engine::Estimator;
use super::export::{Exporter, LatestExporter};
use super::identity::RunIdentity;
use super::repo_fs::RunDirectory;

/// Everything the caller decides about a run.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub model_root: PathBuf,
    pub variant: String,
    pub params_path: PathBuf,
    /// Comma-delimited feature names.
    pub features: String,
    /// Empty or absent means "use the start time".
    pub model_suffix: Option<String>,
    pub save_checkpoints_steps: u64,
    pub eval_throttle_secs: u64,
    pub max_steps: u64,
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(
        model_root: impl Into<PathBuf>,
        variant: impl Into<String>,
        params_path: impl Into<PathBuf>,
        features: impl Into<String>,
        options: RunOptions,
    ) -> Self {
        Self {
            model_root: model_root.into(),
            variant: variant.into(),
            params_path: params_path.into(),
            features: features.into(),
            model_suffix: None,
            save_checkpoints_steps: 300,
            eval_throttle_secs: 60,
            max_steps: 10_000,
            options,
        }
    }
}

struct Driver {
    state: RunState,
}

impl Driver {
    fn advance(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "run state");
        self.state = next;
    }
}

/// Run the full pipeline. On failure the run moves to `Failed` and the error
/// is returned unchanged for the caller to report.
pub fn run(request: &RunRequest) -> TrainResult<RunSummary> {
    let mut driver = Driver {
        state: RunState::Configured,
    };
    match drive(request, &mut driver) {
        Ok(summary) => Ok(summary),
        Err(err) => {
            warn!(state = %driver.state, "run aborted");
            driver.advance(RunState::Failed);
            Err(err)
        }
    }
}

fn drive(request: &RunRequest, driver: &mut Driver) -> TrainResult<RunSummary> {
    let variant = ModelVariant::from_name(&request.variant)?;
    let mut config = config::resolve(
        &request.params_path,
        &request.options.train_path,
        &request.options,
    )?;
    let features = features::validate(
        &request.features,
        &mut config,
        &request.params_path,
        variant.name(),
    )?;

    config.set(
        "features",
        Value::from(features.iter().cloned().map(Value::from).collect::<Vec<_>>()),
    );
    config.set("model_name", variant.name());
    config.set("train_steps", request.max_steps);
    config.set("save_checkpoints_steps", request.save_checkpoints_steps);
    config.set("eval_throttle_secs", request.eval_throttle_secs);

    let train = TrainSpec::from_config(&config, &features, request.max_steps)?;
    let eval = EvalSpec::from_config(&config, &features, request.eval_throttle_secs)?;
    let policy = CheckpointPolicy::from_config(&config, request.save_checkpoints_steps);

    let identity = RunIdentity::build(
        &request.model_root,
        &features,
        variant.name(),
        request.model_suffix.as_deref(),
    );
    config.set("model_dir", identity.path().to_string_lossy().into_owned());
    info!(
        run_dir = %identity.path().display(),
        variant = %variant,
        features = ?features,
        "configured run"
    );

    driver.advance(RunState::Building);
    let run_dir = RunDirectory::create(identity.path())?;
    let mut exporters: Vec<Box<dyn Exporter>> =
        vec![Box::new(LatestExporter::from_config(&config, &features))];
    let mut estimator = Estimator::new(variant, config.clone(), run_dir.clone());

    driver.advance(RunState::Running);
    let outcome = estimator
        .train_and_evaluate(&train, &eval, &mut exporters, policy)
        .map_err(TrainError::in_training)?;

    let trainable = estimator.trainable_parameters()?;
    config.set("trainable_parameters", trainable);
    let params_file = run_dir.persist_config(&config)?;
    driver.advance(RunState::Persisted);
    info!(
        path = %params_file.display(),
        trainable_parameters = trainable,
        "persisted resolved configuration"
    );

    driver.advance(RunState::Done);
    Ok(RunSummary {
        run_dir: run_dir.root().to_path_buf(),
        variant,
        features,
        global_step: outcome.global_step,
        trainable_parameters: trainable,
        final_metrics: outcome.final_metrics,
    })
}
