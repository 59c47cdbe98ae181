//! The estimator: runs the coupled train/evaluate/export loop for one model.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};
use crate::data::{load_records, Batches, Record};
use crate::evaluation::{evaluate, EvalMetrics, EvalThrottle};
use crate::models::{trainable_parameters, Model, ModelFn, ModelVariant};

use super::domain::{Checkpoint, CheckpointPolicy, CheckpointRepo, EvalSpec, TrainOutcome, TrainSpec};
use super::export::Exporter;
use super::repo_fs::RunDirectory;

const LOG_EVERY_STEPS: u64 = 100;

/// A model constructor bound to a configuration and a run directory.
pub struct Estimator {
    variant: ModelVariant,
    model_fn: ModelFn,
    config: ConfigRecord,
    run_dir: RunDirectory,
    model: Option<Box<dyn Model>>,
}

impl Estimator {
    pub fn new(variant: ModelVariant, config: ConfigRecord, run_dir: RunDirectory) -> Self {
        Self {
            variant,
            model_fn: variant.bind(),
            config,
            run_dir,
            model: None,
        }
    }

    /// Trainable element count of the trained model.
    pub fn trainable_parameters(&self) -> TrainResult<u64> {
        self.model
            .as_deref()
            .map(|model| trainable_parameters(model))
            .ok_or_else(|| TrainError::training("model has not been built"))
    }

    /// Train until `train.max_steps`, resuming from the latest checkpoint.
    ///
    /// A checkpoint is written every `policy` cadence. After each checkpoint an
    /// evaluation runs if `eval.throttle_secs` have passed since the previous
    /// one, and every exporter is offered the evaluated model. The loop always
    /// ends with a checkpoint, an evaluation and an export.
    pub fn train_and_evaluate(
        &mut self,
        train: &TrainSpec,
        eval: &EvalSpec,
        exporters: &mut [Box<dyn Exporter>],
        policy: CheckpointPolicy,
    ) -> TrainResult<TrainOutcome> {
        let train_records = Arc::new(load_records(&train.input)?);
        let input_dim = train_records
            .first()
            .map(|r| r.inputs.len())
            .ok_or_else(|| {
                TrainError::training(format!("no training records in {}", train.input.path.display()))
            })?;
        let eval_records = Arc::new(load_records(&eval.input)?);
        if let Some(bad) = eval_records.iter().find(|r| r.inputs.len() != input_dim) {
            return Err(TrainError::training(format!(
                "evaluation records have {} inputs, training records have {input_dim}",
                bad.inputs.len()
            )));
        }

        let mut model = (self.model_fn)(&self.config, input_dim)?;
        let mut step = 0;
        if let Some(checkpoint) = self.run_dir.latest_checkpoint()? {
            model.restore(&checkpoint.tensors)?;
            step = checkpoint.step;
            info!(step, "resumed from checkpoint");
        }

        let learning_rate = self.config.get_f64("learning_rate").unwrap_or(1e-3) as f32;
        info!(
            variant = %self.variant,
            input_dim,
            parameters = trainable_parameters(model.as_ref()),
            train_records = train_records.len(),
            eval_records = eval_records.len(),
            max_steps = train.max_steps,
            "starting training"
        );

        let mut batches = Batches::new(train_records, &train.input);
        let mut throttle = EvalThrottle::new(eval.throttle_secs);
        let mut last_save_step = step;
        let mut last_save_at = Instant::now();
        let mut exports = Vec::new();

        while step < train.max_steps {
            let batch = batches
                .next()
                .ok_or_else(|| TrainError::training("training input ended early"))?;
            let loss = model.train_step(&batch, learning_rate);
            if !loss.is_finite() {
                return Err(TrainError::training(format!(
                    "loss diverged at step {step}: {loss}"
                )));
            }
            step += 1;
            if step % LOG_EVERY_STEPS == 0 {
                debug!(step, loss, "training step");
            }

            if step < train.max_steps
                && policy.is_due(step - last_save_step, last_save_at.elapsed())
            {
                self.save(model.as_ref(), step, policy)?;
                last_save_step = step;
                last_save_at = Instant::now();

                let now = Instant::now();
                if throttle.is_due(now) {
                    throttle.mark(now);
                    self.evaluate_and_export(
                        model.as_ref(),
                        &eval_records,
                        eval,
                        step,
                        exporters,
                        &mut exports,
                    )?;
                }
            }
        }

        self.save(model.as_ref(), step, policy)?;
        let final_metrics = self.evaluate_and_export(
            model.as_ref(),
            &eval_records,
            eval,
            step,
            exporters,
            &mut exports,
        )?;

        self.model = Some(model);
        Ok(TrainOutcome {
            global_step: step,
            final_metrics,
            exports,
        })
    }

    fn save(&self, model: &dyn Model, step: u64, policy: CheckpointPolicy) -> TrainResult<()> {
        let checkpoint = Checkpoint {
            step,
            variant: self.variant,
            tensors: model.parameters().to_vec(),
        };
        let path = self.run_dir.put_checkpoint(&checkpoint, policy.keep_max)?;
        debug!(step, checkpoint = %path.display(), "saved checkpoint");
        Ok(())
    }

    fn evaluate_and_export(
        &self,
        model: &dyn Model,
        records: &Arc<Vec<Record>>,
        eval: &EvalSpec,
        step: u64,
        exporters: &mut [Box<dyn Exporter>],
        exports: &mut Vec<PathBuf>,
    ) -> TrainResult<EvalMetrics> {
        let batches = Batches::new(records.clone(), &eval.input);
        let metrics = evaluate(model, batches, step, eval.steps);
        info!(
            step,
            loss = metrics.loss,
            rmse = metrics.rmse,
            pearson = ?metrics.pearson,
            examples = metrics.examples,
            "evaluation"
        );
        self.run_dir.append_metrics(&metrics)?;

        let export_root = self.run_dir.export_root();
        for exporter in exporters.iter_mut() {
            if let Some(path) = exporter.export(&export_root, model, &metrics)? {
                exports.push(path);
            }
        }
        Ok(metrics)
    }
}
