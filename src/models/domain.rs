//! Model variants and the construction contract shared by all of them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};
use crate::data::domain::Batch;

use super::{dense, linear};

/// A named trainable parameter tensor, stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl Tensor {
    pub fn zeros(name: impl Into<String>, shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            name: name.into(),
            shape,
            values: vec![0.0; len],
        }
    }

    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> u64 {
        self.shape.iter().map(|d| *d as u64).product()
    }
}

/// A trainable regression model.
pub trait Model: Send {
    fn variant(&self) -> ModelVariant;

    /// Trainable tensors in a stable order.
    fn parameters(&self) -> &[Tensor];

    fn parameters_mut(&mut self) -> &mut [Tensor];

    fn predict(&self, inputs: &[f32]) -> f32;

    /// One SGD step on `batch`; returns the mean squared error before the update.
    fn train_step(&mut self, batch: &Batch, learning_rate: f32) -> f32;

    /// Replace every tensor with a checkpointed copy of identical name and shape.
    fn restore(&mut self, tensors: &[Tensor]) -> TrainResult<()> {
        let params = self.parameters_mut();
        if params.len() != tensors.len() {
            return Err(TrainError::training(format!(
                "checkpoint holds {} tensors, model has {}",
                tensors.len(),
                params.len()
            )));
        }
        for (param, saved) in params.iter_mut().zip(tensors) {
            if param.name != saved.name || param.shape != saved.shape {
                return Err(TrainError::training(format!(
                    "checkpoint tensor {} {:?} does not match {} {:?}",
                    saved.name, saved.shape, param.name, param.shape
                )));
            }
            param.values.clone_from(&saved.values);
        }
        Ok(())
    }
}

/// Sum of the element counts of all trainable tensors.
pub fn trainable_parameters(model: &dyn Model) -> u64 {
    model.parameters().iter().map(Tensor::element_count).sum()
}

/// Constructor bound to a variant: configuration and input width in, model out.
pub type ModelFn = fn(&ConfigRecord, usize) -> TrainResult<Box<dyn Model>>;

/// Every model variant the orchestrator can train.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    Linear,
    Dense,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Dense, ModelVariant::Linear];

    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::Linear => "linear",
            ModelVariant::Dense => "dense",
        }
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|v| v.name().to_string()).collect()
    }

    /// Exact-match lookup; unknown names list every registered variant.
    pub fn from_name(name: &str) -> TrainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| TrainError::UnknownModelVariant {
                requested: name.to_string(),
                available: Self::names(),
            })
    }

    pub fn bind(self) -> ModelFn {
        match self {
            ModelVariant::Linear => linear::build,
            ModelVariant::Dense => dense::build,
        }
    }
}

impl FromStr for ModelVariant {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mean squared error of a batch of predictions.
pub(crate) fn mse(predictions: &[f32], labels: &[f32]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let sum: f32 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y) * (p - y))
        .sum();
    sum / labels.len() as f32
}
