//! Single dense output layer over the flattened features.

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};
use crate::data::domain::Batch;

use super::domain::{mse, Model, ModelVariant, Tensor};

pub struct LinearModel {
    params: Vec<Tensor>,
}

pub fn build(_config: &ConfigRecord, input_dim: usize) -> TrainResult<Box<dyn Model>> {
    if input_dim == 0 {
        return Err(TrainError::invalid("linear model needs at least one input"));
    }
    Ok(Box::new(LinearModel {
        params: vec![
            Tensor::zeros("output/kernel", vec![input_dim, 1]),
            Tensor::zeros("output/bias", vec![1]),
        ],
    }))
}

impl Model for LinearModel {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Linear
    }

    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn predict(&self, inputs: &[f32]) -> f32 {
        let kernel = &self.params[0].values;
        let bias = self.params[1].values[0];
        kernel.iter().zip(inputs).map(|(w, x)| w * x).sum::<f32>() + bias
    }

    fn train_step(&mut self, batch: &Batch, learning_rate: f32) -> f32 {
        let predictions: Vec<f32> = batch.inputs.iter().map(|x| self.predict(x)).collect();
        let loss = mse(&predictions, &batch.labels);

        let n = batch.len().max(1) as f32;
        let mut grad_kernel = vec![0.0f32; self.params[0].values.len()];
        let mut grad_bias = 0.0f32;
        for ((inputs, pred), label) in batch.inputs.iter().zip(&predictions).zip(&batch.labels) {
            let d = 2.0 * (pred - label) / n;
            for (g, x) in grad_kernel.iter_mut().zip(inputs) {
                *g += d * x;
            }
            grad_bias += d;
        }

        for (w, g) in self.params[0].values.iter_mut().zip(&grad_kernel) {
            *w -= learning_rate * g;
        }
        self.params[1].values[0] -= learning_rate * grad_bias;
        loss
    }
}
