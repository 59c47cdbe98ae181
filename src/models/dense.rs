//! Fully connected network: ReLU hidden layers with inverted dropout and a
//! single linear output unit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};
use crate::data::domain::Batch;

use super::domain::{mse, Model, ModelVariant, Tensor};

const DEFAULT_HIDDEN: &[usize] = &[64];

pub struct DenseModel {
    /// Hidden layer widths, input excluded.
    widths: Vec<usize>,
    params: Vec<Tensor>,
    keep_prob: f32,
    rng: StdRng,
}

/// Per-example activations kept for the backward pass.
struct Trace {
    /// `activations[0]` is the input; `activations[l + 1]` is hidden layer `l` after dropout.
    activations: Vec<Vec<f32>>,
    /// Combined ReLU and dropout multiplier of each hidden unit.
    gates: Vec<Vec<f32>>,
    output: f32,
}

fn hidden_sizes(config: &ConfigRecord) -> TrainResult<Vec<usize>> {
    match config.get("dense_hidden_sizes") {
        None => Ok(DEFAULT_HIDDEN.to_vec()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .filter(|n| *n > 0)
                    .map(|n| n as usize)
                    .ok_or_else(|| {
                        TrainError::invalid("dense_hidden_sizes must hold positive integers")
                    })
            })
            .collect(),
        Some(_) => Err(TrainError::invalid("dense_hidden_sizes must be a list")),
    }
}

pub fn build(config: &ConfigRecord, input_dim: usize) -> TrainResult<Box<dyn Model>> {
    if input_dim == 0 {
        return Err(TrainError::invalid("dense model needs at least one input"));
    }
    let widths = hidden_sizes(config)?;
    let dropout = config.get_f64("dropout").unwrap_or(0.0);
    if !(0.0..1.0).contains(&dropout) {
        return Err(TrainError::invalid(format!(
            "dropout must be in [0, 1), got {dropout}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.get_u64("seed").unwrap_or(42));
    let mut params = Vec::with_capacity(2 * widths.len() + 2);
    let mut fan_in = input_dim;
    for (layer, width) in widths.iter().chain(std::iter::once(&1)).enumerate() {
        let prefix = if layer == widths.len() {
            "output".to_string()
        } else {
            format!("dense_{layer}")
        };
        let limit = (6.0 / (fan_in + width) as f32).sqrt();
        let mut kernel = Tensor::zeros(format!("{prefix}/kernel"), vec![fan_in, *width]);
        for w in kernel.values.iter_mut() {
            *w = rng.gen_range(-limit..limit);
        }
        params.push(kernel);
        params.push(Tensor::zeros(format!("{prefix}/bias"), vec![*width]));
        fan_in = *width;
    }

    Ok(Box::new(DenseModel {
        widths,
        params,
        keep_prob: (1.0 - dropout) as f32,
        rng,
    }))
}

impl DenseModel {
    fn kernel(&self, layer: usize) -> &Tensor {
        &self.params[2 * layer]
    }

    fn bias(&self, layer: usize) -> &Tensor {
        &self.params[2 * layer + 1]
    }

    fn affine(&self, layer: usize, input: &[f32]) -> Vec<f32> {
        let kernel = self.kernel(layer);
        let out = kernel.shape[1];
        let mut z = self.bias(layer).values.clone();
        for (i, x) in input.iter().enumerate() {
            let row = &kernel.values[i * out..(i + 1) * out];
            for (zj, w) in z.iter_mut().zip(row) {
                *zj += x * w;
            }
        }
        z
    }

    fn forward(&self, inputs: &[f32], rng: Option<&mut StdRng>) -> Trace {
        let mut rng = rng;
        let mut activations = vec![inputs.to_vec()];
        let mut gates = Vec::with_capacity(self.widths.len());
        for layer in 0..self.widths.len() {
            let z = self.affine(layer, &activations[layer]);
            let gate: Vec<f32> = z
                .iter()
                .map(|zj| {
                    let relu = if *zj > 0.0 { 1.0 } else { 0.0 };
                    match rng.as_deref_mut() {
                        Some(rng) => {
                            if rng.gen::<f32>() < self.keep_prob {
                                relu / self.keep_prob
                            } else {
                                0.0
                            }
                        }
                        None => relu,
                    }
                })
                .collect();
            activations.push(z.iter().zip(&gate).map(|(zj, g)| zj * g).collect());
            gates.push(gate);
        }
        let output = self.affine(self.widths.len(), &activations[self.widths.len()])[0];
        Trace {
            activations,
            gates,
            output,
        }
    }
}

impl Model for DenseModel {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Dense
    }

    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn predict(&self, inputs: &[f32]) -> f32 {
        self.forward(inputs, None).output
    }

    fn train_step(&mut self, batch: &Batch, learning_rate: f32) -> f32 {
        let mut rng = self.rng.clone();
        let traces: Vec<Trace> = batch
            .inputs
            .iter()
            .map(|x| self.forward(x, Some(&mut rng)))
            .collect();
        self.rng = rng;
        let predictions: Vec<f32> = traces.iter().map(|t| t.output).collect();
        let loss = mse(&predictions, &batch.labels);

        let n = batch.len().max(1) as f32;
        let mut grads: Vec<Vec<f32>> = self.params.iter().map(|t| vec![0.0; t.values.len()]).collect();
        let depth = self.widths.len();

        for (trace, label) in traces.iter().zip(&batch.labels) {
            // Gradient w.r.t. the pre-activation of the current layer.
            let mut delta = vec![2.0 * (trace.output - label) / n];
            for layer in (0..=depth).rev() {
                let input = &trace.activations[layer];
                let kernel = self.kernel(layer);
                let out = kernel.shape[1];
                for (i, x) in input.iter().enumerate() {
                    for (j, d) in delta.iter().enumerate() {
                        grads[2 * layer][i * out + j] += x * d;
                    }
                }
                for (g, d) in grads[2 * layer + 1].iter_mut().zip(&delta) {
                    *g += d;
                }
                if layer == 0 {
                    break;
                }
                let gate = &trace.gates[layer - 1];
                delta = (0..input.len())
                    .map(|i| {
                        let row = &kernel.values[i * out..(i + 1) * out];
                        let back: f32 = row.iter().zip(&delta).map(|(w, d)| w * d).sum();
                        back * gate[i]
                    })
                    .collect();
            }
        }

        for (param, grad) in self.params.iter_mut().zip(&grads) {
            for (w, g) in param.values.iter_mut().zip(grad) {
                *w -= learning_rate * g;
            }
        }
        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::trainable_parameters;
    use serde_json::json;

    fn config(hidden: Value, dropout: f64) -> ConfigRecord {
        let mut config = ConfigRecord::new();
        config.set("dense_hidden_sizes", hidden);
        config.set("dropout", dropout);
        config
    }

    #[test]
    fn parameter_count_follows_layer_sizes() {
        let model = build(&config(json!([4, 3]), 0.0), 5).unwrap();
        // 5*4+4 + 4*3+3 + 3*1+1
        assert_eq!(trainable_parameters(model.as_ref()), 43);
        let names: Vec<&str> = model.parameters().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "dense_0/kernel",
                "dense_0/bias",
                "dense_1/kernel",
                "dense_1/bias",
                "output/kernel",
                "output/bias"
            ]
        );
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        assert!(build(&config(json!([4]), 1.0), 2).is_err());
        assert!(build(&config(json!([0]), 0.1), 2).is_err());
        assert!(build(&config(json!("wide"), 0.1), 2).is_err());
    }

    #[test]
    fn same_seed_same_initialization() {
        let a = build(&config(json!([8]), 0.2), 3).unwrap();
        let b = build(&config(json!([8]), 0.2), 3).unwrap();
        assert_eq!(a.parameters(), b.parameters());
    }

    #[test]
    fn learns_without_dropout() {
        let mut model = build(&config(json!([8]), 0.0), 2).unwrap();
        let inputs: Vec<Vec<f32>> = (0..16)
            .map(|i| vec![(i % 4) as f32 / 4.0, (i / 4) as f32 / 4.0])
            .collect();
        let labels: Vec<f32> = inputs.iter().map(|x| 0.7 * x[0] - 0.3 * x[1] + 0.2).collect();
        let batch = Batch { inputs, labels };

        let first = model.train_step(&batch, 0.1);
        let mut last = first;
        for _ in 0..2000 {
            last = model.train_step(&batch, 0.1);
        }
        assert!(last < first * 0.1, "loss went from {first} to {last}");
    }

    #[test]
    fn prediction_is_deterministic_under_dropout() {
        let model = build(&config(json!([8]), 0.5), 2).unwrap();
        let x = [0.3, -0.1];
        assert_eq!(model.predict(&x), model.predict(&x));
    }
}
