//! Metric computation over the evaluation input.

use crate::data::domain::Batch;
use crate::models::Model;

use super::domain::EvalMetrics;

/// Evaluate `model` over every batch, stopping after `max_batches` if set.
pub fn evaluate<I>(model: &dyn Model, batches: I, step: u64, max_batches: Option<usize>) -> EvalMetrics
where
    I: IntoIterator<Item = Batch>,
{
    let mut predictions = Vec::new();
    let mut labels = Vec::new();
    for batch in batches.into_iter().take(max_batches.unwrap_or(usize::MAX)) {
        predictions.extend(batch.inputs.iter().map(|x| model.predict(x) as f64));
        labels.extend(batch.labels.iter().map(|y| *y as f64));
    }

    let examples = labels.len();
    let loss = if examples == 0 {
        0.0
    } else {
        predictions
            .iter()
            .zip(&labels)
            .map(|(p, y)| (p - y) * (p - y))
            .sum::<f64>()
            / examples as f64
    };

    EvalMetrics {
        step,
        loss,
        rmse: loss.sqrt(),
        pearson: pearson(&predictions, &labels),
        examples,
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x) * (x - mean_x);
        var_y += (y - mean_y) * (y - mean_y);
    }
    let denom = (var_x * var_y).sqrt();
    (denom > f64::EPSILON).then(|| cov / denom)
}
