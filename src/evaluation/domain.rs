//! Evaluation results and the time-based evaluation cadence.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Metrics from one pass over the evaluation data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub step: u64,
    pub loss: f64,
    pub rmse: f64,
    /// `None` when either side has zero variance.
    pub pearson: Option<f64>,
    pub examples: usize,
}

/// Minimum wall-clock spacing between evaluations.
///
/// The first evaluation is always due.
#[derive(Clone, Debug)]
pub struct EvalThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl EvalThrottle {
    pub fn new(throttle_secs: u64) -> Self {
        Self {
            min_interval: Duration::from_secs(throttle_secs),
            last: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.min_interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}
