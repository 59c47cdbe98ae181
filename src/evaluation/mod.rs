//! Evaluation: metrics over held-out data and the evaluation cadence.

pub mod domain;
pub mod service;

pub use domain::{EvalMetrics, EvalThrottle};
pub use service::evaluate;
