//! Data domain: the input pipeline feeding training and evaluation.
//!
//! The orchestrator only builds an [`InputSpec`]; record parsing, shuffling
//! and worker threads live entirely behind it.

pub mod domain;
pub mod service;
pub mod workers;

pub use domain::{Batch, InputSpec, LabelScaling, Mode, Record};
pub use service::{load_records, Batches};
