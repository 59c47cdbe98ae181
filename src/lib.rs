// lib.rs - training run orchestrator
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod features;
pub mod models;
pub mod training;

pub use common::{ExitCode, TrainError, TrainResult};
pub use training::{run, RunRequest, RunSummary};
