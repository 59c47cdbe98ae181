//! Shared utilities that glue the different domains together.
pub mod config;
pub mod error;
pub mod json;
pub mod log;
pub mod time;

pub use config::{ConfigRecord, RunOptions};
pub use error::{ExitCode, TrainError, TrainResult};
