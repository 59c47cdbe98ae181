//! Training domain: run identity, the estimator loop and the driver that
//! takes a run from configuration to persisted results.

pub mod domain;
pub mod engine;
pub mod export;
pub mod identity;
pub mod repo_fs;
pub mod service;

pub use domain::{CheckpointPolicy, RunState, RunSummary};
pub use identity::RunIdentity;
pub use service::{run, RunRequest};
