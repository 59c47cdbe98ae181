//! Public entry points of the orchestrator.

pub mod cli;
