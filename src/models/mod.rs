//! Model variants available to the training driver.
//!
//! Each variant is bound at compile time to its constructor through
//! [`ModelVariant::bind`]; the driver never sees concrete model types.

pub mod dense;
pub mod domain;
pub mod linear;

pub use domain::{trainable_parameters, Model, ModelFn, ModelVariant, Tensor};
