//! Feature domain: the global catalog and request validation.

pub mod domain;
pub mod service;

pub use domain::{FEATURE_CATALOG, SMILES_FEATURES, SMILES_FLAG};
pub use service::{parse_feature_list, validate};
