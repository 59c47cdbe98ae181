//! Error handling primitives shared across the orchestrator.
//!
//! Every failure is bubbled to the binary as a [`TrainError`]; the binary logs
//! it once and exits with the stable code returned by [`TrainError::code`].

use std::path::PathBuf;

use thiserror::Error;

/// Stable process exit codes, one per failure class.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Catch-all for IO failures and bugs.
    Internal = 1,
    /// Parameter document missing or malformed.
    ConfigLoad = 2,
    /// Requested model variant is not registered.
    UnknownModelVariant = 3,
    /// Requested feature is not in the global catalog.
    UnknownFeature = 4,
    /// Requested feature is not referenced by the model parameters.
    FeatureModelMismatch = 5,
    /// Failure inside the train/evaluate/export loop.
    Training = 6,
    /// Caller supplied an unusable option value.
    InvalidInput = 7,
}

/// Canonical error type for the orchestrator.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("failed to load parameters from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("unknown model variant '{requested}', registered variants: {}", .available.join(", "))]
    UnknownModelVariant {
        requested: String,
        available: Vec<String>,
    },

    #[error("unknown features [{}], known features: [{}]", .unknown.join(", "), .catalog.join(", "))]
    UnknownFeature {
        unknown: Vec<String>,
        catalog: Vec<String>,
    },

    #[error(
        "features [{}] are not referenced by {params} for model variant '{variant}' (requested: [{}])",
        .missing.join(", "),
        .requested.join(", ")
    )]
    FeatureModelMismatch {
        missing: Vec<String>,
        requested: Vec<String>,
        params: PathBuf,
        variant: String,
    },

    #[error("training failed: {0}")]
    Training(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias used throughout the crate.
pub type TrainResult<T> = Result<T, TrainError>;

impl TrainError {
    /// Wrap an IO failure together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Training loop helper.
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Reclassify a failure raised inside the train/evaluate/export loop.
    ///
    /// IO errors keep their path in the message; every other variant is
    /// returned unchanged.
    pub fn in_training(self) -> Self {
        match self {
            Self::Io { path, source } => {
                Self::Training(format!("io error at {}: {source}", path.display()))
            }
            other => other,
        }
    }

    /// Exit code reported by the binary for this failure.
    pub fn code(&self) -> ExitCode {
        match self {
            Self::ConfigLoad { .. } => ExitCode::ConfigLoad,
            Self::UnknownModelVariant { .. } => ExitCode::UnknownModelVariant,
            Self::UnknownFeature { .. } => ExitCode::UnknownFeature,
            Self::FeatureModelMismatch { .. } => ExitCode::FeatureModelMismatch,
            Self::Training(_) => ExitCode::Training,
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::Io { .. } => ExitCode::Internal,
        }
    }
}
