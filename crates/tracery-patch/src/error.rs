//! Error types for patch rendering and replay.

use thiserror::Error;
use tracery_core::CoreError;
use tracery_delta::DeltaError;

/// Errors that can occur while rendering or reading a patch document.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Malformed patch at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Unknown property {property} on type {type_name}")]
    UnknownProperty { type_name: String, property: String },

    #[error("Delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PatchError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        PatchError::Malformed {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;
