//! Error types for the delta engine.

use thiserror::Error;
use tracery_core::CoreError;

/// Errors that can occur while tracking or applying deltas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeltaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Delta not found: {0}")]
    DeltaNotFound(u32),

    #[error("Delta {0} does not track an object")]
    NotAnObjectDelta(u32),

    #[error("Delta {0} does not track a collection")]
    NotACollectionDelta(u32),

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, DeltaError>;
