//! Error types for the Tracery SDK.

use thiserror::Error;
use tracery_core::CoreError;
use tracery_delta::DeltaError;
use tracery_patch::PatchError;

/// Error type for SDK operations.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Write attempted through a read-only form.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// The target is not backed by a delta of an addressable resource.
    #[error("Unable to retrieve uri from resource of type {type_name}")]
    UnresolvableReference { type_name: String },

    /// A property read back a value of an unexpected kind.
    #[error("Property {property} holds {found}, expected {expected}")]
    TypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    /// The property holds a replacement object, which has no delta to edit.
    #[error("Property {0} was replaced and cannot be edited in place")]
    Replaced(String),

    /// Tracked resource not found in a session.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The dispatcher failed to deliver a request.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
