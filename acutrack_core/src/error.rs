//! Error types for the acutrack_core library.

use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for acutrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before reaching a store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unique medical record number already taken
    #[error("Medical record number {0} already exists")]
    Conflict(String),

    /// Referenced patient or session does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Any other store failure (unreadable document, write failure, ...)
    #[error("Store error: {0}")]
    TransientStore(String),

    /// Session lifecycle transition that is not allowed
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Sessions were deleted but the patient record was not
    #[error("Sessions of patient {patient_id} were deleted but the patient was not: {reason}")]
    PartialDelete { patient_id: Uuid, reason: String },
}

/// Coarse classification used by shells to decide how to surface an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    TransientStore,
    Validation,
}

impl Error {
    pub fn patient_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            entity: "Patient",
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            entity: "Session",
            id: id.to_string(),
        }
    }

    /// Map this error onto the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Validation(_) | Error::InvalidTransition(_) => ErrorKind::Validation,
            _ => ErrorKind::TransientStore,
        }
    }

    /// Whether the user can fix the input (or just try again) and re-submit
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::NotFound)
    }
}
