//! Error types for practicas-state

use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No practice with the given id
    #[error("practice not found: {id}")]
    PracticeNotFound { id: String },

    /// A practice with the same id already exists
    #[error("practice already exists: {id}")]
    DuplicatePractice { id: String },

    /// Conditional write lost: the stored version moved on
    #[error("version conflict on practice {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// The backend refused the write (disk full, constraint, injected fault)
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Backend unreachable or failed mid-operation
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
