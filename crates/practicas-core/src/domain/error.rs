//! Error taxonomy for the practicas core.

use practicas_state::{PracticeState, StorageError};

/// Closed classification of [`CoreError`], for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTransition,
    Conflict,
    InvalidGrade,
    WeightSumInvalid,
    AuditWriteFailed,
    DispatchFailed,
    PreconditionFailed,
    NotFound,
    Storage,
    Config,
}

/// Core errors. Every variant carries the context needed to act on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid transition for practice {practice_id}: {from} -> {to}")]
    InvalidTransition {
        practice_id: String,
        from: PracticeState,
        to: PracticeState,
    },

    #[error("conflict on practice {practice_id}: version {expected} is no longer current")]
    Conflict { practice_id: String, expected: u64 },

    #[error("invalid grade {value}: must lie in [1.0, 7.0]")]
    InvalidGrade { value: f64 },

    #[error("invalid weights {informe}/{empleador}: each must be in [0, 100] and sum to 100")]
    WeightSumInvalid { informe: u32, empleador: u32 },

    #[error("audit write failed: {detail}")]
    AuditWriteFailed { detail: String },

    #[error("dispatch to {recipient} failed: {reason}")]
    DispatchFailed { recipient: String, reason: String },

    #[error("precondition failed for practice {practice_id}: {reason}")]
    PreconditionFailed { practice_id: String, reason: String },

    #[error("practice not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::Conflict { .. } => ErrorKind::Conflict,
            CoreError::InvalidGrade { .. } => ErrorKind::InvalidGrade,
            CoreError::WeightSumInvalid { .. } => ErrorKind::WeightSumInvalid,
            CoreError::AuditWriteFailed { .. } => ErrorKind::AuditWriteFailed,
            CoreError::DispatchFailed { .. } => ErrorKind::DispatchFailed,
            CoreError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Storage(_) => ErrorKind::Storage,
            CoreError::Config(_) => ErrorKind::Config,
        }
    }

    /// Only a lost optimistic race is safe to retry by re-reading.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub(crate) fn precondition(practice_id: &str, reason: impl Into<String>) -> Self {
        CoreError::PreconditionFailed {
            practice_id: practice_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PracticeNotFound { id } => CoreError::NotFound(id),
            StorageError::VersionConflict { id, expected, .. } => CoreError::Conflict {
                practice_id: id,
                expected,
            },
            other => CoreError::Storage(other.to_string()),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_maps_to_retryable_conflict() {
        let err: CoreError = StorageError::VersionConflict {
            id: "p-1".to_string(),
            expected: 3,
            actual: 4,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_practice_maps_to_not_found() {
        let err: CoreError = StorageError::PracticeNotFound {
            id: "p-9".to_string(),
        }
        .into();
        assert_eq!(err, CoreError::NotFound("p-9".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_transition_display_names_states() {
        let err = CoreError::InvalidTransition {
            practice_id: "p-1".to_string(),
            from: PracticeState::Pendiente,
            to: PracticeState::Cerrada,
        };
        let msg = err.to_string();
        assert!(msg.contains("PENDIENTE -> CERRADA"));
    }

    #[test]
    fn weight_error_display() {
        let err = CoreError::WeightSumInvalid {
            informe: 70,
            empleador: 40,
        };
        assert!(err.to_string().contains("70/40"));
        assert_eq!(err.kind(), ErrorKind::WeightSumInvalid);
    }
}
