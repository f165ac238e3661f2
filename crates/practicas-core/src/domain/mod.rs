//! Domain models for the practicas core.
//!
//! Stored record shapes live in `practicas-state`; this module adds the
//! caller model and the error taxonomy on top of them.

pub mod actor;
pub mod error;

pub use actor::{ActorContext, Role};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use practicas_state::{
    ActionKind, AuditOutcome, AuditRecord, AuthorRole, EvaluationRecord, FinalActaRecord,
    PracticeId, PracticeKind, PracticeRecord, PracticeState, SubjectRef,
};
