//! Practicas-State: persistence layer for the practicas core
//!
//! This crate owns the stored shape of practices, evaluations, final actas,
//! weight configurations and audit entries, plus the async storage traits the
//! core is written against.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: record shapes, conditional writes, append-only ordering.
//!
//! ## Key Components
//!
//! - `PracticeStore`: versioned practice records (compare-and-swap writes)
//! - `WeightStore`: weight configuration superseded by replacement
//! - `AuditStore`: append-only ledger with store-assigned sequence numbers
//! - `fakes`: in-memory implementations of all three

mod error;
pub mod fakes;
pub mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use schema::{
    ActionKind, AuditOutcome, AuditRecord, AuthorRole, EvaluationRecord, FinalActaRecord,
    NewAuditEntry, PracticeId, PracticeKind, PracticeRecord, PracticeState, SubjectRef,
    WeightRecord, WeightSnapshot,
};
pub use storage_traits::{AuditStore, PracticeStore, StorageResult, WeightStore};
