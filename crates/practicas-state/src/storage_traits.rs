//! Storage trait definitions for the practicas core
//!
//! These traits define the persistence seams the core depends on:
//! - `PracticeStore`: practice records with optimistic, version-conditioned writes
//! - `WeightStore`: the singleton weight configuration, versioned by replacement
//! - `AuditStore`: the append-only audit ledger
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{AuditRecord, NewAuditEntry, PracticeId, PracticeRecord, WeightRecord};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// PracticeStore
// ---------------------------------------------------------------------------

/// Practice persistence.
///
/// Guarantees:
/// - `insert` stores the record as given (the caller sets `version = 1`).
/// - `compare_and_swap` writes only when the stored version equals
///   `expected_version`; on success the stored copy has `version + 1`.
/// - A lost race returns `StorageError::VersionConflict` and leaves the
///   stored record untouched.
#[async_trait]
pub trait PracticeStore: Send + Sync {
    /// Store a new practice. Fails with `DuplicatePractice` if the id exists.
    async fn insert(&self, practice: PracticeRecord) -> StorageResult<()>;

    /// Load a practice by id. Returns `PracticeNotFound` if absent.
    async fn load(&self, id: &PracticeId) -> StorageResult<PracticeRecord>;

    /// Conditionally replace a practice, returning the stored copy.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        practice: PracticeRecord,
    ) -> StorageResult<PracticeRecord>;

    /// All practices, ordered by id.
    async fn list(&self) -> StorageResult<Vec<PracticeRecord>>;
}

// ---------------------------------------------------------------------------
// WeightStore
// ---------------------------------------------------------------------------

/// Weight configuration persistence.
///
/// Semantics:
/// - `replace` appends a new record as the current one and assigns its
///   version (previous + 1). The swap is atomic: `current` observes either
///   the old pair or the new pair, never a mix.
/// - `history` returns all accepted records newest first.
#[async_trait]
pub trait WeightStore: Send + Sync {
    /// The most recent accepted configuration, if any was ever stored.
    async fn current(&self) -> StorageResult<Option<WeightRecord>>;

    /// Store a new configuration; the `version` field of the input is ignored.
    async fn replace(&self, record: WeightRecord) -> StorageResult<WeightRecord>;

    /// Full replacement history (newest first).
    async fn history(&self) -> StorageResult<Vec<WeightRecord>>;
}

// ---------------------------------------------------------------------------
// AuditStore
// ---------------------------------------------------------------------------

/// Append-only audit persistence.
///
/// Guarantees:
/// - `append` assigns a strictly increasing `seq`, starting at 1.
/// - Stored entries are never updated or deleted.
/// - `scan` returns entries with `seq > after_seq`, ordered by `seq`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry, returning the stored record.
    async fn append(&self, entry: NewAuditEntry) -> StorageResult<AuditRecord>;

    /// Read up to `limit` entries after the given sequence number.
    async fn scan(&self, after_seq: u64, limit: usize) -> StorageResult<Vec<AuditRecord>>;

    /// Highest assigned sequence number (0 when empty).
    async fn last_seq(&self) -> StorageResult<u64>;
}
