//! In-memory fakes for storage traits (testing and demos)
//!
//! Provides `MemoryPracticeStore`, `MemoryWeightStore`, and `MemoryAuditStore`
//! that satisfy the trait contracts without any external dependencies.
//! `MemoryAuditStore` can be told to reject writes so callers can exercise
//! their audit-failure paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

fn poisoned(what: &str) -> StorageError {
    StorageError::Unavailable(format!("{what} lock poisoned"))
}

// ---------------------------------------------------------------------------
// MemoryPracticeStore
// ---------------------------------------------------------------------------

/// In-memory practice store backed by a `BTreeMap<PracticeId, PracticeRecord>`.
#[derive(Debug, Default)]
pub struct MemoryPracticeStore {
    practices: Mutex<BTreeMap<PracticeId, PracticeRecord>>,
}

impl MemoryPracticeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PracticeStore for MemoryPracticeStore {
    async fn insert(&self, practice: PracticeRecord) -> StorageResult<()> {
        let mut practices = self.practices.lock().map_err(|_| poisoned("practice"))?;
        if practices.contains_key(&practice.id) {
            return Err(StorageError::DuplicatePractice {
                id: practice.id.0.clone(),
            });
        }
        practices.insert(practice.id.clone(), practice);
        Ok(())
    }

    async fn load(&self, id: &PracticeId) -> StorageResult<PracticeRecord> {
        let practices = self.practices.lock().map_err(|_| poisoned("practice"))?;
        practices
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::PracticeNotFound { id: id.0.clone() })
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut practice: PracticeRecord,
    ) -> StorageResult<PracticeRecord> {
        let mut practices = self.practices.lock().map_err(|_| poisoned("practice"))?;
        let stored = practices
            .get_mut(&practice.id)
            .ok_or_else(|| StorageError::PracticeNotFound {
                id: practice.id.0.clone(),
            })?;
        if stored.version != expected_version {
            return Err(StorageError::VersionConflict {
                id: practice.id.0.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        practice.version = expected_version + 1;
        *stored = practice.clone();
        debug!(practice_id = %practice.id, version = practice.version, "practice swapped");
        Ok(practice)
    }

    async fn list(&self) -> StorageResult<Vec<PracticeRecord>> {
        let practices = self.practices.lock().map_err(|_| poisoned("practice"))?;
        Ok(practices.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryWeightStore
// ---------------------------------------------------------------------------

/// In-memory weight store. History is kept oldest-first internally.
#[derive(Debug, Default)]
pub struct MemoryWeightStore {
    history: Mutex<Vec<WeightRecord>>,
}

impl MemoryWeightStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WeightStore for MemoryWeightStore {
    async fn current(&self) -> StorageResult<Option<WeightRecord>> {
        let history = self.history.lock().map_err(|_| poisoned("weight"))?;
        Ok(history.last().cloned())
    }

    async fn replace(&self, mut record: WeightRecord) -> StorageResult<WeightRecord> {
        let mut history = self.history.lock().map_err(|_| poisoned("weight"))?;
        record.version = history.last().map(|r| r.version + 1).unwrap_or(1);
        history.push(record.clone());
        Ok(record)
    }

    async fn history(&self) -> StorageResult<Vec<WeightRecord>> {
        let history = self.history.lock().map_err(|_| poisoned("weight"))?;
        let mut records = history.clone();
        records.reverse(); // newest first
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditStore
// ---------------------------------------------------------------------------

/// In-memory append-only ledger backed by a `Vec<AuditRecord>`.
///
/// `seq` equals the entry's position plus one, so appends under the lock are
/// gap-free regardless of how many writers race.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditRecord>>,
    reject_writes: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail with `WriteRejected` (or succeed again).
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: NewAuditEntry) -> StorageResult<AuditRecord> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected(
                "audit store is rejecting writes".to_string(),
            ));
        }
        let mut entries = self.entries.lock().map_err(|_| poisoned("audit"))?;
        let record = AuditRecord::from_new(entries.len() as u64 + 1, entry);
        entries.push(record.clone());
        Ok(record)
    }

    async fn scan(&self, after_seq: u64, limit: usize) -> StorageResult<Vec<AuditRecord>> {
        let entries = self.entries.lock().map_err(|_| poisoned("audit"))?;
        // seq n lives at index n - 1
        let start = (after_seq as usize).min(entries.len());
        Ok(entries[start..].iter().take(limit).cloned().collect())
    }

    async fn last_seq(&self) -> StorageResult<u64> {
        let entries = self.entries.lock().map_err(|_| poisoned("audit"))?;
        Ok(entries.len() as u64)
    }
}
