//! Append-only audit ledger.
//!
//! Every state change, every notification attempt and every disclosure of
//! sensitive data is appended here. The ledger never updates or deletes.
//!
//! A refused append is never silent: it is reported through `tracing` at
//! `warn!` and counted in [`crate::metrics::METRICS`], then returned to the
//! caller as [`CoreError::AuditWriteFailed`]. Callers treat it as a
//! reportable side condition, not as failure of their own operation.
//!
//! Queries are lazy [`Stream`]s that page through the store by sequence
//! number. Each stream is bounded by the last sequence number observed when
//! it first polls, so it always ends even while writers keep appending.
//! Calling [`AuditLedger::query`] again restarts from the beginning.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::json;

use practicas_state::{
    ActionKind, AuditOutcome, AuditRecord, AuditStore, NewAuditEntry, StorageError, SubjectRef,
};

use crate::clock::Clock;
use crate::domain::{ActorContext, CoreError, CoreResult};
use crate::metrics::METRICS;
use crate::obs;

/// Default number of entries fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Conjunctive filter over ledger entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    /// Accepted action kinds; empty accepts all.
    pub actions: Vec<ActionKind>,
    /// Inclusive lower bound on the entry timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the entry timestamp.
    pub until: Option<DateTime<Utc>>,
    pub subject: Option<SubjectRef>,
    /// Only entries with a greater sequence number (resume point).
    pub after_seq: u64,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: ActionKind) -> Self {
        self.actions.push(action);
        self
    }

    pub fn notifications() -> Self {
        Self::new()
            .action(ActionKind::NotificationSent)
            .action(ActionKind::NotificationFailed)
    }

    pub fn between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    pub fn subject(mut self, subject: SubjectRef) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn after(mut self, seq: u64) -> Self {
        self.after_seq = seq;
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.seq > self.after_seq
            && (self.actions.is_empty() || self.actions.contains(&record.action))
            && self.from.map_or(true, |from| record.timestamp >= from)
            && self.until.map_or(true, |until| record.timestamp < until)
            && self
                .subject
                .as_ref()
                .map_or(true, |subject| &record.subject == subject)
    }
}

struct Cursor {
    after: u64,
    upper: Option<u64>,
    buffered: VecDeque<AuditRecord>,
    done: bool,
}

fn read_error(err: StorageError) -> CoreError {
    CoreError::Storage(format!("audit read failed: {err}"))
}

/// The ledger service.
pub struct AuditLedger {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Append a fully-formed entry, returning its sequence number.
    pub async fn append(&self, entry: NewAuditEntry) -> CoreResult<u64> {
        let action = entry.action;
        let subject = entry.subject.clone();
        match self.store.append(entry).await {
            Ok(record) => Ok(record.seq),
            Err(err) => {
                METRICS.inc_audit_write_failures();
                obs::emit_audit_write_failed(action, &subject, &err);
                Err(CoreError::AuditWriteFailed {
                    detail: err.to_string(),
                })
            }
        }
    }

    /// Append an entry stamped with the ledger's clock.
    pub async fn record(
        &self,
        action: ActionKind,
        actor_id: &str,
        subject: SubjectRef,
        payload: serde_json::Value,
        outcome: AuditOutcome,
    ) -> CoreResult<u64> {
        self.append(NewAuditEntry {
            timestamp: self.clock.now(),
            action,
            actor_id: actor_id.to_string(),
            subject,
            payload,
            outcome,
        })
        .await
    }

    /// Record that `actor` was shown sensitive data about `subject`
    /// (credentials, personal contact data).
    pub async fn record_sensitive_read(
        &self,
        actor: &ActorContext,
        subject: SubjectRef,
        what: &str,
    ) -> CoreResult<u64> {
        self.record(
            ActionKind::SensitiveRead,
            &actor.actor_id,
            subject,
            json!({ "what": what, "role": actor.role.to_string() }),
            AuditOutcome::Success,
        )
        .await
    }

    /// Lazy, finite, restartable stream of matching entries in sequence order.
    pub fn query(&self, filter: AuditFilter) -> BoxStream<'static, CoreResult<AuditRecord>> {
        let store = Arc::clone(&self.store);
        let page_size = self.page_size;
        let cursor = Cursor {
            after: filter.after_seq,
            upper: None,
            buffered: VecDeque::new(),
            done: false,
        };

        stream::unfold((cursor, filter), move |(mut cursor, filter)| {
            let store = Arc::clone(&store);
            async move {
                loop {
                    if let Some(record) = cursor.buffered.pop_front() {
                        if filter.matches(&record) {
                            return Some((Ok(record), (cursor, filter)));
                        }
                        continue;
                    }
                    if cursor.done {
                        return None;
                    }

                    let upper = match cursor.upper {
                        Some(upper) => upper,
                        None => match store.last_seq().await {
                            Ok(upper) => {
                                cursor.upper = Some(upper);
                                upper
                            }
                            Err(err) => {
                                cursor.done = true;
                                return Some((Err(read_error(err)), (cursor, filter)));
                            }
                        },
                    };
                    if cursor.after >= upper {
                        return None;
                    }

                    match store.scan(cursor.after, page_size).await {
                        Ok(page) if page.is_empty() => cursor.done = true,
                        Ok(page) => {
                            for record in page {
                                if record.seq > upper {
                                    cursor.done = true;
                                    break;
                                }
                                cursor.after = record.seq;
                                cursor.buffered.push_back(record);
                            }
                        }
                        Err(err) => {
                            cursor.done = true;
                            return Some((Err(read_error(err)), (cursor, filter)));
                        }
                    }
                }
            }
        })
        .boxed()
    }

    /// Drain [`AuditLedger::query`] into a vector.
    pub async fn collect(&self, filter: AuditFilter) -> CoreResult<Vec<AuditRecord>> {
        self.query(filter).try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use practicas_state::fakes::MemoryAuditStore;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ledger(page_size: usize) -> (AuditLedger, Arc<MemoryAuditStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryAuditStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = AuditLedger::new(store.clone(), clock.clone()).with_page_size(page_size);
        (ledger, store, clock)
    }

    fn practice(id: &str) -> SubjectRef {
        SubjectRef::Practice(id.to_string())
    }

    #[tokio::test]
    async fn append_returns_increasing_ids() {
        let (ledger, _, _) = ledger(10);
        let a = ledger
            .record(
                ActionKind::StateTransition,
                "c-1",
                practice("p-1"),
                json!({}),
                AuditOutcome::Success,
            )
            .await
            .unwrap();
        let b = ledger
            .record(
                ActionKind::StateTransition,
                "c-1",
                practice("p-1"),
                json!({}),
                AuditOutcome::Success,
            )
            .await
            .unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn rejected_append_is_audit_write_failed() {
        let (ledger, store, _) = ledger(10);
        store.set_reject_writes(true);
        let err = ledger
            .record_sensitive_read(
                &ActorContext::coordinator("c-1"),
                SubjectRef::User("u-1".to_string()),
                "credentials",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AuditWriteFailed { .. }));
    }

    #[tokio::test]
    async fn query_filters_by_kind_subject_and_window_across_pages() {
        let (ledger, _, clock) = ledger(2);
        for i in 0..6 {
            let action = if i % 2 == 0 {
                ActionKind::NotificationSent
            } else {
                ActionKind::StateTransition
            };
            ledger
                .record(
                    action,
                    "c-1",
                    practice(if i < 4 { "p-1" } else { "p-2" }),
                    json!({ "i": i }),
                    AuditOutcome::Success,
                )
                .await
                .unwrap();
            clock.advance(Duration::hours(1));
        }

        let sent = ledger
            .collect(AuditFilter::new().action(ActionKind::NotificationSent))
            .await
            .unwrap();
        assert_eq!(sent.len(), 3);

        let p1_sent = ledger
            .collect(
                AuditFilter::new()
                    .action(ActionKind::NotificationSent)
                    .subject(practice("p-1")),
            )
            .await
            .unwrap();
        assert_eq!(p1_sent.len(), 2);

        // entries at +1h and +2h
        let window = ledger
            .collect(AuditFilter::new().between(
                start() + Duration::hours(1),
                start() + Duration::hours(3),
            ))
            .await
            .unwrap();
        let seqs: Vec<u64> = window.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[tokio::test]
    async fn query_is_restartable_and_resumable() {
        let (ledger, _, _) = ledger(3);
        for _ in 0..5 {
            ledger
                .record(
                    ActionKind::StateTransition,
                    "c-1",
                    practice("p-1"),
                    json!({}),
                    AuditOutcome::Success,
                )
                .await
                .unwrap();
        }

        let first = ledger.collect(AuditFilter::new()).await.unwrap();
        let second = ledger.collect(AuditFilter::new()).await.unwrap();
        assert_eq!(first, second);

        let resumed = ledger.collect(AuditFilter::new().after(3)).await.unwrap();
        let seqs: Vec<u64> = resumed.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[tokio::test]
    async fn query_ends_at_snapshot_bound() {
        let (ledger, _, _) = ledger(1);
        for _ in 0..3 {
            ledger
                .record(
                    ActionKind::StateTransition,
                    "c-1",
                    practice("p-1"),
                    json!({}),
                    AuditOutcome::Success,
                )
                .await
                .unwrap();
        }

        let mut stream = ledger.query(AuditFilter::new());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.seq, 1);

        // appended after the stream fixed its bound
        ledger
            .record(
                ActionKind::StateTransition,
                "c-1",
                practice("p-1"),
                json!({}),
                AuditOutcome::Success,
            )
            .await
            .unwrap();

        let rest: Vec<u64> = stream.map(|r| r.unwrap().seq).collect().await;
        assert_eq!(rest, vec![2, 3]);
    }

    #[tokio::test]
    async fn empty_ledger_yields_empty_stream() {
        let (ledger, _, _) = ledger(10);
        assert!(ledger.collect(AuditFilter::new()).await.unwrap().is_empty());
    }
}
