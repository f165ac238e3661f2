//! Notification dispatch end to end: milestone events through the queue,
//! per-recipient ledger entries, statistics and retry candidates.

mod common;

use std::time::Duration;

use chrono::TimeZone;

use common::*;
use practicas_core::ledger::AuditFilter;
use practicas_core::notify::{self, pending_retries};
use practicas_core::{CancelHandle, CancelSignal, MessageKind, NotificationEvent};
use practicas_state::{ActionKind, PracticeState, SubjectRef};

#[tokio::test]
async fn milestone_events_reach_the_expected_recipients() {
    let mut h = harness();
    finished_practice(&h, "p-1").await;

    for event in h.drain_events() {
        h.core
            .dispatcher
            .dispatch(&event, &CancelSignal::never())
            .await
            .unwrap();
    }

    // sends within one dispatch run concurrently, so compare as a set
    let mut delivered: Vec<String> = h
        .transport
        .delivered()
        .into_iter()
        .map(|(recipient, subject)| format!("{recipient} {subject}"))
        .collect();
    delivered.sort();
    assert_eq!(
        delivered,
        vec![
            "doc-1 [practicas] EVALUATION_REQUESTED",
            "doc-1 [practicas] SUPERVISION_REQUESTED",
            "emp-1 [practicas] EVALUATION_REQUESTED",
            "emp-1 [practicas] PRACTICE_STARTED",
            "stu-1 [practicas] PRACTICE_STARTED",
        ]
    );
}

#[tokio::test]
async fn every_attempt_leaves_one_ledger_entry() {
    let mut h = harness();
    finished_practice(&h, "p-1").await;
    h.transport.fail_for("emp-1");

    let mut attempts = 0;
    for event in h.drain_events() {
        let report = h
            .core
            .dispatcher
            .dispatch(&event, &CancelSignal::never())
            .await
            .unwrap();
        attempts += report.attempts.len();
    }

    let entries = h
        .core
        .ledger
        .collect(AuditFilter::notifications())
        .await
        .unwrap();
    assert_eq!(entries.len(), attempts);
    let failed: Vec<_> = entries
        .iter()
        .filter(|e| e.action == ActionKind::NotificationFailed)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed
        .iter()
        .all(|e| e.payload_str("recipient_id") == Some("emp-1")));
}

#[tokio::test]
async fn statistics_over_window() {
    let mut h = harness();
    let from = start_time();

    let empty = h
        .core
        .dispatcher
        .statistics(from, from + chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert_eq!(empty.success_rate_pct, 0.0);

    finished_practice(&h, "p-1").await;
    h.transport.fail_for("stu-1");
    for event in h.drain_events() {
        h.core
            .dispatcher
            .dispatch(&event, &CancelSignal::never())
            .await
            .unwrap();
    }

    let stats = h
        .core
        .dispatcher
        .statistics(from, from + chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(stats.sent, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.success_rate_pct, 80.0);
    let started = &stats.by_kind["PRACTICE_STARTED"];
    assert_eq!((started.sent, started.failed), (1, 1));

    // the window is half-open and excludes later entries
    let before = h
        .core
        .dispatcher
        .statistics(from - chrono::Duration::days(1), from)
        .await
        .unwrap();
    assert_eq!(before.total, 0);
}

#[tokio::test]
async fn failed_recipients_become_retry_candidates_until_delivered() {
    let mut h = harness();
    finished_practice(&h, "p-1").await;
    h.transport.fail_for("doc-1");
    for event in h.drain_events() {
        h.core
            .dispatcher
            .dispatch(&event, &CancelSignal::never())
            .await
            .unwrap();
    }

    let pending = pending_retries(&h.core.ledger).await.unwrap();
    let kinds: Vec<MessageKind> = pending.iter().map(|c| c.message_kind).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::SupervisionRequested, MessageKind::EvaluationRequested]
    );
    assert!(pending.iter().all(|c| c.recipient_id == "doc-1"));
    assert!(pending.iter().all(|c| c.reason.is_some()));

    h.transport.heal();
    for candidate in &pending {
        let report = h
            .core
            .dispatcher
            .retry(candidate, "scheduler", &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(report.sent(), 1);
        assert_eq!(report.attempts.len(), 1);
    }
    assert!(h.core.dispatcher.pending_retries().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_dispatch_is_recorded_as_failed() {
    let h = harness();
    finished_practice(&h, "p-1").await;
    let (handle, signal) = CancelHandle::new();
    handle.cancel();

    let event = NotificationEvent::for_practice(
        MessageKind::EvaluationRequested,
        &practicas_state::PracticeId::from("p-1"),
        "coord-1",
    );
    let report = h.core.dispatcher.dispatch(&event, &signal).await.unwrap();
    assert_eq!(report.failed(), 2);
    assert!(h.transport.delivered().is_empty());

    let failed = h
        .core
        .ledger
        .collect(AuditFilter::new().action(ActionKind::NotificationFailed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 2);
}

#[tokio::test]
async fn user_subject_notifies_that_user() {
    let h = harness();
    let event = NotificationEvent::for_user(MessageKind::CredentialsIssued, "emp-7", "coord-1")
        .with_data(serde_json::json!({ "role": "EMPLEADOR" }));
    let report = h
        .core
        .dispatcher
        .dispatch(&event, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(report.sent(), 1);
    assert_eq!(report.subject, SubjectRef::User("emp-7".to_string()));
    assert_eq!(report.attempts[0].recipient.role, practicas_core::Role::Empleador);
}

#[tokio::test]
async fn worker_drains_the_queue() {
    let mut h = harness();
    finished_practice(&h, "p-1").await;
    let queued = h.drain_events();

    let (sink, rx) = notify::channel();
    let worker = notify::spawn_dispatch_worker(
        std::sync::Arc::clone(&h.core.dispatcher),
        rx,
        CancelSignal::never(),
    );
    for event in queued {
        notify::NotificationSink::submit(&sink, event).unwrap();
    }
    drop(sink);

    let dispatched = tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker finishes once the sink is dropped")
        .unwrap();
    assert_eq!(dispatched, 3);
    assert_eq!(h.transport.delivered().len(), 5);
}

#[tokio::test]
async fn worker_stops_on_cancel() {
    let h = harness();
    let (_sink, rx) = notify::channel();
    let (handle, signal) = CancelHandle::new();
    let worker = notify::spawn_dispatch_worker(std::sync::Arc::clone(&h.core.dispatcher), rx, signal);
    handle.cancel();
    let dispatched = tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker stops")
        .unwrap();
    assert_eq!(dispatched, 0);
}

#[tokio::test]
async fn events_queued_at_cancel_are_recorded_as_failed() {
    let mut h = harness();
    finished_practice(&h, "p-1").await;
    let queued = h.drain_events();
    assert_eq!(queued.len(), 3);

    let (sink, rx) = notify::channel();
    for event in queued {
        notify::NotificationSink::submit(&sink, event).unwrap();
    }
    let (handle, signal) = CancelHandle::new();
    handle.cancel();
    let worker = notify::spawn_dispatch_worker(std::sync::Arc::clone(&h.core.dispatcher), rx, signal);

    let dispatched = tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker stops")
        .unwrap();
    assert_eq!(dispatched, 3);
    assert!(h.transport.delivered().is_empty());

    let entries = h
        .core
        .ledger
        .collect(AuditFilter::notifications())
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries
        .iter()
        .all(|e| e.action == ActionKind::NotificationFailed));
    assert!(entries
        .iter()
        .all(|e| matches!(&e.outcome, practicas_state::AuditOutcome::Failure { detail: Some(d) } if d == "cancelled")));
}

#[tokio::test]
async fn overdue_practices_get_reminders_for_missing_evaluators() {
    let mut h = harness();
    let pid = finished_practice(&h, "p-1").await;
    h.core
        .machine
        .submit_evaluation(&pid, 6.0, None, &supervisor())
        .await
        .unwrap();
    h.drain_events();

    // end date 2024-06-28, default deadline 14 days
    h.clock
        .set(chrono::Utc.with_ymd_and_hms(2024, 7, 20, 9, 0, 0).unwrap());
    let queued = h.core.queue_due_reminders("system").await.unwrap();
    assert_eq!(queued, 1);

    let events = h.drain_events();
    assert_eq!(events[0].kind, MessageKind::EvaluationReminder);
    let report = h
        .core
        .dispatcher
        .dispatch(&events[0], &CancelSignal::never())
        .await
        .unwrap();
    let recipients: Vec<&str> = report.attempts.iter().map(|a| a.recipient.id.as_str()).collect();
    assert_eq!(recipients, vec!["emp-1"]);

    let state = h.core.machine.load(&pid).await.unwrap().state;
    assert_eq!(state, PracticeState::FinalizadaPendienteEval);
}
