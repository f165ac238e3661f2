//! Observability tests for the practice lifecycle.
//!
//! These verify that the structured emitters run under a subscriber and that
//! the instrumented operations work with tracing enabled.

mod common;

use common::*;
use practicas_core::metrics::METRICS;
use practicas_core::obs::{
    emit_acta_closed, emit_audit_write_failed, emit_conflict, emit_dispatch_finished,
    emit_notification_attempt, emit_transition_applied, emit_transition_rejected,
};
use practicas_state::{ActionKind, PracticeState, SubjectRef};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_transition_applied_logs_states() {
    emit_transition_applied(
        "p-123",
        PracticeState::EnCurso,
        PracticeState::FinalizadaPendienteEval,
        "doc-1",
        4,
    );
}

#[traced_test]
#[test]
fn test_emit_transition_rejected_logs_reason() {
    emit_transition_rejected(
        "p-123",
        PracticeState::Cerrada,
        PracticeState::EnCurso,
        &"terminal state",
    );
}

#[traced_test]
#[test]
fn test_emit_conflict_and_acta_closed() {
    emit_conflict("p-123", 7);
    emit_acta_closed("p-123", 5.6, false);
}

#[traced_test]
#[test]
fn test_emit_notification_events() {
    emit_notification_attempt("PRACTICE_STARTED", "stu-1", true, None);
    emit_notification_attempt("PRACTICE_STARTED", "emp-1", false, Some("timed out"));
    emit_dispatch_finished(&SubjectRef::Practice("p-123".to_string()), 1, 1);
}

/// WARN-level events are captured by traced_test
#[traced_test]
#[test]
fn test_emit_audit_write_failed_logs_warning() {
    emit_audit_write_failed(
        ActionKind::StateTransition,
        &SubjectRef::Practice("p-err".to_string()),
        &"store unavailable",
    );
}

#[traced_test]
#[tokio::test]
async fn test_lifecycle_runs_under_subscriber_and_counts() {
    let transitions_before = METRICS.transitions_applied();
    let h = harness();
    let pid = evaluated_practice(&h, "p-obs", 6.0, 5.0).await;
    h.core
        .machine
        .request_transition(&pid, PracticeState::Cerrada, &coordinator())
        .await
        .unwrap();

    // METRICS is process-global and other tests run in parallel
    assert!(METRICS.transitions_applied() >= transitions_before + 5);
    METRICS.flush();
}

#[traced_test]
#[tokio::test]
async fn test_refused_audit_write_is_counted() {
    let failures_before = METRICS.audit_write_failures();
    let h = harness();
    let pid = finished_practice(&h, "p-obs").await;
    h.audit.set_reject_writes(true);
    let outcome = h
        .core
        .machine
        .request_transition(&pid, PracticeState::Anulada, &coordinator())
        .await
        .unwrap();
    assert!(outcome.audit_error.is_some());
    assert!(METRICS.audit_write_failures() > failures_before);
}
