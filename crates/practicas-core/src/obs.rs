//! Structured observability hooks for the practice lifecycle.
//!
//! This module provides emission functions for key events: transitions,
//! closings, weight replacements, notification attempts and audit write
//! failures. Lifecycle operations open a `practicas.practice` span through
//! `#[instrument]`, so every event below carries the practice id.
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG` or
//! `PRACTICAS_LOG`). Audit write failures are the out-of-band channel for a
//! ledger that refused a write, so they go out at `warn!`.

use tracing::{info, warn};

use practicas_state::{ActionKind, PracticeState, SubjectRef};

use crate::weights::WeightConfig;

/// Emit event: a transition was persisted.
pub fn emit_transition_applied(
    practice_id: &str,
    from: PracticeState,
    to: PracticeState,
    actor_id: &str,
    version: u64,
) {
    info!(
        event = "practice.transition",
        practice_id = %practice_id,
        from = %from,
        to = %to,
        actor_id = %actor_id,
        version = version,
    );
}

/// Emit event: a transition request was refused before any write.
pub fn emit_transition_rejected(
    practice_id: &str,
    from: PracticeState,
    to: PracticeState,
    reason: &dyn std::fmt::Display,
) {
    info!(
        event = "practice.transition_rejected",
        practice_id = %practice_id,
        from = %from,
        to = %to,
        reason = %reason,
    );
}

/// Emit event: a conditional write lost its race.
pub fn emit_conflict(practice_id: &str, expected_version: u64) {
    info!(
        event = "practice.conflict",
        practice_id = %practice_id,
        expected_version = expected_version,
    );
}

/// Emit event: the final acta exists (freshly written or returned again).
pub fn emit_acta_closed(practice_id: &str, nota_ponderada: f64, already_closed: bool) {
    info!(
        event = "practice.closed",
        practice_id = %practice_id,
        nota_ponderada = nota_ponderada,
        already_closed = already_closed,
    );
}

/// Emit event: an evaluation was stored.
pub fn emit_evaluation_submitted(practice_id: &str, author: &str, grade: f64, resubmission: bool) {
    info!(
        event = "practice.evaluation_submitted",
        practice_id = %practice_id,
        author = %author,
        grade = grade,
        resubmission = resubmission,
    );
}

/// Emit event: the active weights were replaced.
pub fn emit_weights_replaced(actor_id: &str, config: &WeightConfig) {
    info!(
        event = "weights.replaced",
        actor_id = %actor_id,
        informe_weight = config.informe_weight(),
        empleador_weight = config.empleador_weight(),
        version = config.version(),
    );
}

/// Emit event: one recipient attempt finished.
pub fn emit_notification_attempt(
    message_kind: &str,
    recipient: &str,
    success: bool,
    detail: Option<&str>,
) {
    info!(
        event = "notification.attempt",
        message_kind = %message_kind,
        recipient = %recipient,
        success = success,
        detail = detail.unwrap_or(""),
    );
}

/// Emit event: a whole dispatch finished.
pub fn emit_dispatch_finished(subject: &SubjectRef, sent: usize, failed: usize) {
    info!(
        event = "notification.dispatched",
        subject = %subject,
        sent = sent,
        failed = failed,
    );
}

/// Emit event: a notification request could not be queued (warning level).
pub fn emit_notification_dropped(subject: &SubjectRef, reason: &dyn std::fmt::Display) {
    warn!(event = "notification.dropped", subject = %subject, reason = %reason);
}

/// Emit event: the ledger refused a write (warning level).
///
/// The primary operation already succeeded; this is the report that its
/// audit trail is missing an entry.
pub fn emit_audit_write_failed(
    action: ActionKind,
    subject: &SubjectRef,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "audit.write_failed",
        action = %action,
        subject = %subject,
        error = %error,
    );
}
