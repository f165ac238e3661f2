//! Bounded parallel fan-out of one notification event.
//!
//! Every resolved recipient gets exactly one attempt and exactly one ledger
//! entry (`NOTIFICATION_SENT` or `NOTIFICATION_FAILED`), whether the attempt
//! succeeded, failed, timed out or was cancelled. A failing recipient never
//! prevents attempts to the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use practicas_state::{
    ActionKind, AuditOutcome, PracticeRecord, PracticeStore, SubjectRef,
};

use super::recipients::{self, Recipient};
use super::stats::{self, NotificationStats, RetryCandidate};
use super::{role_label, CancelSignal, MessageKind, NotificationEvent, TemplateRenderer, Transport};
use crate::config::CoreConfig;
use crate::domain::{CoreError, CoreResult};
use crate::ledger::AuditLedger;
use crate::metrics::METRICS;
use crate::obs;

const CANCELLED: &str = "cancelled";

/// Concurrency limits for a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of sends in flight at once.
    pub max_concurrent: usize,
    /// Per-recipient send timeout.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&CoreConfig> for DispatchConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            max_concurrent: config.dispatch_concurrency.max(1),
            send_timeout: config.send_timeout(),
        }
    }
}

/// Result of one recipient attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientAttempt {
    pub recipient: Recipient,
    /// `Err(CoreError::DispatchFailed)` when the message did not go out.
    pub result: Result<(), CoreError>,
    /// Ledger sequence number of this attempt's entry.
    pub audit_seq: Option<u64>,
    /// Set when the ledger refused this attempt's entry.
    pub audit_error: Option<CoreError>,
}

impl RecipientAttempt {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-recipient results of one dispatch, ordered by recipient id.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub kind: MessageKind,
    pub subject: SubjectRef,
    pub attempts: Vec<RecipientAttempt>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.attempts.iter().filter(|a| a.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.sent()
    }

    pub fn audit_errors(&self) -> impl Iterator<Item = &CoreError> {
        self.attempts.iter().filter_map(|a| a.audit_error.as_ref())
    }
}

/// Sends notification events through the injected renderer and transport.
pub struct NotificationDispatcher {
    practices: Arc<dyn PracticeStore>,
    renderer: Arc<dyn TemplateRenderer>,
    transport: Arc<dyn Transport>,
    ledger: Arc<AuditLedger>,
    config: DispatchConfig,
}

impl NotificationDispatcher {
    pub fn new(
        practices: Arc<dyn PracticeStore>,
        renderer: Arc<dyn TemplateRenderer>,
        transport: Arc<dyn Transport>,
        ledger: Arc<AuditLedger>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            practices,
            renderer,
            transport,
            ledger,
            config: DispatchConfig {
                max_concurrent: config.max_concurrent.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    /// Resolve recipients for `event` and attempt each of them once.
    ///
    /// Fails only if the recipients cannot be resolved (unknown practice,
    /// unreadable store); in that case nothing was sent and nothing recorded.
    ///
    /// Stop a dispatch through `cancel`: every recipient is then recorded as a
    /// cancelled attempt. Dropping the returned future instead aborts the
    /// sends still in flight and records nothing for them.
    #[instrument(skip_all, fields(kind = %event.kind, subject = %event.subject))]
    pub async fn dispatch(
        &self,
        event: &NotificationEvent,
        cancel: &CancelSignal,
    ) -> CoreResult<DispatchReport> {
        let (recipients, practice) = recipients::resolve(self.practices.as_ref(), event).await?;
        self.dispatch_to(event, recipients, practice.as_ref(), cancel)
            .await
    }

    /// Re-attempt one previously failed recipient.
    pub async fn retry(
        &self,
        candidate: &RetryCandidate,
        triggered_by: &str,
        cancel: &CancelSignal,
    ) -> CoreResult<DispatchReport> {
        let event = NotificationEvent {
            kind: candidate.message_kind,
            subject: candidate.subject.clone(),
            triggered_by: triggered_by.to_string(),
            data: json!({ "retry_of": candidate.last_failed_seq }),
        };
        let (recipients, practice) = recipients::resolve(self.practices.as_ref(), &event).await?;
        let recipients = recipients
            .into_iter()
            .filter(|r| r.id == candidate.recipient_id)
            .collect();
        self.dispatch_to(&event, recipients, practice.as_ref(), cancel)
            .await
    }

    /// Success statistics over `[from, until)`.
    pub async fn statistics(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> CoreResult<NotificationStats> {
        stats::notification_statistics(&self.ledger, from, until).await
    }

    /// Recipients whose latest attempt failed.
    pub async fn pending_retries(&self) -> CoreResult<Vec<RetryCandidate>> {
        stats::pending_retries(&self.ledger).await
    }

    async fn dispatch_to(
        &self,
        event: &NotificationEvent,
        recipients: Vec<Recipient>,
        practice: Option<&PracticeRecord>,
        cancel: &CancelSignal,
    ) -> CoreResult<DispatchReport> {
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent));
        // dropping the set aborts sends still in flight
        let mut tasks = JoinSet::new();

        for (slot, recipient) in recipients.iter().enumerate() {
            let recipient = recipient.clone();
            let data = template_data(event, &recipient, practice);
            let renderer = Arc::clone(&self.renderer);
            let transport = Arc::clone(&self.transport);
            let sem = Arc::clone(&sem);
            let cancel = cancel.clone();
            let kind = event.kind;
            let timeout = self.config.send_timeout;

            tasks.spawn(async move {
                let result = send_one(
                    sem,
                    renderer.as_ref(),
                    transport.as_ref(),
                    kind,
                    &recipient,
                    &data,
                    timeout,
                    &cancel,
                )
                .await;
                (slot, result)
            });
        }

        let mut results: Vec<Option<Result<(), String>>> = vec![None; recipients.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => results[slot] = Some(result),
                Err(e) => warn!(error = %e, "send task aborted"),
            }
        }

        let mut attempts = Vec::with_capacity(recipients.len());
        for (recipient, result) in recipients.into_iter().zip(results) {
            let result = result.unwrap_or_else(|| Err("send task aborted".to_string()));
            attempts.push(self.record_attempt(event, recipient, result).await);
        }

        let report = DispatchReport {
            kind: event.kind,
            subject: event.subject.clone(),
            attempts,
        };
        obs::emit_dispatch_finished(&report.subject, report.sent(), report.failed());
        Ok(report)
    }

    async fn record_attempt(
        &self,
        event: &NotificationEvent,
        recipient: Recipient,
        result: Result<(), String>,
    ) -> RecipientAttempt {
        let success = result.is_ok();
        METRICS.inc_notification(success);
        obs::emit_notification_attempt(
            event.kind.as_str(),
            &recipient.id,
            success,
            result.as_ref().err().map(String::as_str),
        );

        let (action, outcome) = match &result {
            Ok(()) => (ActionKind::NotificationSent, AuditOutcome::Success),
            Err(reason) => (ActionKind::NotificationFailed, AuditOutcome::failure(reason)),
        };
        let payload = json!({
            "recipient_id": recipient.id,
            "recipient_role": role_label(recipient.role),
            "message_kind": event.kind.as_str(),
        });
        let (audit_seq, audit_error) = match self
            .ledger
            .record(action, &event.triggered_by, event.subject.clone(), payload, outcome)
            .await
        {
            Ok(seq) => (Some(seq), None),
            Err(err) => (None, Some(err)),
        };

        RecipientAttempt {
            result: result.map_err(|reason| CoreError::DispatchFailed {
                recipient: recipient.id.clone(),
                reason,
            }),
            recipient,
            audit_seq,
            audit_error,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn send_one(
    sem: Arc<Semaphore>,
    renderer: &dyn TemplateRenderer,
    transport: &dyn Transport,
    kind: MessageKind,
    recipient: &Recipient,
    data: &serde_json::Value,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<(), String> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CANCELLED.to_string()),
        permit = sem.acquire_owned() => permit.map_err(|_| "dispatcher closed".to_string())?,
    };
    if cancel.is_cancelled() {
        return Err(CANCELLED.to_string());
    }

    // rendering and sending share one deadline and one cancellation point
    let attempt = async {
        match renderer.render(kind, data).await {
            Ok(message) => transport
                .send(recipient, &message)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CANCELLED.to_string()),
        attempted = tokio::time::timeout(timeout, attempt) => attempted
            .unwrap_or_else(|_| Err(format!("timed out after {} ms", timeout.as_millis()))),
    }
}

fn template_data(
    event: &NotificationEvent,
    recipient: &Recipient,
    practice: Option<&PracticeRecord>,
) -> serde_json::Value {
    let mut data = match &event.data {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    data.insert("message_kind".into(), json!(event.kind.as_str()));
    data.insert("recipient_id".into(), json!(recipient.id));
    data.insert("recipient_role".into(), json!(role_label(recipient.role)));
    if let Some(p) = practice {
        data.insert("practice_id".into(), json!(p.id.0));
        data.insert("student_name".into(), json!(p.student_name));
        data.insert("state".into(), json!(p.state.as_str()));
        data.insert("end_date".into(), json!(p.end_date.to_string()));
    }
    serde_json::Value::Object(data)
}
