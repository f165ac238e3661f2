//! Notification dispatch.
//!
//! - [`dispatcher`]: recipient fan-out, rendering, sending, one ledger entry
//!   per recipient attempt
//! - [`recipients`]: deterministic recipient resolution per message kind
//! - [`cancel`]: caller-controlled cancellation for in-flight sends
//! - [`queue`]: fire-and-forget hand-off from the state machine
//! - [`stats`]: success statistics and retry candidates from the ledger
//! - [`reminders`]: overdue-evaluation reminder events
//!
//! The core never retries a failed send. The ledger is the durable record of
//! what failed; an external scheduler reads [`stats::pending_retries`] and
//! re-invokes dispatch when its own policy says so.

pub mod cancel;
pub mod dispatcher;
pub mod queue;
pub mod recipients;
pub mod reminders;
pub mod stats;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use practicas_state::{PracticeId, SubjectRef};

use crate::domain::Role;

pub use cancel::{CancelHandle, CancelSignal};
pub use dispatcher::{DispatchConfig, DispatchReport, NotificationDispatcher, RecipientAttempt};
pub use queue::{channel, spawn_dispatch_worker, ChannelSink, NotificationSink, QueueClosed};
pub use recipients::Recipient;
pub use reminders::due_reminders;
pub use stats::{notification_statistics, pending_retries, NotificationStats, RetryCandidate};

/// What a message is about. Selects the template and the recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Practice is waiting for the assigned supervisor to accept it.
    SupervisionRequested,
    /// Supervisor accepted; the practice is under way.
    PracticeStarted,
    /// Practice finished; supervisor and employer must evaluate.
    EvaluationRequested,
    /// Final acta written.
    PracticeClosed,
    /// Evaluation deadline passed with evaluations still missing.
    EvaluationReminder,
    /// Access credentials were issued to a user.
    CredentialsIssued,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::SupervisionRequested => "SUPERVISION_REQUESTED",
            MessageKind::PracticeStarted => "PRACTICE_STARTED",
            MessageKind::EvaluationRequested => "EVALUATION_REQUESTED",
            MessageKind::PracticeClosed => "PRACTICE_CLOSED",
            MessageKind::EvaluationReminder => "EVALUATION_REMINDER",
            MessageKind::CredentialsIssued => "CREDENTIALS_ISSUED",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            MessageKind::SupervisionRequested,
            MessageKind::PracticeStarted,
            MessageKind::EvaluationRequested,
            MessageKind::PracticeClosed,
            MessageKind::EvaluationReminder,
            MessageKind::CredentialsIssued,
        ]
        .into_iter()
        .find(|k| k.as_str() == s)
        .ok_or_else(|| format!("unknown message kind: {s}"))
    }
}

/// A request to notify everyone concerned by `subject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: MessageKind,
    pub subject: SubjectRef,
    /// Actor whose action triggered the event; recorded on ledger entries.
    pub triggered_by: String,
    /// Extra template data.
    pub data: serde_json::Value,
}

impl NotificationEvent {
    pub fn for_practice(kind: MessageKind, practice_id: &PracticeId, triggered_by: &str) -> Self {
        Self {
            kind,
            subject: SubjectRef::Practice(practice_id.0.clone()),
            triggered_by: triggered_by.to_string(),
            data: serde_json::json!({}),
        }
    }

    pub fn for_user(kind: MessageKind, user_id: &str, triggered_by: &str) -> Self {
        Self {
            kind,
            subject: SubjectRef::User(user_id.to_string()),
            triggered_by: triggered_by.to_string(),
            data: serde_json::json!({}),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Rendered message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("recipient rejected: {0}")]
    Rejected(String),

    #[error("transport unreachable: {0}")]
    Unreachable(String),
}

/// External template engine.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        kind: MessageKind,
        data: &serde_json::Value,
    ) -> Result<RenderedMessage, RenderError>;
}

/// External message transport (mail relay, messaging API).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        message: &RenderedMessage,
    ) -> Result<(), TransportError>;
}

/// Renderer that formats the kind and the template data as plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

#[async_trait]
impl TemplateRenderer for PlainTextRenderer {
    async fn render(
        &self,
        kind: MessageKind,
        data: &serde_json::Value,
    ) -> Result<RenderedMessage, RenderError> {
        let body = serde_json::to_string_pretty(data).map_err(|e| RenderError(e.to_string()))?;
        Ok(RenderedMessage {
            subject: format!("[practicas] {kind}"),
            body,
        })
    }
}

/// Role label used in templates and ledger payloads.
pub(crate) fn role_label(role: Role) -> String {
    role.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_round_trips_through_str() {
        for kind in [
            MessageKind::SupervisionRequested,
            MessageKind::EvaluationReminder,
            MessageKind::CredentialsIssued,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
    }

    #[tokio::test]
    async fn plain_text_renderer_includes_kind() {
        let rendered = PlainTextRenderer
            .render(
                MessageKind::PracticeStarted,
                &serde_json::json!({ "student_name": "Ana" }),
            )
            .await
            .unwrap();
        assert!(rendered.subject.contains("PRACTICE_STARTED"));
        assert!(rendered.body.contains("Ana"));
    }
}
