//! Delivery statistics and retry candidates, derived from the ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use practicas_state::{ActionKind, AuditOutcome, SubjectRef};

use super::MessageKind;
use crate::domain::CoreResult;
use crate::ledger::{AuditFilter, AuditLedger};

/// Sent/failed counts for one message kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub sent: u64,
    pub failed: u64,
}

/// Notification outcomes over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub sent: u64,
    pub failed: u64,
    pub total: u64,
    /// Percentage in [0, 100], one decimal, half-up. 0 when `total` is 0.
    pub success_rate_pct: f64,
    /// Keyed by message kind wire name. Entries without a kind are counted
    /// in the totals only.
    pub by_kind: BTreeMap<String, KindCounts>,
}

/// `sent / total` as a percentage rounded half-up to one decimal.
pub fn success_rate_pct(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // tenths of a percent, rounded half-up in integers
    let tenths = (sent * 2000 + total) / (2 * total);
    tenths as f64 / 10.0
}

/// Count `NOTIFICATION_SENT` and `NOTIFICATION_FAILED` entries in `[from, until)`.
pub async fn notification_statistics(
    ledger: &AuditLedger,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> CoreResult<NotificationStats> {
    let mut sent = 0u64;
    let mut failed = 0u64;
    let mut by_kind: BTreeMap<String, KindCounts> = BTreeMap::new();

    let mut entries = ledger.query(AuditFilter::notifications().between(from, until));
    while let Some(record) = entries.try_next().await? {
        let success = record.action == ActionKind::NotificationSent;
        if success {
            sent += 1;
        } else {
            failed += 1;
        }
        if let Some(kind) = record.payload_str("message_kind") {
            let counts = by_kind.entry(kind.to_string()).or_default();
            if success {
                counts.sent += 1;
            } else {
                counts.failed += 1;
            }
        }
    }

    let total = sent + failed;
    Ok(NotificationStats {
        from,
        until,
        sent,
        failed,
        total,
        success_rate_pct: success_rate_pct(sent, total),
        by_kind,
    })
}

/// A recipient whose most recent attempt for a (subject, kind) failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCandidate {
    pub subject: SubjectRef,
    pub recipient_id: String,
    pub message_kind: MessageKind,
    pub last_failed_seq: u64,
    pub last_failed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Every (subject, recipient, kind) whose latest ledger entry is a failure,
/// ordered by subject, recipient and kind.
pub async fn pending_retries(ledger: &AuditLedger) -> CoreResult<Vec<RetryCandidate>> {
    let mut latest: BTreeMap<(SubjectRef, String, MessageKind), Option<RetryCandidate>> =
        BTreeMap::new();

    let mut entries = ledger.query(AuditFilter::notifications());
    while let Some(record) = entries.try_next().await? {
        let Some(recipient_id) = record.payload_str("recipient_id") else {
            continue;
        };
        let Some(kind) = record
            .payload_str("message_kind")
            .and_then(|k| k.parse::<MessageKind>().ok())
        else {
            continue;
        };

        let candidate = (record.action == ActionKind::NotificationFailed).then(|| RetryCandidate {
            subject: record.subject.clone(),
            recipient_id: recipient_id.to_string(),
            message_kind: kind,
            last_failed_seq: record.seq,
            last_failed_at: record.timestamp,
            reason: match &record.outcome {
                AuditOutcome::Failure { detail } => detail.clone(),
                AuditOutcome::Success => None,
            },
        });
        latest.insert((record.subject.clone(), recipient_id.to_string(), kind), candidate);
    }

    Ok(latest.into_values().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_zero_for_empty_window() {
        assert_eq!(success_rate_pct(0, 0), 0.0);
    }

    #[test]
    fn rate_rounds_half_up_to_one_decimal() {
        assert_eq!(success_rate_pct(1, 1), 100.0);
        assert_eq!(success_rate_pct(2, 3), 66.7);
        assert_eq!(success_rate_pct(1, 3), 33.3);
        // 1/8 = 12.5%
        assert_eq!(success_rate_pct(1, 8), 12.5);
        // 1/16 = 6.25% -> 6.3
        assert_eq!(success_rate_pct(1, 16), 6.3);
        assert_eq!(success_rate_pct(0, 5), 0.0);
    }
}
