//! Overdue evaluation reminders.

use chrono::{DateTime, Days, Utc};
use serde_json::json;

use practicas_state::{PracticeState, PracticeStore};

use super::{MessageKind, NotificationEvent};
use crate::domain::CoreResult;

/// Reminder events for practices waiting on evaluations past their deadline.
///
/// A practice is overdue once `now` is past `end_date + deadline_days` while
/// it is still in `FINALIZADA_PENDIENTE_EVAL` with an evaluation missing.
/// Returns one event per overdue practice, ordered by practice id; the event
/// data lists which evaluations are missing.
pub async fn due_reminders(
    practices: &dyn PracticeStore,
    now: DateTime<Utc>,
    deadline_days: i64,
    triggered_by: &str,
) -> CoreResult<Vec<NotificationEvent>> {
    let today = now.date_naive();
    let grace = Days::new(u64::try_from(deadline_days).unwrap_or(0));

    let mut events = Vec::new();
    for practice in practices.list().await? {
        if practice.state != PracticeState::FinalizadaPendienteEval
            || practice.has_both_evaluations()
        {
            continue;
        }
        // a deadline past the calendar's end is never reached
        let Some(deadline) = practice.end_date.checked_add_days(grace) else {
            continue;
        };
        if today <= deadline {
            continue;
        }

        let mut missing = Vec::new();
        if practice.supervisor_evaluation.is_none() {
            missing.push("DOCENTE");
        }
        if practice.employer_evaluation.is_none() {
            missing.push("EMPLEADOR");
        }
        events.push(
            NotificationEvent::for_practice(
                MessageKind::EvaluationReminder,
                &practice.id,
                triggered_by,
            )
            .with_data(json!({
                "missing": missing,
                "deadline": deadline.to_string(),
                "days_overdue": (today - deadline).num_days(),
            })),
        );
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::practice_fixture;
    use chrono::{NaiveDate, TimeZone};
    use practicas_state::fakes::MemoryPracticeStore;

    #[tokio::test]
    async fn only_overdue_pending_practices_are_reminded() {
        let store = MemoryPracticeStore::new();

        let mut overdue = practice_fixture("p-overdue");
        overdue.state = PracticeState::FinalizadaPendienteEval;
        overdue.end_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        store.insert(overdue).await.unwrap();

        let mut recent = practice_fixture("p-recent");
        recent.state = PracticeState::FinalizadaPendienteEval;
        recent.end_date = NaiveDate::from_ymd_opt(2024, 6, 25).unwrap();
        store.insert(recent).await.unwrap();

        let mut running = practice_fixture("p-running");
        running.state = PracticeState::EnCurso;
        running.end_date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        store.insert(running).await.unwrap();

        let now = Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap();
        let events = due_reminders(&store, now, 14, "system").await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MessageKind::EvaluationReminder);
        assert_eq!(events[0].subject.id(), "p-overdue");
        assert_eq!(events[0].data["days_overdue"], 16);
        assert_eq!(events[0].data["missing"], json!(["DOCENTE", "EMPLEADOR"]));
    }

    #[tokio::test]
    async fn deadline_beyond_the_calendar_is_never_due() {
        let store = MemoryPracticeStore::new();
        let mut pending = practice_fixture("p-1");
        pending.state = PracticeState::FinalizadaPendienteEval;
        store.insert(pending).await.unwrap();

        let now = Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap();
        let events = due_reminders(&store, now, 1_000_000_000, "system")
            .await
            .unwrap();
        assert!(events.is_empty());
        let events = due_reminders(&store, now, 14, "system").await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
