//! Recipient resolution.
//!
//! For the same event and the same stored practice, the resolved list is
//! always the same: sorted by id, one entry per id.

use serde::{Deserialize, Serialize};

use practicas_state::{PracticeRecord, PracticeStore, SubjectRef};

use super::{MessageKind, NotificationEvent};
use crate::domain::{CoreResult, PracticeId, Role};

/// One addressee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub role: Role,
}

impl Recipient {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

fn supervisor(p: &PracticeRecord) -> Option<Recipient> {
    p.supervisor_id
        .as_ref()
        .map(|id| Recipient::new(id.clone(), Role::Docente))
}

fn employer(p: &PracticeRecord) -> Option<Recipient> {
    p.employer_id
        .as_ref()
        .map(|id| Recipient::new(id.clone(), Role::Empleador))
}

fn student(p: &PracticeRecord) -> Option<Recipient> {
    Some(Recipient::new(p.student_id.clone(), Role::Estudiante))
}

/// Who hears about `kind` for this practice. Unassigned references are skipped.
pub fn for_practice(kind: MessageKind, practice: &PracticeRecord) -> Vec<Recipient> {
    let candidates = match kind {
        MessageKind::SupervisionRequested => vec![supervisor(practice)],
        MessageKind::PracticeStarted => vec![student(practice), employer(practice)],
        MessageKind::EvaluationRequested => vec![supervisor(practice), employer(practice)],
        MessageKind::PracticeClosed => vec![student(practice), supervisor(practice)],
        MessageKind::EvaluationReminder => vec![
            supervisor(practice).filter(|_| practice.supervisor_evaluation.is_none()),
            employer(practice).filter(|_| practice.employer_evaluation.is_none()),
        ],
        MessageKind::CredentialsIssued => vec![employer(practice)],
    };
    normalize(candidates.into_iter().flatten().collect())
}

fn normalize(mut recipients: Vec<Recipient>) -> Vec<Recipient> {
    recipients.sort_by(|a, b| a.id.cmp(&b.id));
    recipients.dedup_by(|a, b| a.id == b.id);
    recipients
}

/// Resolve recipients for an event, loading the practice when the subject is one.
///
/// Returns the recipients and, for practice subjects, the loaded record so
/// templates can use its fields.
pub async fn resolve(
    practices: &dyn PracticeStore,
    event: &NotificationEvent,
) -> CoreResult<(Vec<Recipient>, Option<PracticeRecord>)> {
    match &event.subject {
        SubjectRef::Practice(id) => {
            let practice = practices.load(&PracticeId(id.clone())).await?;
            Ok((for_practice(event.kind, &practice), Some(practice)))
        }
        SubjectRef::User(id) => {
            let role = event
                .data
                .get("role")
                .and_then(|r| serde_json::from_value::<Role>(r.clone()).ok())
                .unwrap_or(Role::Estudiante);
            Ok((vec![Recipient::new(id.clone(), role)], None))
        }
        SubjectRef::Config(_) => Ok((Vec::new(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::practice_fixture;
    use practicas_state::{AuthorRole, EvaluationRecord};

    fn ids(recipients: &[Recipient]) -> Vec<&str> {
        recipients.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn supervision_request_goes_to_supervisor_only() {
        let mut p = practice_fixture("p-1");
        p.supervisor_id = Some("doc-1".to_string());
        assert_eq!(
            ids(&for_practice(MessageKind::SupervisionRequested, &p)),
            vec!["doc-1"]
        );
    }

    #[test]
    fn unassigned_references_are_skipped() {
        let p = practice_fixture("p-1");
        assert!(for_practice(MessageKind::SupervisionRequested, &p).is_empty());
        assert_eq!(
            ids(&for_practice(MessageKind::PracticeStarted, &p)),
            vec!["stu-1"]
        );
    }

    #[test]
    fn recipients_are_sorted_and_deduplicated() {
        let mut p = practice_fixture("p-1");
        p.supervisor_id = Some("zz-doc".to_string());
        p.employer_id = Some("aa-emp".to_string());
        assert_eq!(
            ids(&for_practice(MessageKind::EvaluationRequested, &p)),
            vec!["aa-emp", "zz-doc"]
        );

        p.employer_id = Some("zz-doc".to_string());
        assert_eq!(
            ids(&for_practice(MessageKind::EvaluationRequested, &p)),
            vec!["zz-doc"]
        );
    }

    #[test]
    fn reminder_targets_only_missing_evaluators() {
        let mut p = practice_fixture("p-1");
        p.supervisor_id = Some("doc-1".to_string());
        p.employer_id = Some("emp-1".to_string());
        p.supervisor_evaluation = Some(EvaluationRecord {
            practice_id: p.id.clone(),
            author_role: AuthorRole::Docente,
            author_id: "doc-1".to_string(),
            grade: 6.0,
            comments: None,
            submitted_at: p.created_at,
        });
        assert_eq!(
            ids(&for_practice(MessageKind::EvaluationReminder, &p)),
            vec!["emp-1"]
        );
    }
}
