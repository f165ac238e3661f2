//! Shared unit-test fixtures.

use chrono::{NaiveDate, TimeZone, Utc};

use practicas_state::{PracticeId, PracticeKind, PracticeRecord, PracticeState};

/// A `PENDIENTE` practice with no supervisor, employer or evaluations.
pub(crate) fn practice_fixture(id: &str) -> PracticeRecord {
    let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    PracticeRecord {
        id: PracticeId::from(id),
        kind: PracticeKind::Laboral,
        state: PracticeState::Pendiente,
        version: 1,
        student_id: "stu-1".to_string(),
        student_name: "Ana Pérez".to_string(),
        supervisor_id: None,
        host_site_id: None,
        employer_id: None,
        program_id: "ICI".to_string(),
        academic_year: 2024,
        semester: 1,
        start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        supervisor_evaluation: None,
        employer_evaluation: None,
        final_acta: None,
        created_at: created,
        state_changed_at: created,
    }
}
