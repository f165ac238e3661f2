//! Read-side search over practices and their actas.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use practicas_state::{PracticeId, PracticeKind, PracticeRecord, PracticeState, PracticeStore};

use crate::domain::CoreResult;

/// Which acta a search returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActaKind {
    /// Evaluation-stage acta: available once the practice finished, whether
    /// or not it has been closed. Annulled practices never have one.
    #[serde(rename = "ACTA_1")]
    Acta1,
    /// Closing acta: closed practices only.
    #[default]
    Final,
}

impl ActaKind {
    pub fn includes(self, state: PracticeState) -> bool {
        match self {
            ActaKind::Acta1 => matches!(
                state,
                PracticeState::FinalizadaPendienteEval
                    | PracticeState::EvaluacionCompleta
                    | PracticeState::Cerrada
            ),
            ActaKind::Final => state == PracticeState::Cerrada,
        }
    }
}

impl fmt::Display for ActaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActaKind::Acta1 => f.write_str("ACTA_1"),
            ActaKind::Final => f.write_str("FINAL"),
        }
    }
}

impl std::str::FromStr for ActaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ACTA_1" | "ACTA1" => Ok(ActaKind::Acta1),
            "FINAL" => Ok(ActaKind::Final),
            other => Err(format!("unknown acta kind: {other}")),
        }
    }
}

/// Conjunctive search filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActaFilter {
    /// Case-insensitive substring of the student's name or id.
    pub student: Option<String>,
    pub host_site_id: Option<String>,
    pub program_id: Option<String>,
    pub academic_year: Option<i32>,
    pub semester: Option<u8>,
    pub kind: ActaKind,
}

impl ActaFilter {
    pub fn matches(&self, practice: &PracticeRecord) -> bool {
        if !self.kind.includes(practice.state) {
            return false;
        }
        if let Some(needle) = &self.student {
            let needle = needle.to_lowercase();
            if !practice.student_name.to_lowercase().contains(&needle)
                && !practice.student_id.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        self.host_site_id
            .as_ref()
            .map_or(true, |h| practice.host_site_id.as_ref() == Some(h))
            && self
                .program_id
                .as_ref()
                .map_or(true, |p| &practice.program_id == p)
            && self
                .academic_year
                .map_or(true, |y| practice.academic_year == y)
            && self.semester.map_or(true, |s| practice.semester == s)
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalActa {
    pub kind: ActaKind,
    pub practice_id: PracticeId,
    pub practice_kind: PracticeKind,
    pub state: PracticeState,
    pub student_id: String,
    pub student_name: String,
    pub host_site_id: Option<String>,
    pub program_id: String,
    pub academic_year: i32,
    pub semester: u8,
    pub supervisor_grade: Option<f64>,
    pub employer_grade: Option<f64>,
    pub nota_base: Option<f64>,
    pub nota_ponderada: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
}

impl HistoricalActa {
    fn from_practice(kind: ActaKind, p: &PracticeRecord) -> Self {
        let acta = p.final_acta.as_ref();
        Self {
            kind,
            practice_id: p.id.clone(),
            practice_kind: p.kind,
            state: p.state,
            student_id: p.student_id.clone(),
            student_name: p.student_name.clone(),
            host_site_id: p.host_site_id.clone(),
            program_id: p.program_id.clone(),
            academic_year: p.academic_year,
            semester: p.semester,
            supervisor_grade: p.supervisor_evaluation.as_ref().map(|e| e.grade),
            employer_grade: p.employer_evaluation.as_ref().map(|e| e.grade),
            nota_base: acta.map(|a| a.nota_base),
            nota_ponderada: acta.map(|a| a.nota_ponderada),
            closed_at: acta.map(|a| a.closed_at),
            closed_by: acta.map(|a| a.closed_by.clone()),
        }
    }
}

pub struct ActaRepository {
    practices: Arc<dyn PracticeStore>,
}

impl ActaRepository {
    pub fn new(practices: Arc<dyn PracticeStore>) -> Self {
        Self { practices }
    }

    /// All actas matching `filter`, ordered by year, semester, student name
    /// and practice id. Read-only.
    pub async fn search(&self, filter: &ActaFilter) -> CoreResult<Vec<HistoricalActa>> {
        let mut hits: Vec<HistoricalActa> = self
            .practices
            .list()
            .await?
            .iter()
            .filter(|p| filter.matches(p))
            .map(|p| HistoricalActa::from_practice(filter.kind, p))
            .collect();
        hits.sort_by(|a, b| {
            (a.academic_year, a.semester, &a.student_name, &a.practice_id).cmp(&(
                b.academic_year,
                b.semester,
                &b.student_name,
                &b.practice_id,
            ))
        });
        tracing::debug!(kind = %filter.kind, hits = hits.len(), "acta search");
        Ok(hits)
    }
}
