//! Record definitions for the practicas store
//!
//! Records:
//! - `PracticeRecord`: one internship engagement, versioned for optimistic writes
//! - `EvaluationRecord`: a supervisor or employer evaluation embedded in a practice
//! - `FinalActaRecord`: the closing artifact, written together with `CERRADA`
//! - `WeightRecord`: one accepted informe/empleador weight pair
//! - `AuditRecord`: one append-only ledger entry

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Practice
// ---------------------------------------------------------------------------

/// Unique identifier for a practice
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PracticeId(pub String);

impl PracticeId {
    /// Generate a new random PracticeId
    pub fn new() -> Self {
        PracticeId(Uuid::new_v4().to_string())
    }
}

impl Default for PracticeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PracticeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PracticeId {
    fn from(s: &str) -> Self {
        PracticeId(s.to_string())
    }
}

/// Kind of internship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PracticeKind {
    Laboral,
    Profesional,
}

impl fmt::Display for PracticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PracticeKind::Laboral => write!(f, "LABORAL"),
            PracticeKind::Profesional => write!(f, "PROFESIONAL"),
        }
    }
}

/// Lifecycle state of a practice.
///
/// Legal edges between these states live in the core crate; the store only
/// persists whichever state it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PracticeState {
    Pendiente,
    PendienteAceptacionDocente,
    EnCurso,
    RechazadaDocente,
    FinalizadaPendienteEval,
    EvaluacionCompleta,
    Cerrada,
    Anulada,
}

impl PracticeState {
    /// Every state, in lifecycle order.
    pub const ALL: [PracticeState; 8] = [
        PracticeState::Pendiente,
        PracticeState::PendienteAceptacionDocente,
        PracticeState::EnCurso,
        PracticeState::RechazadaDocente,
        PracticeState::FinalizadaPendienteEval,
        PracticeState::EvaluacionCompleta,
        PracticeState::Cerrada,
        PracticeState::Anulada,
    ];

    /// `CERRADA` and `ANULADA` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, PracticeState::Cerrada | PracticeState::Anulada)
    }

    /// Wire name, e.g. `PENDIENTE_ACEPTACION_DOCENTE`.
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeState::Pendiente => "PENDIENTE",
            PracticeState::PendienteAceptacionDocente => "PENDIENTE_ACEPTACION_DOCENTE",
            PracticeState::EnCurso => "EN_CURSO",
            PracticeState::RechazadaDocente => "RECHAZADA_DOCENTE",
            PracticeState::FinalizadaPendienteEval => "FINALIZADA_PENDIENTE_EVAL",
            PracticeState::EvaluacionCompleta => "EVALUACION_COMPLETA",
            PracticeState::Cerrada => "CERRADA",
            PracticeState::Anulada => "ANULADA",
        }
    }
}

impl fmt::Display for PracticeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PracticeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        PracticeState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown practice state: {s}"))
    }
}

/// Who authored an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorRole {
    /// Faculty supervisor; grades the student's report ("informe").
    Docente,
    /// Host organization contact.
    Empleador,
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorRole::Docente => write!(f, "DOCENTE"),
            AuthorRole::Empleador => write!(f, "EMPLEADOR"),
        }
    }
}

/// A submitted evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub practice_id: PracticeId,
    pub author_role: AuthorRole,
    pub author_id: String,
    /// Grade on the 1.0–7.0 scale.
    pub grade: f64,
    pub comments: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Weight pair captured at closing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub informe_weight: u8,
    pub empleador_weight: u8,
    pub version: u64,
}

/// The closing artifact of a practice. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalActaRecord {
    pub practice_id: PracticeId,
    pub nota_base: f64,
    pub nota_ponderada: f64,
    pub weights: WeightSnapshot,
    pub closed_at: DateTime<Utc>,
    pub closed_by: String,
    pub comments: Option<String>,
}

/// Full practice record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeRecord {
    pub id: PracticeId,
    pub kind: PracticeKind,
    pub state: PracticeState,
    /// Optimistic concurrency token; bumped by the store on every write.
    pub version: u64,
    pub student_id: String,
    pub student_name: String,
    pub supervisor_id: Option<String>,
    pub host_site_id: Option<String>,
    pub employer_id: Option<String>,
    pub program_id: String,
    pub academic_year: i32,
    /// 1 or 2
    pub semester: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub supervisor_evaluation: Option<EvaluationRecord>,
    pub employer_evaluation: Option<EvaluationRecord>,
    pub final_acta: Option<FinalActaRecord>,
    pub created_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
}

impl PracticeRecord {
    /// True once both the supervisor and the employer evaluation are present.
    pub fn has_both_evaluations(&self) -> bool {
        self.supervisor_evaluation.is_some() && self.employer_evaluation.is_some()
    }

    /// Evaluation slot for the given author.
    pub fn evaluation(&self, role: AuthorRole) -> Option<&EvaluationRecord> {
        match role {
            AuthorRole::Docente => self.supervisor_evaluation.as_ref(),
            AuthorRole::Empleador => self.employer_evaluation.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// One accepted weight configuration. Superseded by replacement, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub informe_weight: u8,
    pub empleador_weight: u8,
    /// Assigned by the store: 1 for the first accepted pair, then +1.
    pub version: u64,
    pub replaced_at: DateTime<Utc>,
    pub replaced_by: String,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Classification of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    StateTransition,
    NotificationSent,
    NotificationFailed,
    SensitiveRead,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::StateTransition => "STATE_TRANSITION",
            ActionKind::NotificationSent => "NOTIFICATION_SENT",
            ActionKind::NotificationFailed => "NOTIFICATION_FAILED",
            ActionKind::SensitiveRead => "SENSITIVE_READ",
        }
    }

    pub fn is_notification(self) -> bool {
        matches!(
            self,
            ActionKind::NotificationSent | ActionKind::NotificationFailed
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity an audit entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    Practice(String),
    User(String),
    Config(String),
}

impl SubjectRef {
    pub fn entity_type(&self) -> &'static str {
        match self {
            SubjectRef::Practice(_) => "practice",
            SubjectRef::User(_) => "user",
            SubjectRef::Config(_) => "config",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SubjectRef::Practice(id) | SubjectRef::User(id) | SubjectRef::Config(id) => id,
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type(), self.id())
    }
}

/// Result of the audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { detail: Option<String> },
}

impl AuditOutcome {
    pub fn failure(detail: impl Into<String>) -> Self {
        AuditOutcome::Failure {
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuditOutcome::Success)
    }
}

/// Entry handed to the store; `seq` is assigned on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub actor_id: String,
    pub subject: SubjectRef,
    /// JSON object with action-specific fields.
    pub payload: serde_json::Value,
    pub outcome: AuditOutcome,
}

/// Stored ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic, gap-free sequence assigned by the store (starts at 1).
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub actor_id: String,
    pub subject: SubjectRef,
    pub payload: serde_json::Value,
    pub outcome: AuditOutcome,
}

impl AuditRecord {
    pub fn from_new(seq: u64, entry: NewAuditEntry) -> Self {
        Self {
            seq,
            timestamp: entry.timestamp,
            action: entry.action,
            actor_id: entry.actor_id,
            subject: entry.subject,
            payload: entry.payload,
            outcome: entry.outcome,
        }
    }

    /// String field from the payload object, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}
