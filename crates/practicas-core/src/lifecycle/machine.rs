//! The practice state machine.
//!
//! Every write is a read followed by a conditional write on `version`. No
//! lock is held across an await; of two concurrent writers exactly one wins
//! and the other gets [`CoreError::Conflict`].

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use practicas_state::{
    ActionKind, AuditOutcome, AuthorRole, EvaluationRecord, FinalActaRecord, PracticeId,
    PracticeKind, PracticeRecord, PracticeState, PracticeStore, StorageError, SubjectRef,
};

use super::table;
use crate::clock::Clock;
use crate::domain::{ActorContext, CoreError, CoreResult, Role};
use crate::grade;
use crate::ledger::AuditLedger;
use crate::metrics::METRICS;
use crate::notify::{NotificationEvent, NotificationSink};
use crate::obs;
use crate::weights::WeightRegistry;

/// Input for [`PracticeStateMachine::register_practice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPractice {
    /// Generated when absent.
    pub id: Option<PracticeId>,
    pub kind: PracticeKind,
    pub student_id: String,
    pub student_name: String,
    pub supervisor_id: Option<String>,
    pub host_site_id: Option<String>,
    pub employer_id: Option<String>,
    pub program_id: String,
    pub academic_year: i32,
    pub semester: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// The practice as stored after the request.
    pub practice: PracticeRecord,
    pub from: PracticeState,
    /// False when nothing was written: closing an already-closed practice,
    /// or a close that lost its race to another close.
    pub applied: bool,
    pub final_acta: Option<FinalActaRecord>,
    pub audit_seq: Option<u64>,
    /// The transition stands even when its ledger entry was refused.
    pub audit_error: Option<CoreError>,
}

/// Result of an evaluation submission.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub practice: PracticeRecord,
    pub evaluation: EvaluationRecord,
    /// True when an earlier evaluation by the same author was replaced.
    pub resubmission: bool,
}

pub struct PracticeStateMachine {
    practices: Arc<dyn PracticeStore>,
    weights: Arc<WeightRegistry>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl PracticeStateMachine {
    pub fn new(
        practices: Arc<dyn PracticeStore>,
        weights: Arc<WeightRegistry>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            practices,
            weights,
            ledger,
            clock,
            notifier: None,
        }
    }

    /// Submit milestone notifications to `sink`.
    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    pub async fn load(&self, id: &PracticeId) -> CoreResult<PracticeRecord> {
        Ok(self.practices.load(id).await?)
    }

    /// Create a practice in `PENDIENTE` at version 1.
    pub async fn register_practice(&self, new: NewPractice) -> CoreResult<PracticeRecord> {
        let id = new.id.unwrap_or_default();
        if new.student_id.trim().is_empty() {
            return Err(CoreError::precondition(&id.0, "student id is empty"));
        }
        if !(1..=2).contains(&new.semester) {
            return Err(CoreError::precondition(
                &id.0,
                format!("semester must be 1 or 2, got {}", new.semester),
            ));
        }
        if new.end_date < new.start_date {
            return Err(CoreError::precondition(&id.0, "end date precedes start date"));
        }

        let now = self.clock.now();
        let record = PracticeRecord {
            id,
            kind: new.kind,
            state: PracticeState::Pendiente,
            version: 1,
            student_id: new.student_id,
            student_name: new.student_name,
            supervisor_id: new.supervisor_id,
            host_site_id: new.host_site_id,
            employer_id: new.employer_id,
            program_id: new.program_id,
            academic_year: new.academic_year,
            semester: new.semester,
            start_date: new.start_date,
            end_date: new.end_date,
            supervisor_evaluation: None,
            employer_evaluation: None,
            final_acta: None,
            created_at: now,
            state_changed_at: now,
        };
        self.practices.insert(record.clone()).await?;
        tracing::info!(
            event = "practice.registered",
            practice_id = %record.id,
            kind = %record.kind,
            student_id = %record.student_id,
        );
        Ok(record)
    }

    /// Assign (or reassign) the faculty supervisor. Staff only, and only
    /// before a supervisor has accepted.
    #[instrument(name = "practicas.practice", skip_all, fields(practice_id = %id))]
    pub async fn assign_supervisor(
        &self,
        id: &PracticeId,
        supervisor_id: &str,
        actor: &ActorContext,
    ) -> CoreResult<PracticeRecord> {
        if !actor.role.is_staff() {
            return Err(CoreError::precondition(
                &id.0,
                format!("{} may not assign supervisors", actor.role),
            ));
        }
        let current = self.practices.load(id).await?;
        if !matches!(
            current.state,
            PracticeState::Pendiente | PracticeState::RechazadaDocente
        ) {
            return Err(CoreError::precondition(
                &id.0,
                format!("supervisor cannot be assigned in {}", current.state),
            ));
        }

        let mut next = current.clone();
        next.supervisor_id = Some(supervisor_id.to_string());
        let stored = self.swap(&current, next).await?;
        tracing::info!(
            event = "practice.supervisor_assigned",
            supervisor_id = %supervisor_id,
            actor_id = %actor.actor_id,
        );
        Ok(stored)
    }

    /// Store (or replace) the actor's evaluation. The grade is validated
    /// before anything is read or written.
    #[instrument(name = "practicas.practice", skip_all, fields(practice_id = %id))]
    pub async fn submit_evaluation(
        &self,
        id: &PracticeId,
        value: f64,
        comments: Option<String>,
        actor: &ActorContext,
    ) -> CoreResult<EvaluationOutcome> {
        let grade = grade::validate_grade(value)?;
        let author = actor.role.author_role().ok_or_else(|| {
            CoreError::precondition(&id.0, format!("{} may not submit evaluations", actor.role))
        })?;

        let current = self.practices.load(id).await?;
        if !matches!(
            current.state,
            PracticeState::FinalizadaPendienteEval | PracticeState::EvaluacionCompleta
        ) {
            return Err(CoreError::precondition(
                &id.0,
                format!("evaluations are not accepted in {}", current.state),
            ));
        }
        let assigned = match author {
            AuthorRole::Docente => current.supervisor_id.as_deref(),
            AuthorRole::Empleador => current.employer_id.as_deref(),
        };
        if assigned != Some(actor.actor_id.as_str()) {
            return Err(CoreError::precondition(
                &id.0,
                format!("{} is not the assigned {author}", actor.actor_id),
            ));
        }

        let evaluation = EvaluationRecord {
            practice_id: current.id.clone(),
            author_role: author,
            author_id: actor.actor_id.clone(),
            grade,
            comments,
            submitted_at: self.clock.now(),
        };
        let resubmission = current.evaluation(author).is_some();
        let mut next = current.clone();
        match author {
            AuthorRole::Docente => next.supervisor_evaluation = Some(evaluation.clone()),
            AuthorRole::Empleador => next.employer_evaluation = Some(evaluation.clone()),
        }
        let practice = self.swap(&current, next).await?;
        obs::emit_evaluation_submitted(&id.0, &author.to_string(), grade, resubmission);

        Ok(EvaluationOutcome {
            practice,
            evaluation,
            resubmission,
        })
    }

    /// Move a practice to `target`.
    ///
    /// Closing computes both acta grades with the current weights and writes
    /// the acta in the same conditional write as the state. Closing a closed
    /// practice returns the existing acta without writing anything.
    #[instrument(name = "practicas.practice", skip_all, fields(practice_id = %id, target = %target))]
    pub async fn request_transition(
        &self,
        id: &PracticeId,
        target: PracticeState,
        actor: &ActorContext,
    ) -> CoreResult<TransitionOutcome> {
        let current = self.practices.load(id).await?;
        if let Some(outcome) = already_closed(&current, target) {
            return Ok(outcome);
        }

        if !table::is_allowed(current.state, target) {
            let err = CoreError::InvalidTransition {
                practice_id: id.0.clone(),
                from: current.state,
                to: target,
            };
            obs::emit_transition_rejected(&id.0, current.state, target, &err);
            return Err(err);
        }
        if let Err(reason) = check_preconditions(&current, target, actor) {
            obs::emit_transition_rejected(&id.0, current.state, target, &reason);
            return Err(CoreError::precondition(&id.0, reason));
        }

        let now = self.clock.now();
        let mut next = current.clone();
        next.state = target;
        next.state_changed_at = now;
        if target == PracticeState::Cerrada {
            next.final_acta = Some(self.build_acta(&current, actor).await?);
        }

        let stored = match self.swap(&current, next).await {
            Ok(stored) => stored,
            Err(err @ CoreError::Conflict { .. }) if target == PracticeState::Cerrada => {
                // the winner may have closed it; its acta is the answer
                let latest = self.practices.load(id).await?;
                return already_closed(&latest, target).ok_or(err);
            }
            Err(err) => return Err(err),
        };

        METRICS.inc_transitions();
        obs::emit_transition_applied(&id.0, current.state, target, &actor.actor_id, stored.version);
        if let Some(acta) = &stored.final_acta {
            obs::emit_acta_closed(&id.0, acta.nota_ponderada, false);
        }

        let mut payload = json!({
            "from": current.state.as_str(),
            "to": target.as_str(),
            "version": stored.version,
            "role": actor.role.to_string(),
        });
        if let Some(acta) = &stored.final_acta {
            payload["nota_base"] = json!(acta.nota_base);
            payload["nota_ponderada"] = json!(acta.nota_ponderada);
            payload["weights_version"] = json!(acta.weights.version);
        }
        let (audit_seq, audit_error) = match self
            .ledger
            .record(
                ActionKind::StateTransition,
                &actor.actor_id,
                SubjectRef::Practice(id.0.clone()),
                payload,
                AuditOutcome::Success,
            )
            .await
        {
            Ok(seq) => (Some(seq), None),
            Err(err) => (None, Some(err)),
        };

        if let Some(kind) = table::milestone(target) {
            self.notify(NotificationEvent::for_practice(kind, id, &actor.actor_id));
        }

        Ok(TransitionOutcome {
            final_acta: stored.final_acta.clone(),
            practice: stored,
            from: current.state,
            applied: true,
            audit_seq,
            audit_error,
        })
    }

    async fn build_acta(
        &self,
        practice: &PracticeRecord,
        actor: &ActorContext,
    ) -> CoreResult<FinalActaRecord> {
        let (Some(informe), Some(empleador)) = (
            practice.supervisor_evaluation.as_ref(),
            practice.employer_evaluation.as_ref(),
        ) else {
            return Err(CoreError::precondition(
                &practice.id.0,
                "both evaluations are required to close",
            ));
        };

        let weights = self.weights.current().await?;
        let grades = grade::compute_acta_grades(informe.grade, empleador.grade, &weights)?;
        Ok(FinalActaRecord {
            practice_id: practice.id.clone(),
            nota_base: grades.nota_base,
            nota_ponderada: grades.nota_ponderada,
            weights: grades.weights.snapshot(),
            closed_at: self.clock.now(),
            closed_by: actor.actor_id.clone(),
            comments: None,
        })
    }

    async fn swap(
        &self,
        current: &PracticeRecord,
        next: PracticeRecord,
    ) -> CoreResult<PracticeRecord> {
        match self.practices.compare_and_swap(current.version, next).await {
            Ok(stored) => Ok(stored),
            Err(StorageError::VersionConflict { id, expected, .. }) => {
                METRICS.inc_conflicts();
                obs::emit_conflict(&id, expected);
                Err(CoreError::Conflict {
                    practice_id: id,
                    expected,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn notify(&self, event: NotificationEvent) {
        let Some(sink) = &self.notifier else {
            return;
        };
        let subject = event.subject.clone();
        if let Err(err) = sink.submit(event) {
            obs::emit_notification_dropped(&subject, &err);
        }
    }
}

/// The no-op outcome for closing a practice that already carries its acta.
fn already_closed(practice: &PracticeRecord, target: PracticeState) -> Option<TransitionOutcome> {
    if target != PracticeState::Cerrada || practice.state != PracticeState::Cerrada {
        return None;
    }
    let acta = practice.final_acta.clone()?;
    obs::emit_acta_closed(&practice.id.0, acta.nota_ponderada, true);
    Some(TransitionOutcome {
        practice: practice.clone(),
        from: PracticeState::Cerrada,
        applied: false,
        final_acta: Some(acta),
        audit_seq: None,
        audit_error: None,
    })
}

fn is_assigned_supervisor(practice: &PracticeRecord, actor: &ActorContext) -> bool {
    actor.role == Role::Docente && practice.supervisor_id.as_deref() == Some(actor.actor_id.as_str())
}

/// Role and data checks for an edge already known to be in the table.
fn check_preconditions(
    practice: &PracticeRecord,
    target: PracticeState,
    actor: &ActorContext,
) -> Result<(), String> {
    let staff = actor.role.is_staff();
    match target {
        PracticeState::PendienteAceptacionDocente => {
            let owner = actor.role == Role::Estudiante && actor.actor_id == practice.student_id;
            if !(staff || owner) {
                return Err(format!("{} may not submit this practice", actor.role));
            }
            if practice.supervisor_id.is_none() {
                return Err("no supervisor assigned".to_string());
            }
        }
        PracticeState::Anulada => {
            if !staff {
                return Err(format!("{} may not annul a practice", actor.role));
            }
        }
        PracticeState::EvaluacionCompleta | PracticeState::Cerrada => {
            if !(staff || is_assigned_supervisor(practice, actor)) {
                return Err(format!("{} may not request {target}", actor.role));
            }
            if !practice.has_both_evaluations() {
                return Err("both evaluations are required".to_string());
            }
        }
        PracticeState::EnCurso
        | PracticeState::RechazadaDocente
        | PracticeState::FinalizadaPendienteEval => {
            if !(staff || is_assigned_supervisor(practice, actor)) {
                return Err(format!(
                    "only the assigned supervisor or staff may request {target}"
                ));
            }
        }
        PracticeState::Pendiente => {}
    }
    Ok(())
}
