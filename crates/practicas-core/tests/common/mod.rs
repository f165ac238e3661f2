//! Shared harness for practicas-core integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::mpsc;

use practicas_core::notify::{PlainTextRenderer, RenderedMessage, TransportError};
use practicas_core::{
    ActorContext, CoreConfig, ManualClock, NewPractice, NotificationEvent, PracticasCore,
    Recipient, Role, Stores, Transport,
};
use practicas_state::fakes::{MemoryAuditStore, MemoryPracticeStore, MemoryWeightStore};
use practicas_state::{PracticeId, PracticeKind, PracticeState};

/// Transport that records deliveries and fails for chosen recipients.
#[derive(Default)]
pub struct RecordingTransport {
    failing: Mutex<HashSet<String>>,
    delivered: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn fail_for(&self, recipient_id: &str) {
        self.failing.lock().unwrap().insert(recipient_id.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// (recipient id, message subject) pairs in delivery order.
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        recipient: &Recipient,
        message: &RenderedMessage,
    ) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(&recipient.id) {
            return Err(TransportError::Unreachable("smtp relay down".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((recipient.id.clone(), message.subject.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub core: PracticasCore,
    pub events: mpsc::UnboundedReceiver<NotificationEvent>,
    pub audit: Arc<MemoryAuditStore>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
}

impl Harness {
    /// Events queued by the state machine so far.
    pub fn drain_events(&mut self) -> Vec<NotificationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(Arc::new(MemoryPracticeStore::new()))
}

pub fn harness_with(practices: Arc<dyn practicas_state::PracticeStore>) -> Harness {
    let audit = Arc::new(MemoryAuditStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let transport = Arc::new(RecordingTransport::default());
    let stores = Stores {
        practices,
        weights: Arc::new(MemoryWeightStore::new()),
        audit: audit.clone(),
    };
    let (core, events) = PracticasCore::build(
        CoreConfig::default(),
        stores,
        clock.clone(),
        Arc::new(PlainTextRenderer),
        transport.clone(),
    )
    .expect("default config is valid");
    Harness {
        core,
        events,
        audit,
        clock,
        transport,
    }
}

pub fn coordinator() -> ActorContext {
    ActorContext::coordinator("coord-1")
}

pub fn supervisor() -> ActorContext {
    ActorContext::new("doc-1", Role::Docente)
}

pub fn employer() -> ActorContext {
    ActorContext::new("emp-1", Role::Empleador)
}

pub fn new_practice(id: &str) -> NewPractice {
    NewPractice {
        id: Some(PracticeId::from(id)),
        kind: PracticeKind::Profesional,
        student_id: "stu-1".to_string(),
        student_name: "Ana Pérez".to_string(),
        supervisor_id: None,
        host_site_id: Some("site-1".to_string()),
        employer_id: Some("emp-1".to_string()),
        program_id: "ICI".to_string(),
        academic_year: 2024,
        semester: 1,
        start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
    }
}

/// Register `id` and drive it to `FINALIZADA_PENDIENTE_EVAL` via the happy path.
pub async fn finished_practice(h: &Harness, id: &str) -> PracticeId {
    let pid = PracticeId::from(id);
    let m = &h.core.machine;
    m.register_practice(new_practice(id)).await.unwrap();
    m.assign_supervisor(&pid, "doc-1", &coordinator())
        .await
        .unwrap();
    m.request_transition(&pid, PracticeState::PendienteAceptacionDocente, &coordinator())
        .await
        .unwrap();
    m.request_transition(&pid, PracticeState::EnCurso, &supervisor())
        .await
        .unwrap();
    m.request_transition(&pid, PracticeState::FinalizadaPendienteEval, &supervisor())
        .await
        .unwrap();
    pid
}

/// [`finished_practice`] plus both evaluations and `EVALUACION_COMPLETA`.
pub async fn evaluated_practice(h: &Harness, id: &str, informe: f64, empleador: f64) -> PracticeId {
    let pid = finished_practice(h, id).await;
    let m = &h.core.machine;
    m.submit_evaluation(&pid, informe, None, &supervisor())
        .await
        .unwrap();
    m.submit_evaluation(&pid, empleador, None, &employer())
        .await
        .unwrap();
    m.request_transition(&pid, PracticeState::EvaluacionCompleta, &supervisor())
        .await
        .unwrap();
    pid
}
