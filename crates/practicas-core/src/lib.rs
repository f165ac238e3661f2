//! Practicas core: coordination of academic internships.
//!
//! - [`lifecycle`]: the practice state machine with optimistic concurrency
//! - [`grade`] and [`weights`]: the weighted final-grade engine and its
//!   sum-to-100 configuration
//! - [`ledger`]: the append-only audit ledger
//! - [`notify`]: notification dispatch with bounded fan-out
//! - [`actas`]: read-side search over closed practices
//!
//! Persistence lives behind the traits in `practicas-state`; [`services`]
//! wires everything around one set of stores.

pub mod actas;
pub mod clock;
pub mod config;
pub mod domain;
pub mod grade;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod services;
pub mod telemetry;
pub mod weights;

#[cfg(test)]
mod testing;

pub use actas::{ActaFilter, ActaKind, ActaRepository, HistoricalActa};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use domain::{ActorContext, CoreError, CoreResult, ErrorKind, Role};
pub use grade::{compute_acta_grades, compute_base_grade, compute_final_grade, ActaGrades};
pub use ledger::{AuditFilter, AuditLedger};
pub use lifecycle::{
    EvaluationOutcome, NewPractice, PracticeStateMachine, TransitionOutcome,
};
pub use notify::{
    CancelHandle, CancelSignal, DispatchReport, MessageKind, NotificationDispatcher,
    NotificationEvent, NotificationStats, Recipient, TemplateRenderer, Transport,
};
pub use services::{PracticasCore, Stores};
pub use weights::{WeightConfig, WeightRegistry};
