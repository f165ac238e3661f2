//! Wiring of the core components around one set of stores.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use practicas_state::fakes::{MemoryAuditStore, MemoryPracticeStore, MemoryWeightStore};
use practicas_state::{AuditStore, PracticeStore, WeightStore};

use crate::actas::ActaRepository;
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::domain::CoreResult;
use crate::ledger::AuditLedger;
use crate::lifecycle::PracticeStateMachine;
use crate::notify::{
    self, CancelSignal, NotificationDispatcher, NotificationEvent, NotificationSink,
    TemplateRenderer, Transport,
};
use crate::weights::WeightRegistry;

/// The three persistence seams.
#[derive(Clone)]
pub struct Stores {
    pub practices: Arc<dyn PracticeStore>,
    pub weights: Arc<dyn WeightStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            practices: Arc::new(MemoryPracticeStore::new()),
            weights: Arc::new(MemoryWeightStore::new()),
            audit: Arc::new(MemoryAuditStore::new()),
        }
    }
}

/// Every core component, sharing one clock and one ledger.
pub struct PracticasCore {
    pub config: CoreConfig,
    pub clock: Arc<dyn Clock>,
    pub practices: Arc<dyn PracticeStore>,
    pub weights: Arc<WeightRegistry>,
    pub ledger: Arc<AuditLedger>,
    pub machine: PracticeStateMachine,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub actas: ActaRepository,
    sink: notify::ChannelSink,
}

impl PracticasCore {
    /// Wire the components. Milestone events from the state machine are
    /// queued on the returned receiver; hand it to [`PracticasCore::spawn_worker`].
    pub fn build(
        config: CoreConfig,
        stores: Stores,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn TemplateRenderer>,
        transport: Arc<dyn Transport>,
    ) -> CoreResult<(Self, mpsc::UnboundedReceiver<NotificationEvent>)> {
        config.validate()?;

        let weights = Arc::new(WeightRegistry::with_fallback(
            stores.weights,
            Arc::clone(&clock),
            config.default_weights()?,
        ));
        let ledger = Arc::new(
            AuditLedger::new(stores.audit, Arc::clone(&clock))
                .with_page_size(config.audit_page_size),
        );
        let (sink, rx) = notify::channel();
        let machine = PracticeStateMachine::new(
            Arc::clone(&stores.practices),
            Arc::clone(&weights),
            Arc::clone(&ledger),
            Arc::clone(&clock),
        )
        .with_notifier(Arc::new(sink.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&stores.practices),
            renderer,
            transport,
            Arc::clone(&ledger),
            (&config).into(),
        ));
        let actas = ActaRepository::new(Arc::clone(&stores.practices));

        let core = Self {
            config,
            clock,
            practices: stores.practices,
            weights,
            ledger,
            machine,
            dispatcher,
            actas,
            sink,
        };
        Ok((core, rx))
    }

    /// Start draining milestone events into the dispatcher.
    pub fn spawn_worker(
        &self,
        rx: mpsc::UnboundedReceiver<NotificationEvent>,
        cancel: CancelSignal,
    ) -> JoinHandle<usize> {
        notify::spawn_dispatch_worker(Arc::clone(&self.dispatcher), rx, cancel)
    }

    /// Queue reminders for every practice past its evaluation deadline.
    /// Returns how many were queued.
    pub async fn queue_due_reminders(&self, triggered_by: &str) -> CoreResult<usize> {
        let events = notify::due_reminders(
            self.practices.as_ref(),
            self.clock.now(),
            self.config.evaluation_deadline_days,
            triggered_by,
        )
        .await?;
        let mut queued = 0;
        for event in events {
            let subject = event.subject.clone();
            match self.sink.submit(event) {
                Ok(()) => queued += 1,
                Err(err) => crate::obs::emit_notification_dropped(&subject, &err),
            }
        }
        Ok(queued)
    }
}
