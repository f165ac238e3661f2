//! Hand-off between the state machine and the dispatcher.
//!
//! The state machine only submits events; it never waits for a send. A
//! background worker drains the queue and dispatches each event.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{CancelSignal, NotificationDispatcher, NotificationEvent};
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification queue closed")]
pub struct QueueClosed;

/// Accepts events without blocking the caller.
pub trait NotificationSink: Send + Sync {
    fn submit(&self, event: NotificationEvent) -> Result<(), QueueClosed>;
}

/// [`NotificationSink`] backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl NotificationSink for ChannelSink {
    fn submit(&self, event: NotificationEvent) -> Result<(), QueueClosed> {
        self.tx.send(event).map_err(|_| QueueClosed)
    }
}

/// Create a sink and the receiver a worker drains.
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<NotificationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

/// Drain `rx` until every sink is dropped or `cancel` fires, dispatching each
/// event in arrival order. Resolves to the number of events dispatched.
///
/// Events still queued when `cancel` fires are dispatched with the fired
/// signal, so each of their recipients is recorded as a cancelled
/// `NOTIFICATION_FAILED` attempt. A dispatch that fails to resolve its
/// recipients is logged and skipped.
pub fn spawn_dispatch_worker(
    dispatcher: Arc<NotificationDispatcher>,
    mut rx: mpsc::UnboundedReceiver<NotificationEvent>,
    cancel: CancelSignal,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut dispatched = 0usize;
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if dispatch(&dispatcher, &event, &cancel).await {
                dispatched += 1;
            }
        }
        if cancel.is_cancelled() {
            let mut abandoned = 0usize;
            while let Ok(event) = rx.try_recv() {
                if dispatch(&dispatcher, &event, &cancel).await {
                    abandoned += 1;
                }
            }
            dispatched += abandoned;
            warn!(dispatched, abandoned, "dispatch worker cancelled");
        } else {
            info!(dispatched, "dispatch worker drained");
        }
        dispatched
    })
}

async fn dispatch(
    dispatcher: &NotificationDispatcher,
    event: &NotificationEvent,
    cancel: &CancelSignal,
) -> bool {
    match dispatcher.dispatch(event, cancel).await {
        Ok(_) => true,
        Err(err) => {
            obs::emit_notification_dropped(&event.subject, &err);
            false
        }
    }
}
