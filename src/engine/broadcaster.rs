//! Broadcaster actor.
//!
//! Single consumer of the engine's inbound event queue. Each event is
//! offered to every attached listener queue; offering never blocks, so one
//! slow subscriber cannot delay the others or the producers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::registry::ListenerRegistry;
use super::EngineError;
use crate::models::Event;

/// Producer half of the broadcaster's inbound queue.
#[derive(Clone)]
pub struct EventEmitter {
    sender: mpsc::Sender<Arc<Event>>,
}

impl EventEmitter {
    /// Enqueue an event for fan-out, waiting while the queue is full.
    pub async fn emit(&self, event: Arc<Event>) -> Result<(), EngineError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| EngineError::Closed)
    }
}

/// Spawn the broadcaster on the current runtime.
///
/// The actor runs until every emitter is dropped or `shutdown` fires. On
/// shutdown it stops accepting events and fans out whatever is still queued
/// before exiting.
pub fn spawn(
    registry: Arc<ListenerRegistry>,
    capacity: usize,
    shutdown: CancellationToken,
) -> (EventEmitter, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run(registry, receiver, shutdown));
    (EventEmitter { sender }, handle)
}

async fn run(
    registry: Arc<ListenerRegistry>,
    mut inbound: mpsc::Receiver<Arc<Event>>,
    shutdown: CancellationToken,
) {
    debug!("Broadcaster started");

    loop {
        tokio::select! {
            biased;
            event = inbound.recv() => match event {
                Some(event) => {
                    dispatch(&registry, &event);
                }
                None => break,
            },
            _ = shutdown.cancelled() => {
                inbound.close();
                while let Some(event) = inbound.recv().await {
                    dispatch(&registry, &event);
                }
                break;
            }
        }
    }

    info!("Broadcaster stopped");
}

/// Offer one event to every currently attached listener.
///
/// Returns the number of queues the event was placed on. A full queue
/// overwrites its oldest entry; a queue whose reader is gone is skipped.
pub fn dispatch(registry: &ListenerRegistry, event: &Arc<Event>) -> usize {
    let mut delivered = 0;
    for (listener_id, sender) in registry.snapshot() {
        match sender.send(Arc::clone(event)) {
            Ok(_) => delivered += 1,
            Err(_) => trace!(listener_id, id = event.id, "Listener queue has no reader"),
        }
    }
    trace!(id = event.id, subject = %event.subject, delivered, "Event dispatched");
    delivered
}
