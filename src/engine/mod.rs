//! Event engine.
//!
//! Owns the write path (append, then broadcast), the listener registry and
//! the broadcaster actor. Front doors talk to the engine only.

mod broadcaster;
mod error;
mod registry;
mod subscription;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamLimits;
use crate::models::{Event, NewEvent};
use crate::storage::EventStore;

pub use broadcaster::{dispatch, EventEmitter};
pub use error::EngineError;
pub use registry::{Listener, ListenerId, ListenerRegistry};
pub use subscription::{Batch, SessionState, Subscription};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

struct EngineInner {
    store: Arc<dyn EventStore>,
    registry: Arc<ListenerRegistry>,
    emitter: EventEmitter,
    /// Held across append and enqueue so the broadcaster sees ids in order.
    write_order: tokio::sync::Mutex<()>,
    limits: StreamLimits,
    shutdown: CancellationToken,
    broadcaster: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to the event engine.
#[derive(Clone)]
pub struct EventsEngine {
    inner: Arc<EngineInner>,
}

impl EventsEngine {
    /// Build the engine and spawn its broadcaster on the current runtime.
    pub fn new(store: Arc<dyn EventStore>, limits: StreamLimits) -> Self {
        let registry = Arc::new(ListenerRegistry::new(
            limits.max_total_clients,
            limits.client_buffer_size,
        ));
        let shutdown = CancellationToken::new();
        let (emitter, handle) = broadcaster::spawn(
            Arc::clone(&registry),
            limits.emitter_buffer_size,
            shutdown.clone(),
        );

        info!(
            max_total_clients = limits.max_total_clients,
            client_buffer_size = limits.client_buffer_size,
            emitter_buffer_size = limits.emitter_buffer_size,
            stream_batch_size = limits.stream_batch_size,
            "Event engine started"
        );

        Self {
            inner: Arc::new(EngineInner {
                store,
                registry,
                emitter,
                write_order: tokio::sync::Mutex::new(()),
                limits,
                shutdown,
                broadcaster: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Persist an event and fan it out to live subscribers.
    ///
    /// The append and the enqueue run on a detached task, so a caller that
    /// goes away mid-request cannot leave an event persisted but never
    /// broadcast.
    pub async fn create_event(&self, event: NewEvent) -> Result<Event> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::Closed);
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _order = inner.write_order.lock().await;
            let id = inner.store.append(&event).await?;
            let event = Arc::new(event.with_id(id));

            if let Err(e) = inner.emitter.emit(Arc::clone(&event)).await {
                warn!(id, subject = %event.subject, error = %e, "Event stored but not broadcast");
            }
            Ok::<_, EngineError>(event)
        });

        let event = task
            .await
            .map_err(|e| EngineError::Internal(format!("write task failed: {e}")))??;

        debug!(id = event.id, subject = %event.subject, "Event created");
        Ok(Arc::unwrap_or_clone(event))
    }

    /// Point lookup by id.
    pub async fn get_event(&self, id: i64) -> Result<Event> {
        Ok(self.inner.store.get_by_id(id).await?)
    }

    /// Distinct subjects with at least one event, sorted ascending.
    pub async fn list_subjects(&self) -> Result<Vec<String>> {
        Ok(self.inner.store.list_subjects().await?)
    }

    /// Open a subscription to `subject` for events with id greater than
    /// `after_id`.
    ///
    /// The listener is attached before this returns, so capacity errors
    /// surface before the caller opens its stream and no event created after
    /// this call can be missed.
    pub fn subscribe(
        &self,
        subject: impl Into<String>,
        after_id: i64,
        cancel: CancellationToken,
    ) -> Result<Subscription> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(EngineError::InvalidArgument(
                "subject must not be empty".to_string(),
            ));
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::Closed);
        }

        let listener = self.inner.registry.attach().inspect_err(|e| {
            warn!(subject = %subject, error = %e, "Subscription refused");
        })?;

        info!(
            subject = %subject,
            after_id,
            listener_id = listener.id(),
            "Subscription opened"
        );

        Ok(Subscription::new(
            subject,
            after_id,
            listener,
            Arc::clone(&self.inner.store),
            self.inner.limits.stream_batch_size,
            cancel,
            self.inner.shutdown.clone(),
        ))
    }

    /// Number of attached subscribers.
    pub fn active_listeners(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting writes and subscriptions, end live sessions, and wait
    /// for the broadcaster to flush its queue.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!(
            active_listeners = self.active_listeners(),
            "Shutting down event engine"
        );
        self.inner.shutdown.cancel();

        let handle = self.inner.broadcaster.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Broadcaster task failed");
            }
        }
        self.inner.registry.close();
    }
}
