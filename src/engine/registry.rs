//! Listener registry.
//!
//! Tracks the queues of attached subscribers and enforces the global
//! subscriber limit. All mutation happens under one short-held mutex that is
//! never held across an await or a queue operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::EngineError;
use crate::models::Event;
use crate::utils::metrics::ACTIVE_STREAMS;

/// Identity of an attached listener, unique for the registry's lifetime.
pub type ListenerId = u64;

/// Write half of a listener queue; only the broadcaster sends on it.
pub type ListenerSender = broadcast::Sender<Arc<Event>>;

pub use tokio::sync::broadcast::error::RecvError;

#[derive(Default)]
struct RegistryState {
    listeners: BTreeMap<ListenerId, ListenerSender>,
    next_id: ListenerId,
    closed: bool,
}

/// Set of attached listener queues.
pub struct ListenerRegistry {
    state: Mutex<RegistryState>,
    max_total_clients: usize,
    queue_capacity: usize,
}

impl ListenerRegistry {
    /// Create a registry admitting at most `max_total_clients` listeners, each
    /// with a live queue of `queue_capacity` events.
    pub fn new(max_total_clients: usize, queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_total_clients,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Attach a new listener.
    ///
    /// The returned guard detaches on drop, so every exit path of the owning
    /// session releases its slot.
    pub fn attach(self: &Arc<Self>) -> Result<Listener, EngineError> {
        let (sender, receiver) = broadcast::channel(self.queue_capacity);

        let id = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(EngineError::Closed);
            }
            if state.listeners.len() >= self.max_total_clients {
                return Err(EngineError::ResourceExhausted {
                    max: self.max_total_clients,
                });
            }
            state.next_id += 1;
            let id = state.next_id;
            state.listeners.insert(id, sender);
            ACTIVE_STREAMS.add(1, &[]);
            id
        };

        debug!(listener_id = id, "Listener attached");
        Ok(Listener {
            id,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Remove a listener. Unknown ids are ignored.
    fn detach(&self, id: ListenerId) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.listeners.remove(&id).is_some();
            if removed {
                ACTIVE_STREAMS.add(-1, &[]);
            }
            removed
        };

        if removed {
            debug!(listener_id = id, "Listener detached");
        }
    }

    /// Queues of all currently attached listeners, in attach order.
    pub fn snapshot(&self) -> Vec<(ListenerId, ListenerSender)> {
        let state = self.state.lock();
        state
            .listeners
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect()
    }

    /// Number of attached listeners.
    pub fn len(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse new listeners and drop every queue's write half.
    ///
    /// Sessions see their queue close once they have drained it.
    pub fn close(&self) {
        let removed = {
            let mut state = self.state.lock();
            state.closed = true;
            let removed = std::mem::take(&mut state.listeners);
            ACTIVE_STREAMS.add(-(removed.len() as i64), &[]);
            removed
        };
        debug!(count = removed.len(), "Listener registry closed");
    }
}

/// An attached subscriber's live queue.
///
/// Dropping the listener detaches it from the registry.
pub struct Listener {
    id: ListenerId,
    receiver: broadcast::Receiver<Arc<Event>>,
    registry: Arc<ListenerRegistry>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next queued event.
    ///
    /// `RecvError::Lagged(n)` reports that the `n` oldest unread events were
    /// overwritten because the queue was full; reading continues with the
    /// oldest event still held.
    pub async fn recv(&mut self) -> Result<Arc<Event>, RecvError> {
        self.receiver.recv().await
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.registry.detach(self.id);
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}
