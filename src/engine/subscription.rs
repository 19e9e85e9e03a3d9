//! Per-subscriber session.
//!
//! A session is attached to the registry before it reads any history, then
//! replays the durable log from its cursor (CATCHUP) and finally drains its
//! live queue (LIVE). Events already delivered during catch-up are filtered
//! out of the live queue by id, so the subscriber sees every id exactly once
//! and in ascending order.

use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::{Listener, ListenerId, RecvError};
use super::EngineError;
use crate::models::Event;
use crate::storage::EventStore;
use crate::utils::metrics::STREAM_LAGGED_TOTAL;

/// Phase of a subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Catchup,
    Live,
    Closed,
}

/// A batch handed to the front door: a catch-up page, or one live event.
pub type Batch = Vec<Arc<Event>>;

/// Pull-based subscription to one subject.
///
/// Created by [`EventsEngine::subscribe`](super::EventsEngine::subscribe).
/// Dropping it detaches the listener.
pub struct Subscription {
    subject: String,
    cursor: i64,
    state: SessionState,
    degraded: bool,
    listener: Option<Listener>,
    store: Arc<dyn EventStore>,
    batch_size: u32,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl Subscription {
    pub(super) fn new(
        subject: String,
        after_id: i64,
        listener: Listener,
        store: Arc<dyn EventStore>,
        batch_size: u32,
        cancel: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            subject,
            cursor: after_id.max(0),
            state: SessionState::Catchup,
            degraded: false,
            listener: Some(listener),
            store,
            batch_size: batch_size.max(1),
            cancel,
            shutdown,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Highest id delivered so far (or the requested `after_id`).
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the live queue ever overflowed and forced a resync.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Id of the attached listener, `None` once the session has closed.
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.listener.as_ref().map(Listener::id)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.shutdown.is_cancelled()
    }

    /// Next batch of events for the subscriber.
    ///
    /// Returns `None` once the session is cancelled, the engine shuts down,
    /// or a previous call failed. A storage failure is returned once and
    /// closes the session.
    ///
    /// Cancel safe: dropping the returned future loses no events, the cursor
    /// only moves when a batch is handed out.
    pub async fn next_batch(&mut self) -> Option<Result<Batch, EngineError>> {
        loop {
            if self.state == SessionState::Closed {
                return None;
            }
            if self.is_cancelled() {
                self.close("cancelled");
                return None;
            }

            match self.state {
                SessionState::Catchup => {
                    let page = tokio::select! {
                        biased;
                        _ = cancelled(&self.cancel, &self.shutdown) => None,
                        page = self.store.get_by_subject_after(
                            &self.subject,
                            self.cursor,
                            self.batch_size,
                        ) => Some(page),
                    };

                    let page = match page {
                        None => {
                            self.close("cancelled");
                            return None;
                        }
                        Some(Err(e)) => {
                            error!(subject = %self.subject, cursor = self.cursor, error = %e, "Catch-up read failed");
                            self.close("storage error");
                            return Some(Err(e.into()));
                        }
                        Some(Ok(page)) => page,
                    };

                    if page.is_empty() {
                        debug!(subject = %self.subject, cursor = self.cursor, "Catch-up complete, going live");
                        self.state = SessionState::Live;
                        continue;
                    }

                    let batch: Batch = page
                        .into_iter()
                        .filter(|event| event.id > self.cursor && event.subject == self.subject)
                        .map(Arc::new)
                        .collect();

                    let Some(last) = batch.last() else {
                        error!(subject = %self.subject, cursor = self.cursor, "Store returned a page with no event past the cursor");
                        self.close("store contract violated");
                        return Some(Err(EngineError::Internal(format!(
                            "catch-up page for {} made no progress past id {}",
                            self.subject, self.cursor
                        ))));
                    };
                    if self.is_cancelled() {
                        self.close("cancelled");
                        return None;
                    }
                    self.cursor = last.id;
                    return Some(Ok(batch));
                }
                SessionState::Live => {
                    let Some(listener) = self.listener.as_mut() else {
                        self.close("detached");
                        return None;
                    };

                    let received = tokio::select! {
                        biased;
                        _ = cancelled(&self.cancel, &self.shutdown) => None,
                        received = listener.recv() => Some(received),
                    };

                    match received {
                        None => {
                            self.close("cancelled");
                            return None;
                        }
                        Some(Ok(event)) => {
                            if event.subject == self.subject && event.id > self.cursor {
                                self.cursor = event.id;
                                return Some(Ok(vec![event]));
                            }
                        }
                        Some(Err(RecvError::Lagged(skipped))) => {
                            STREAM_LAGGED_TOTAL.add(skipped, &[]);
                            warn!(
                                subject = %self.subject,
                                cursor = self.cursor,
                                skipped,
                                "Subscriber queue overflowed, resyncing from store"
                            );
                            self.degraded = true;
                            self.state = SessionState::Catchup;
                        }
                        Some(Err(RecvError::Closed)) => {
                            self.close("listener queue closed");
                            return None;
                        }
                    }
                }
                SessionState::Closed => return None,
            }
        }
    }

    /// End the session and release its listener slot.
    fn close(&mut self, reason: &str) {
        if let Some(listener) = self.listener.take() {
            info!(
                subject = %self.subject,
                listener_id = listener.id(),
                cursor = self.cursor,
                reason,
                "Subscription closed"
            );
        }
        self.state = SessionState::Closed;
    }

    /// Adapt the session into a stream of batches.
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch, EngineError>> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next_batch()
                .await
                .map(|batch| (batch, subscription))
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .field("degraded", &self.degraded)
            .field("listener_id", &self.listener_id())
            .finish()
    }
}

async fn cancelled(cancel: &CancellationToken, shutdown: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = shutdown.cancelled() => {}
    }
}
