//! EventsDb gRPC service.

use std::time::Instant;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

use crate::engine::{EngineError, EventsEngine, Subscription};
use crate::models::NewEvent;
use crate::proto::events_db_server::EventsDb;
use crate::proto::{
    CreateEventReply, CreateEventRequest, Event, GetEventByIdRequest, ListSubjectsReply,
    ListSubjectsRequest, StreamEventsFromSubjectReply, StreamEventsFromSubjectRequest,
};
use crate::utils::metrics::record_operation;

/// Replies buffered between the session task and the transport.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// gRPC front door over the event engine.
#[derive(Clone)]
pub struct EventsDbService {
    engine: EventsEngine,
}

impl EventsDbService {
    pub fn new(engine: EventsEngine) -> Self {
        Self { engine }
    }
}

/// Log internal failures before they are collapsed into a generic status.
fn to_status(operation: &str, error: EngineError) -> Status {
    match &error {
        EngineError::NotFound { .. }
        | EngineError::ResourceExhausted { .. }
        | EngineError::InvalidArgument(_) => {
            debug!(operation, error = %error, "Request rejected");
        }
        _ => error!(operation, error = %error, "Request failed"),
    }
    Status::from(error)
}

fn outcome<T>(result: &Result<T, Status>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(status) => match status.code() {
            tonic::Code::NotFound => "not_found",
            tonic::Code::ResourceExhausted => "resource_exhausted",
            tonic::Code::InvalidArgument => "invalid_argument",
            tonic::Code::Unavailable => "unavailable",
            _ => "error",
        },
    }
}

#[tonic::async_trait]
impl EventsDb for EventsDbService {
    type StreamEventsFromSubjectStream =
        ReceiverStream<Result<StreamEventsFromSubjectReply, Status>>;

    async fn create_event(
        &self,
        request: Request<CreateEventRequest>,
    ) -> Result<Response<CreateEventReply>, Status> {
        let started = Instant::now();
        let new_event = NewEvent::from(request.into_inner());

        let result = self
            .engine
            .create_event(new_event)
            .await
            .map(|event| Response::new(CreateEventReply { id: event.id }))
            .map_err(|e| to_status("create_event", e));

        record_operation("create_event", outcome(&result), started);
        result
    }

    async fn get_event_by_id(
        &self,
        request: Request<GetEventByIdRequest>,
    ) -> Result<Response<Event>, Status> {
        let started = Instant::now();
        let id = request.into_inner().id;

        let result = self
            .engine
            .get_event(id)
            .await
            .map(|event| Response::new(Event::from(&event)))
            .map_err(|e| to_status("get_event_by_id", e));

        record_operation("get_event_by_id", outcome(&result), started);
        result
    }

    async fn stream_events_from_subject(
        &self,
        request: Request<StreamEventsFromSubjectRequest>,
    ) -> Result<Response<Self::StreamEventsFromSubjectStream>, Status> {
        let started = Instant::now();
        let StreamEventsFromSubjectRequest { subject, after_id } = request.into_inner();

        let cancel = CancellationToken::new();
        let result = self
            .engine
            .subscribe(subject, after_id, cancel.clone())
            .map_err(|e| to_status("stream_events_from_subject", e));
        record_operation("stream_events_from_subject", outcome(&result), started);
        let subscription = result?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(forward_batches(subscription, tx, cancel));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn list_subjects(
        &self,
        _request: Request<ListSubjectsRequest>,
    ) -> Result<Response<ListSubjectsReply>, Status> {
        let started = Instant::now();

        let result = self
            .engine
            .list_subjects()
            .await
            .map(|subjects| Response::new(ListSubjectsReply { subjects }))
            .map_err(|e| to_status("list_subjects", e));

        record_operation("list_subjects", outcome(&result), started);
        result
    }
}

/// Pump session batches to the client until either side ends.
///
/// One reply per catch-up page, one reply per live event.
async fn forward_batches(
    mut subscription: Subscription,
    tx: mpsc::Sender<Result<StreamEventsFromSubjectReply, Status>>,
    cancel: CancellationToken,
) {
    let subject = subscription.subject().to_string();

    loop {
        tokio::select! {
            _ = tx.closed() => {
                info!(subject = %subject, cursor = subscription.cursor(), "Client disconnected, closing subscription");
                cancel.cancel();
                break;
            }
            batch = subscription.next_batch() => match batch {
                Some(Ok(events)) => {
                    let reply = StreamEventsFromSubjectReply {
                        events: events.iter().map(|event| Event::from(&**event)).collect(),
                    };
                    if tx.send(Ok(reply)).await.is_err() {
                        debug!(subject = %subject, "Client disconnected during send");
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(to_status("stream_events_from_subject", e))).await;
                    break;
                }
                None => {
                    debug!(subject = %subject, "Subscription ended");
                    break;
                }
            },
        }
    }
    // Dropping the subscription here detaches its listener.
}
