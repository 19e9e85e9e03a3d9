//! HTTP front door: JSON endpoints plus server-sent event streams.
//!
//! Endpoints:
//! - `POST /events` create an event, returns `{"id": n}`
//! - `GET /events/get?id=` fetch one event
//! - `GET /events/stream?subject=&after_id=` catch-up then live, as SSE
//! - `GET /subjects` distinct subjects
//! - `GET /health` liveness, never authenticated

use std::convert::Infallible;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::auth::{require_token, TokenAuth};
use crate::engine::{Batch, EngineError, EventsEngine, Subscription};
use crate::models::{CreateEventRequest, CreateEventResponse, Event, NewEvent};
use crate::utils::metrics::record_operation;

/// Header browsers send when reconnecting an `EventSource`.
const LAST_EVENT_ID: &str = "last-event-id";

/// Shared state for axum handlers.
#[derive(Clone)]
struct AppState {
    engine: EventsEngine,
}

/// Build the axum router (separated for testing).
pub fn router(engine: EventsEngine, auth: TokenAuth) -> Router {
    let api = Router::new()
        .route("/events", post(create_event))
        .route("/events/get", get(get_event))
        .route("/events/stream", get(stream_events))
        .route("/subjects", get(list_subjects))
        .route_layer(middleware::from_fn_with_state(auth, require_token))
        .with_state(AppState { engine });

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve `app` on `listener` until `shutdown` resolves and open streams end.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Errors
// ============================================================================

/// Handler failure mapped to an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        ApiError::Engine(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(e) => match e {
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::ResourceExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
                EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                EngineError::Closed => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Storage(_) | EngineError::Marshal(_) | EngineError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn outcome(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "invalid_argument",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::TOO_MANY_REQUESTS => "resource_exhausted",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            _ => "error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Engine(EngineError::NotFound { .. }) => "Event not found".to_string(),
            ApiError::Engine(EngineError::ResourceExhausted { .. }) => {
                "Too many clients for this subject".to_string()
            }
            ApiError::Engine(EngineError::InvalidArgument(msg)) => msg,
            ApiError::Engine(EngineError::Closed) => "Server is shutting down".to_string(),
            ApiError::Engine(e) => {
                error!(error = %e, "HTTP request failed");
                "Internal server error".to_string()
            }
        };
        (status, message).into_response()
    }
}

/// Record the outcome of a handler and pass its result through.
fn finish<T>(operation: &str, started: Instant, result: Result<T, ApiError>) -> Result<T, ApiError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    record_operation(operation, outcome, started);
    result
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_event(
    State(state): State<AppState>,
    body: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<Json<CreateEventResponse>, ApiError> {
    let started = Instant::now();
    let result = match body {
        Ok(Json(request)) => state
            .engine
            .create_event(NewEvent::from(request))
            .await
            .map(|event| Json(CreateEventResponse { id: event.id }))
            .map_err(ApiError::from),
        Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
    };
    finish("create_event", started, result)
}

#[derive(Debug, Deserialize)]
struct GetEventParams {
    id: Option<String>,
}

fn parse_id(raw: Option<&str>) -> Result<i64, ApiError> {
    let raw = raw
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing id".to_string()))?;
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid id: {raw}")))
}

async fn get_event(
    State(state): State<AppState>,
    Query(params): Query<GetEventParams>,
) -> Result<Json<Event>, ApiError> {
    let started = Instant::now();
    let result = match parse_id(params.id.as_deref()) {
        Ok(id) => state
            .engine
            .get_event(id)
            .await
            .map(Json)
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };
    finish("get_event_by_id", started, result)
}

async fn list_subjects(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let started = Instant::now();
    let result = state
        .engine
        .list_subjects()
        .await
        .map(Json)
        .map_err(ApiError::from);
    finish("list_subjects", started, result)
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    subject: Option<String>,
    after_id: Option<String>,
}

/// Resume point from `after_id`, falling back to `Last-Event-ID`.
fn resume_point(params: &StreamParams, headers: &HeaderMap) -> Result<i64, ApiError> {
    let header = headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok());

    match params.after_id.as_deref().filter(|raw| !raw.is_empty()).or(header) {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest(format!("invalid after_id: {raw}"))),
    }
}

fn open_subscription(
    engine: &EventsEngine,
    params: &StreamParams,
    headers: &HeaderMap,
    cancel: CancellationToken,
) -> Result<Subscription, ApiError> {
    let subject = params
        .subject
        .as_deref()
        .filter(|subject| !subject.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing subject".to_string()))?;
    let after_id = resume_point(params, headers)?;
    Ok(engine.subscribe(subject, after_id, cancel)?)
}

async fn stream_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let result = open_subscription(&state.engine, &params, &headers, cancel.clone());
    let subscription = finish("stream_events_from_subject", started, result)?;

    debug!(subject = %subscription.subject(), cursor = subscription.cursor(), "SSE stream opened");

    // The response body owns the subscription; a client disconnect drops the
    // body and with it the listener.
    let frames = subscription
        .into_stream()
        .flat_map(move |batch| stream::iter(sse_frames(batch, &cancel)));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

fn error_frame() -> SseEvent {
    SseEvent::default().event("error").data("Internal server error")
}

/// One `data:` frame per event; a failed session ends with an `error` frame.
fn sse_frames(
    batch: Result<Batch, EngineError>,
    cancel: &CancellationToken,
) -> Vec<Result<SseEvent, Infallible>> {
    match batch {
        Ok(events) => frames_until_failure(
            events.iter().map(|event| {
                let frame = SseEvent::default().id(event.id.to_string()).json_data(&**event);
                (event.id, frame)
            }),
            cancel,
        ),
        Err(e) => {
            error!(error = %e, "SSE stream failed");
            vec![Ok(error_frame())]
        }
    }
}

/// Collect encoded frames up to the first one that failed to encode.
///
/// The cursor has already moved past that event, so the stream must end
/// there: the failure becomes an `error` frame and the session is cancelled.
fn frames_until_failure(
    encoded: impl IntoIterator<Item = (i64, Result<SseEvent, axum::Error>)>,
    cancel: &CancellationToken,
) -> Vec<Result<SseEvent, Infallible>> {
    let mut frames = Vec::new();
    for (id, frame) in encoded {
        match frame {
            Ok(frame) => frames.push(Ok(frame)),
            Err(e) => {
                error!(id, error = %e, "Failed to encode event, ending SSE stream");
                cancel.cancel();
                frames.push(Ok(error_frame()));
                break;
            }
        }
    }
    frames
}
