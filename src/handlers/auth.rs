//! Shared-secret bearer token checks for both front doors.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tonic::service::Interceptor;
use tonic::Status;
use tracing::debug;

const BEARER_PREFIX: &str = "Bearer ";

/// Bearer token check. A disabled check admits every request.
#[derive(Debug, Clone, Default)]
pub struct TokenAuth {
    token: Option<Arc<str>>,
}

impl TokenAuth {
    /// Empty or absent token disables authentication.
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Check an `Authorization` value. The `Bearer ` prefix is optional.
    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        let Some(presented) = authorization else {
            return false;
        };
        let presented = presented.strip_prefix(BEARER_PREFIX).unwrap_or(presented);
        presented == expected
    }
}

/// gRPC interceptor reading the `authorization` metadata entry.
impl Interceptor for TokenAuth {
    fn call(&mut self, request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        let authorization = request
            .metadata()
            .get(header::AUTHORIZATION.as_str())
            .and_then(|value| value.to_str().ok());

        if self.verify(authorization) {
            Ok(request)
        } else {
            debug!("Rejected gRPC request with missing or invalid token");
            Err(Status::unauthenticated("Invalid or missing token"))
        }
    }
}

/// axum middleware rejecting requests without a valid token.
pub async fn require_token(State(auth): State<TokenAuth>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if auth.verify(authorization) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Rejected HTTP request with missing or invalid token");
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}
