//! Engine error taxonomy.

use tonic::Status;

use crate::storage::StorageError;

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Event not found: id={id}")]
    NotFound { id: i64 },

    #[error("Too many subscribers: limit of {max} reached")]
    ResourceExhausted { max: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Failed to format event: {0}")]
    Marshal(String),

    #[error("Engine is shut down")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for EngineError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { id } => EngineError::NotFound { id },
            StorageError::InvalidTimestamp(detail) => EngineError::Marshal(detail),
            other => EngineError::Storage(other),
        }
    }
}

/// Convert engine errors to gRPC status.
///
/// Internal details are logged by the caller; clients get a generic message.
impl From<EngineError> for Status {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::NotFound { .. } => Status::not_found("Event not found"),
            EngineError::ResourceExhausted { .. } => {
                Status::resource_exhausted("Too many clients for this subject")
            }
            EngineError::InvalidArgument(msg) => Status::invalid_argument(msg),
            EngineError::Closed => Status::unavailable("Server is shutting down"),
            EngineError::Storage(_) | EngineError::Marshal(_) | EngineError::Internal(_) => {
                Status::internal("Internal server error")
            }
        }
    }
}
