//! Error types for the cache and scheduler
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Error Enum ==
/// Unified error type for configuration and control calls.
///
/// Failures inside task bodies never surface here; the scheduler captures
/// them and turns them into a retry.
#[derive(Error, Debug)]
pub enum Error {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rejected eviction policy value
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Rejected scheduling interval
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// A task with this name was already registered
    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    /// No task with this name is registered
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// The scheduler has been shut down
    #[error("Scheduler is shut down")]
    ShutDown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) | Error::UnknownTask(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) | Error::InvalidPolicy(_) | Error::InvalidInterval(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::DuplicateTask(_) => StatusCode::CONFLICT,
            Error::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;
