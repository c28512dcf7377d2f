// Common DTOs for public API
//
// These types are shared across multiple API endpoints.

use axum::http::StatusCode;
use axum::Json;
use flowly_core::FlowlyError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    /// Array of items returned by the list operation.
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// Error half of every JSON handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for a domain error
pub fn status_for(err: &FlowlyError) -> StatusCode {
    match err {
        FlowlyError::Validation(_) => StatusCode::BAD_REQUEST,
        FlowlyError::NotFound(_) => StatusCode::NOT_FOUND,
        FlowlyError::InvalidState(_)
        | FlowlyError::Conflict(_)
        | FlowlyError::UpdateConflict(_)
        | FlowlyError::DuplicateEvent(_) => StatusCode::CONFLICT,
        FlowlyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        FlowlyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a service error to a response, logging server-side failures.
///
/// Storage details never reach the client.
pub fn api_error(action: &str, err: FlowlyError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Failed to {}: {}", action, err);
        return ErrorResponse::new("Internal server error").into_response(status);
    }

    tracing::debug!(status = %status, "Failed to {}: {}", action, err);
    ErrorResponse::new(err.to_string()).into_response(status)
}
