// Error types for onboarding, events and storage
//
// Domain errors (validation, not found, invalid state) are user-correctable and
// surfaced verbatim. Conflicts come from losing a storage-level race. Storage
// errors are transient infrastructure failures and are never retried here.

use thiserror::Error;

/// Result type alias for Flowly operations
pub type Result<T> = std::result::Result<T, FlowlyError>;

/// Errors that can occur in the onboarding flow and the event log
#[derive(Debug, Error)]
pub enum FlowlyError {
    /// Bad input shape or range
    #[error("{0}")]
    Validation(String),

    /// Resource absent, or owned by someone else
    #[error("{0}")]
    NotFound(String),

    /// Operation not valid for the current session status
    #[error("{0}")]
    InvalidState(String),

    /// Uniqueness constraint violated on insert
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conditional update matched nothing
    #[error("Update conflict: {0}")]
    UpdateConflict(String),

    /// Event id already stored
    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),

    /// Caller identity required but absent
    #[error("{0}")]
    Unauthorized(String),

    /// Infrastructure failure (connection loss, serialization)
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl FlowlyError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        FlowlyError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        FlowlyError::NotFound(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        FlowlyError::InvalidState(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        FlowlyError::Conflict(msg.into())
    }

    /// Create an update conflict error
    pub fn update_conflict(msg: impl Into<String>) -> Self {
        FlowlyError::UpdateConflict(msg.into())
    }

    /// Create a duplicate event error
    pub fn duplicate_event(event_id: impl Into<String>) -> Self {
        FlowlyError::DuplicateEvent(event_id.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        FlowlyError::Unauthorized(msg.into())
    }

    /// Create a storage error from a message
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        FlowlyError::Storage(anyhow::anyhow!("{}", msg))
    }

    /// Whether the error is a domain failure the end user can act on
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            FlowlyError::Validation(_)
                | FlowlyError::NotFound(_)
                | FlowlyError::InvalidState(_)
                | FlowlyError::Unauthorized(_)
        )
    }
}

impl From<serde_json::Error> for FlowlyError {
    fn from(err: serde_json::Error) -> Self {
        FlowlyError::Storage(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_display_verbatim() {
        let err = FlowlyError::validation("Budget name is required.");
        assert_eq!(err.to_string(), "Budget name is required.");
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_storage_errors_are_not_user_facing() {
        let err = FlowlyError::storage("connection reset");
        assert_eq!(err.to_string(), "Storage error: connection reset");
        assert!(!err.is_user_facing());
        assert!(!FlowlyError::conflict("x").is_user_facing());
    }
}
