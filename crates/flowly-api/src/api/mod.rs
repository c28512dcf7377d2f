// HTTP API routes
//
// This module contains all HTTP route handlers for the public API.
// Each submodule handles a specific resource type with its own AppState.

pub mod budgets;
pub mod commands;
pub mod common;
pub mod events;
pub mod metrics;
pub mod onboarding;

// Re-export common types
pub use common::{ApiError, ErrorResponse, ListResponse};
