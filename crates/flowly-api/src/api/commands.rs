// Chat command HTTP routes
// POST answers with `handled: false` when the message is not ours, so the chat
// layer can forward it to the assistant.

use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use flowly_core::events::CommandInfo;
use std::sync::Arc;

use super::common::{api_error, ApiError, ErrorResponse, ListResponse};
use crate::auth::{AuthState, OptionalIdentity};
use crate::services::commands::{CommandOutcome, CommandRequest};
use crate::services::CommandRouter;

/// App state for command routes
#[derive(Clone, FromRef)]
pub struct AppState {
    pub commands: Arc<CommandRouter>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(commands: Arc<CommandRouter>, auth: AuthState) -> Self {
        Self { commands, auth }
    }
}

/// Create command routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/commands", get(list_commands).post(handle_command))
        .with_state(state)
}

/// GET /v1/commands - List slash commands
#[utoipa::path(
    get,
    path = "/v1/commands",
    responses(
        (status = 200, description = "Registered slash commands", body = ListResponse<CommandInfo>)
    ),
    tag = "commands"
)]
pub async fn list_commands(State(state): State<AppState>) -> Json<ListResponse<CommandInfo>> {
    Json(ListResponse::new(state.commands.list()))
}

/// POST /v1/commands - Route a chat message or form submission
#[utoipa::path(
    post,
    path = "/v1/commands",
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Routing outcome", body = CommandOutcome),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "commands"
)]
pub async fn handle_command(
    State(state): State<AppState>,
    identity: OptionalIdentity,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let outcome = state
        .commands
        .handle(identity.user_id(), &request)
        .await
        .map_err(|e| api_error("handle command", e))?;

    Ok(Json(outcome))
}
