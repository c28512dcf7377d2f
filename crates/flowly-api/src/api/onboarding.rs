// Budget onboarding HTTP routes
// Every route acts on behalf of the authenticated caller; sessions owned by
// someone else are indistinguishable from missing ones.

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use flowly_core::events::OnboardingState;
use flowly_core::{build_budget_onboarding_form_spec, OnboardingSession};
use std::sync::Arc;
use uuid::Uuid;

use super::common::{api_error, ApiError, ErrorResponse};
use crate::auth::{AuthState, Identity};
use crate::services::onboarding::{BudgetBasicsInput, CancelOutcome, SubmitOutcome};
use crate::services::OnboardingService;

/// App state for onboarding routes
#[derive(Clone, FromRef)]
pub struct AppState {
    pub onboarding: Arc<OnboardingService>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(onboarding: Arc<OnboardingService>, auth: AuthState) -> Self {
        Self { onboarding, auth }
    }
}

/// Create onboarding routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/onboarding/start", post(start_onboarding))
        .route("/v1/onboarding/active", get(get_active_onboarding))
        .route("/v1/onboarding/:session_id/submit", post(submit_onboarding))
        .route("/v1/onboarding/:session_id/cancel", post(cancel_onboarding))
        .with_state(state)
}

/// Session state with the form for its current step
fn state_with_form(session: &OnboardingSession) -> OnboardingState {
    OnboardingState::from_session(session)
        .with_ui_spec(build_budget_onboarding_form_spec(session.id, &session.draft))
}

/// POST /v1/onboarding/start - Start budget onboarding (idempotent)
#[utoipa::path(
    post,
    path = "/v1/onboarding/start",
    responses(
        (status = 200, description = "Active onboarding session, new or existing", body = OnboardingState),
        (status = 400, description = "Invalid user id", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "onboarding"
)]
pub async fn start_onboarding(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<OnboardingState>, ApiError> {
    let session = state
        .onboarding
        .start(&identity.user_id)
        .await
        .map_err(|e| api_error("start onboarding", e))?;

    Ok(Json(state_with_form(&session)))
}

/// GET /v1/onboarding/active - The caller's active onboarding session
#[utoipa::path(
    get,
    path = "/v1/onboarding/active",
    responses(
        (status = 200, description = "Active onboarding session", body = OnboardingState),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "No active onboarding session", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "onboarding"
)]
pub async fn get_active_onboarding(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<OnboardingState>, ApiError> {
    let session = state
        .onboarding
        .active_session(&identity.user_id)
        .await
        .map_err(|e| api_error("get active onboarding", e))?
        .ok_or_else(|| {
            ErrorResponse::new("No active onboarding session.").into_response(StatusCode::NOT_FOUND)
        })?;

    Ok(Json(state_with_form(&session)))
}

/// POST /v1/onboarding/{session_id}/submit - Submit budget basics
#[utoipa::path(
    post,
    path = "/v1/onboarding/{session_id}/submit",
    params(
        ("session_id" = Uuid, Path, description = "Onboarding session ID")
    ),
    request_body = BudgetBasicsInput,
    responses(
        (status = 200, description = "Budget created and session completed", body = SubmitOutcome),
        (status = 400, description = "Invalid budget basics", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session not active or changed concurrently", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "onboarding"
)]
pub async fn submit_onboarding(
    State(state): State<AppState>,
    identity: Identity,
    Path(session_id): Path<Uuid>,
    Json(input): Json<BudgetBasicsInput>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let outcome = state
        .onboarding
        .submit(&identity.user_id, session_id, &input)
        .await
        .map_err(|e| api_error("submit onboarding", e))?;

    Ok(Json(outcome))
}

/// POST /v1/onboarding/{session_id}/cancel - Cancel an active session
#[utoipa::path(
    post,
    path = "/v1/onboarding/{session_id}/cancel",
    params(
        ("session_id" = Uuid, Path, description = "Onboarding session ID")
    ),
    responses(
        (status = 200, description = "Session cancelled", body = CancelOutcome),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session not active or changed concurrently", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "onboarding"
)]
pub async fn cancel_onboarding(
    State(state): State<AppState>,
    identity: Identity,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, ApiError> {
    let outcome = state
        .onboarding
        .cancel(&identity.user_id, session_id)
        .await
        .map_err(|e| api_error("cancel onboarding", e))?;

    Ok(Json(outcome))
}
