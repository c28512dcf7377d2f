// Budget HTTP routes (read-only; budgets are created by onboarding submit)

use axum::{
    extract::{FromRef, Path, State},
    routing::get,
    Json, Router,
};
use flowly_core::BudgetWithPayCycle;
use std::sync::Arc;
use uuid::Uuid;

use super::common::{api_error, ApiError, ErrorResponse, ListResponse};
use crate::auth::{AuthState, Identity};
use crate::services::BudgetService;

/// App state for budget routes
#[derive(Clone, FromRef)]
pub struct AppState {
    pub budgets: Arc<BudgetService>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(budgets: Arc<BudgetService>, auth: AuthState) -> Self {
        Self { budgets, auth }
    }
}

/// Create budget routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/budgets", get(list_budgets))
        .route("/v1/budgets/:budget_id", get(get_budget))
        .with_state(state)
}

/// GET /v1/budgets - The caller's budgets, newest first
#[utoipa::path(
    get,
    path = "/v1/budgets",
    responses(
        (status = 200, description = "List of budgets", body = ListResponse<BudgetWithPayCycle>),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "budgets"
)]
pub async fn list_budgets(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ListResponse<BudgetWithPayCycle>>, ApiError> {
    let budgets = state
        .budgets
        .list(&identity.user_id)
        .await
        .map_err(|e| api_error("list budgets", e))?;

    Ok(Json(ListResponse::new(budgets)))
}

/// GET /v1/budgets/{budget_id} - One of the caller's budgets
#[utoipa::path(
    get,
    path = "/v1/budgets/{budget_id}",
    params(
        ("budget_id" = Uuid, Path, description = "Budget ID")
    ),
    responses(
        (status = 200, description = "Budget found", body = BudgetWithPayCycle),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Budget not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "budgets"
)]
pub async fn get_budget(
    State(state): State<AppState>,
    identity: Identity,
    Path(budget_id): Path<Uuid>,
) -> Result<Json<BudgetWithPayCycle>, ApiError> {
    let budget = state
        .budgets
        .get(&identity.user_id, budget_id)
        .await
        .map_err(|e| api_error("get budget", e))?;

    Ok(Json(budget))
}
