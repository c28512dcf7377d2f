// OpenAPI specification generation
//
// This module defines the OpenAPI spec for the Flowly API.
// It is used by both the API server (for Swagger UI)
// and the export-openapi binary (for static spec generation).

use crate::api;
use crate::api::{ErrorResponse, ListResponse};
use crate::services::commands::{
    CommandOutcome, CommandReply, CommandRequest, FormAttachment, FormSubmission,
};
use crate::services::onboarding::{BudgetBasicsInput, CancelOutcome, SubmitOutcome};
use flowly_core::events::{
    BudgetCreatedData, CommandInfo, CommandsSnapshotData, EventsCursorData, MetricsUpsertData,
    OnboardingCancelledData, OnboardingCompletedData, OnboardingState, PayCycleSummary,
    ReplayTruncatedData, SessionLogoutData,
};
use flowly_core::ui_spec::{BudgetOnboardingFormProps, CadenceOption, FormElement};
use flowly_core::validation::DayOption;
use flowly_core::{
    Budget, BudgetOnboardingFormSpec, BudgetWithPayCycle, Event, OnboardingDraft,
    OnboardingStatus, OnboardingStep, PayCycle, PayCycleCadence,
};
use utoipa::OpenApi;

/// OpenAPI documentation for the Flowly API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::events::stream_sse,
        api::events::replay_events,
        api::onboarding::start_onboarding,
        api::onboarding::get_active_onboarding,
        api::onboarding::submit_onboarding,
        api::onboarding::cancel_onboarding,
        api::commands::list_commands,
        api::commands::handle_command,
        api::budgets::list_budgets,
        api::budgets::get_budget,
        api::metrics::list_metrics,
        api::metrics::upsert_metric,
    ),
    components(
        schemas(
            Event, ErrorResponse,
            // Event payloads
            OnboardingState, OnboardingCompletedData, OnboardingCancelledData,
            BudgetCreatedData, PayCycleSummary, SessionLogoutData,
            CommandInfo, CommandsSnapshotData, MetricsUpsertData,
            EventsCursorData, ReplayTruncatedData,
            // Onboarding
            OnboardingStatus, OnboardingStep, OnboardingDraft,
            BudgetBasicsInput, SubmitOutcome, CancelOutcome,
            BudgetOnboardingFormSpec, FormElement, BudgetOnboardingFormProps,
            CadenceOption, DayOption,
            // Budgets
            Budget, PayCycle, PayCycleCadence, BudgetWithPayCycle,
            // Commands
            CommandRequest, FormSubmission, CommandOutcome, CommandReply, FormAttachment,
            ListResponse<Event>,
            ListResponse<CommandInfo>,
            ListResponse<BudgetWithPayCycle>,
            ListResponse<MetricsUpsertData>,
        )
    ),
    tags(
        (name = "events", description = "Live event stream (SSE) and replay"),
        (name = "onboarding", description = "Budget onboarding sessions"),
        (name = "commands", description = "Chat slash commands and intents"),
        (name = "budgets", description = "Budgets created by onboarding"),
        (name = "metrics", description = "Dashboard metric widgets")
    ),
    info(
        title = "Flowly API",
        version = "0.1.0",
        description = "API for budget onboarding and the Flowly event stream",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as pretty-printed JSON
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_every_route() {
        let json: serde_json::Value = serde_json::from_str(&ApiDoc::to_json().unwrap()).unwrap();
        let paths = json["paths"].as_object().unwrap();

        for path in [
            "/v1/events",
            "/v1/events/replay",
            "/v1/onboarding/start",
            "/v1/onboarding/active",
            "/v1/onboarding/{session_id}/submit",
            "/v1/onboarding/{session_id}/cancel",
            "/v1/commands",
            "/v1/budgets",
            "/v1/budgets/{budget_id}",
            "/v1/metrics",
            "/v1/metrics/{metric_id}",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert!(json["components"]["schemas"]["OnboardingState"].is_object());
    }
}
