// Flowly API library
// Decision: Shared library for binaries (API server, OpenAPI export) and router tests
// Decision: Router assembly lives here so integration tests drive the same app main serves

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Caller identity
pub mod auth;

// Environment configuration
pub mod config;

// OpenAPI spec generation
pub mod openapi;

// Services layer
pub mod services;
pub use services::{EventBus, Services};

// Logging setup
pub mod telemetry;

use axum::http::{header, Method};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthState;
use crate::config::ServerConfig;
use crate::openapi::ApiDoc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    auth_mode: &'static str,
    storage: &'static str,
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    auth_mode: &'static str,
    storage: &'static str,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        auth_mode: state.auth_mode,
        storage: state.storage,
    })
}

/// Build the full application router
pub fn build_app(config: &ServerConfig, services: &Services) -> Router {
    let auth_state = AuthState::from_config(config);

    // Create module-specific states
    let events_state = api::events::AppState::new(
        services.live_stream.clone(),
        services.bus.clone(),
        auth_state.clone(),
        config.heartbeat_interval,
    );
    let onboarding_state =
        api::onboarding::AppState::new(services.onboarding.clone(), auth_state.clone());
    let commands_state =
        api::commands::AppState::new(services.commands.clone(), auth_state.clone());
    let budgets_state = api::budgets::AppState::new(services.budgets.clone(), auth_state);
    let metrics_state = api::metrics::AppState::new(services.metrics.clone());
    let health_state = HealthState {
        auth_mode: config.auth_mode(),
        storage: if services.storage.is_dev_mode() {
            "memory"
        } else {
            "postgres"
        },
    };

    let api_routes = Router::new()
        .merge(api::events::routes(events_state))
        .merge(api::onboarding::routes(onboarding_state))
        .merge(api::commands::routes(commands_state))
        .merge(api::budgets::routes(budgets_state))
        .merge(api::metrics::routes(metrics_state));

    // Build main router with health (not prefixed) and prefixed API routes
    let app = Router::new()
        .route("/health", get(health).with_state(health_state))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix));

    // Add Swagger UI
    let app =
        app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !config.cors_allowed_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.cors_allowed_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                    header::HeaderName::from_static("last-event-id"),
                ])
                .allow_credentials(true),
        )
    } else {
        app
    };

    // Add tracing
    app.layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix (extracted for testing)
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use flowly_storage::StorageBackend;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(api_prefix: &str) -> Router {
        let config = ServerConfig {
            api_prefix: api_prefix.to_string(),
            ..Default::default()
        };
        let services = Services::new(Arc::new(StorageBackend::in_memory()), &config);
        build_app(&config, &services)
    }

    async fn get_status(app: &Router, uri: &str) -> u16 {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
            .as_u16()
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = app("");
        assert_eq!(get_status(&app, "/v1/commands").await, 200);
        assert_eq!(get_status(&app, "/api/v1/commands").await, 404);
    }

    #[tokio::test]
    async fn test_api_prefix_set() {
        let app = app("/api");
        assert_eq!(get_status(&app, "/api/v1/commands").await, 200);
        assert_eq!(get_status(&app, "/v1/commands").await, 404);

        // Health and docs are never prefixed
        assert_eq!(get_status(&app, "/health").await, 200);
        assert_eq!(get_status(&app, "/api-doc/openapi.json").await, 200);
    }

    #[tokio::test]
    async fn test_health_reports_modes() {
        let response = app("")
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["auth_mode"], "anonymous");
        assert_eq!(json["storage"], "memory");
    }
}
