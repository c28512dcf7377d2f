// Flowly API server
// Decision: No DATABASE_URL runs the in-memory backend (local development)
// Decision: Maintenance runs in-process on a fixed interval alongside the HTTP server

use anyhow::{Context, Result};
use flowly_api::config::ServerConfig;
use flowly_api::telemetry::{init_telemetry, TelemetryConfig, DEFAULT_LOG_FILTER};
use flowly_api::{build_app, Services};
use flowly_storage::StorageBackend;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure via environment variables:
    // - RUST_LOG / LOG_LEVEL: Log filter (default: "flowly_api=debug,tower_http=debug")
    // - SERVICE_NAME: Service name in log output (default: "flowly-api")
    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "flowly" {
        telemetry_config.service_name = "flowly-api".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some(DEFAULT_LOG_FILTER.to_string());
    }
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(&telemetry_config);

    tracing::info!("flowly-api starting...");

    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize storage
    let storage = match &config.database_url {
        Some(database_url) => {
            let storage = StorageBackend::postgres(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Connected to database");
            storage
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage (dev mode)");
            StorageBackend::in_memory()
        }
    };
    let services = Services::new(Arc::new(storage), &config);

    tracing::info!(mode = config.auth_mode(), "Authentication configured");
    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if config.cors_allowed_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?config.cors_allowed_origins, "CORS origins configured");
    }

    let _maintenance = services
        .maintenance
        .clone()
        .spawn(config.maintenance_interval);
    tracing::info!(
        interval_secs = config.maintenance_interval.as_secs(),
        retention_hours = config.event_retention.num_hours(),
        "Maintenance sweeper started"
    );

    let app = build_app(&config, &services);

    // Start HTTP server
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
