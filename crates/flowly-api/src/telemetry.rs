// Logging setup
//
// Console logging through tracing-subscriber with an EnvFilter. Configuration
// comes from the environment; main supplies the default filter when none is set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter when neither RUST_LOG nor LOG_LEVEL is set
pub const DEFAULT_LOG_FILTER: &str = "flowly_api=debug,tower_http=debug";

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported in the startup line
    pub service_name: String,
    /// Service version
    pub service_version: Option<String>,
    /// Environment (e.g., "development", "production")
    pub environment: Option<String>,
    /// Log filter (e.g., "info", "flowly_api=debug")
    pub log_filter: Option<String>,
    /// Emit target module paths on each line
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "flowly".to_string(),
            service_version: None,
            environment: None,
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "flowly")
    /// - `FLOWLY_ENVIRONMENT`: Deployment environment
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "flowly".to_string()),
            service_version: None,
            environment: std::env::var("FLOWLY_ENVIRONMENT").ok(),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            with_target: true,
        }
    }

    /// Resolve the configured filter, falling back to `info` when it does not parse
    pub fn env_filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Install the global subscriber
pub fn init_telemetry(config: &TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_filter(config.env_filter());

    tracing_subscriber::registry().with(console_layer).init();

    tracing::info!(
        service = %config.service_name,
        version = ?config.service_version,
        environment = ?config.environment,
        "Logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "flowly");
        assert!(config.log_filter.is_none());
        assert!(config.with_target);
    }

    #[test]
    fn test_invalid_filter_falls_back_to_info() {
        let config = TelemetryConfig {
            log_filter: Some("flowly_api=notalevel".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.env_filter().max_level_hint(),
            Some(tracing_subscriber::filter::LevelFilter::INFO)
        );
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
