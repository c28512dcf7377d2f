// Server configuration loaded from environment variables.
// Decision: No DATABASE_URL means in-memory dev mode rather than a startup error
// Decision: Durations are whole seconds/hours/days to keep env values readable

use axum::http::HeaderValue;
use std::time::Duration;
use thiserror::Error;

/// Configuration error raised at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL URL; `None` selects the in-memory backend
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Prefix for all API routes (e.g. "/api"); empty for none
    pub api_prefix: String,
    /// Origins allowed by CORS; empty means same-origin only
    pub cors_allowed_origins: Vec<HeaderValue>,
    /// HS256 secret for bearer tokens; `None` disables token auth
    pub jwt_secret: Option<String>,
    /// Accept `x-flowly-user-id` as the caller identity (tests, local dev)
    pub trust_user_header: bool,
    /// Interval between SSE heartbeat comments
    pub heartbeat_interval: Duration,
    /// How long events stay replayable
    pub event_retention: chrono::Duration,
    /// Lifetime of an onboarding session
    pub session_ttl: chrono::Duration,
    /// Interval between retention and expiry sweeps
    pub maintenance_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: "0.0.0.0".to_string(),
            port: 9000,
            api_prefix: String::new(),
            cors_allowed_origins: Vec::new(),
            jwt_secret: None,
            trust_user_header: false,
            heartbeat_interval: Duration::from_secs(30),
            event_retention: chrono::Duration::hours(24),
            session_ttl: chrono::Duration::days(flowly_core::DEFAULT_SESSION_TTL_DAYS),
            maintenance_interval: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment (and `.env`, if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_default();

        Ok(Self {
            database_url: var("DATABASE_URL"),
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", var("PORT"), defaults.port)?,
            api_prefix: var("API_PREFIX").unwrap_or_default(),
            cors_allowed_origins,
            jwt_secret: var("AUTH_JWT_SECRET"),
            trust_user_header: var("FLOWLY_TRUST_USER_HEADER")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            heartbeat_interval: Duration::from_secs(parse_or(
                "EVENTS_HEARTBEAT_SECS",
                var("EVENTS_HEARTBEAT_SECS"),
                defaults.heartbeat_interval.as_secs(),
            )?),
            event_retention: chrono::Duration::hours(parse_or(
                "EVENT_RETENTION_HOURS",
                var("EVENT_RETENTION_HOURS"),
                defaults.event_retention.num_hours(),
            )?),
            session_ttl: chrono::Duration::days(parse_or(
                "SESSION_TTL_DAYS",
                var("SESSION_TTL_DAYS"),
                defaults.session_ttl.num_days(),
            )?),
            maintenance_interval: Duration::from_secs(parse_or(
                "MAINTENANCE_INTERVAL_SECS",
                var("MAINTENANCE_INTERVAL_SECS"),
                defaults.maintenance_interval.as_secs(),
            )?),
        })
    }

    /// Socket address to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Mode name reported by /health
    pub fn auth_mode(&self) -> &'static str {
        match (&self.jwt_secret, self.trust_user_header) {
            (Some(_), _) => "jwt",
            (None, true) => "trusted-header",
            (None, false) => "anonymous",
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    fallback: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(fallback),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.event_retention, chrono::Duration::hours(24));
        assert_eq!(config.session_ttl, chrono::Duration::days(7));
        assert_eq!(config.auth_mode(), "anonymous");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/flowly"),
            ("PORT", "8080"),
            ("API_PREFIX", "/api"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example.com, https://b.example.com"),
            ("FLOWLY_TRUST_USER_HEADER", "true"),
            ("EVENTS_HEARTBEAT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/flowly")
        );
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.cors_allowed_origins.len(), 2);
        assert!(config.trust_user_header);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.auth_mode(), "trusted-header");
    }

    #[test]
    fn test_blank_database_url_means_dev_mode() {
        let config = ServerConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "ninety")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "ninety".to_string()
            }
        );
    }
}
