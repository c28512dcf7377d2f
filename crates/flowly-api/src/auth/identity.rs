// Caller identity extractors
// Decision: Identity is optional everywhere; handlers that need a user reject with 401
// Decision: An invalid token downgrades to anonymous instead of failing the request
// Decision: The access_token query parameter is honored only for event streams,
//           since EventSource cannot set headers

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::jwt::JwtVerifier;
use crate::config::ServerConfig;

/// Header carrying a trusted user id (tests and local development)
pub const USER_ID_HEADER: &str = "x-flowly-user-id";

/// Authentication error
#[derive(Debug, Clone, Serialize)]
pub struct AuthError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl AuthError {
    pub fn unauthorized(message: &str) -> Self {
        Self {
            error: message.to_string(),
            status: StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// How the caller's identity was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Trusted `x-flowly-user-id` header
    TrustedHeader,
    /// Bearer token in the Authorization header
    Bearer,
    /// Token in the `access_token` query parameter
    QueryToken,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub method: AuthMethod,
}

/// Auth state shared across routes
#[derive(Clone, Default)]
pub struct AuthState {
    pub jwt: Option<Arc<JwtVerifier>>,
    pub trust_user_header: bool,
}

impl AuthState {
    pub fn new(jwt: Option<JwtVerifier>, trust_user_header: bool) -> Self {
        Self {
            jwt: jwt.map(Arc::new),
            trust_user_header,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.jwt_secret.as_deref().map(JwtVerifier::new),
            config.trust_user_header,
        )
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn read_trusted_header(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(non_empty)
        .map(str::to_string)
}

fn read_bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    non_empty(token).map(str::to_string)
}

fn read_query_token(parts: &Parts) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(&parts.uri).ok()?;
    query
        .access_token
        .as_deref()
        .and_then(non_empty)
        .map(str::to_string)
}

/// Resolve the caller from request parts; `None` means anonymous
pub fn resolve_identity(
    parts: &Parts,
    auth: &AuthState,
    allow_query_token: bool,
) -> Option<Identity> {
    if auth.trust_user_header {
        if let Some(user_id) = read_trusted_header(parts) {
            return Some(Identity {
                user_id,
                method: AuthMethod::TrustedHeader,
            });
        }
    }

    let jwt = auth.jwt.as_ref()?;
    let (token, method) = match read_bearer_token(parts) {
        Some(token) => (token, AuthMethod::Bearer),
        None if allow_query_token => (read_query_token(parts)?, AuthMethod::QueryToken),
        None => return None,
    };

    match jwt.verify(&token) {
        Ok(user_id) => Some(Identity { user_id, method }),
        Err(e) => {
            tracing::debug!("JWT validation failed: {:#}", e);
            None
        }
    }
}

/// Optional identity from headers only
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Option<Identity>);

impl OptionalIdentity {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|identity| identity.user_id.as_str())
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        Ok(OptionalIdentity(resolve_identity(parts, &auth, false)))
    }
}

/// Optional identity for event streams (also accepts `access_token` in the query)
#[derive(Debug, Clone)]
pub struct StreamIdentity(pub Option<Identity>);

impl StreamIdentity {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|identity| identity.user_id.as_str())
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for StreamIdentity
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        Ok(StreamIdentity(resolve_identity(parts, &auth, true)))
    }
}

/// Required identity - returns 401 if the caller is anonymous
#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        resolve_identity(parts, &auth, false)
            .ok_or_else(|| AuthError::unauthorized("Authentication required"))
    }
}
