// JWT verification for caller identity
// Decision: Use HS256 algorithm for simplicity (symmetric key)
// Decision: Prefer the pairwise subject over `sub` when the issuer provides one

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims Flowly reads from an access token
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IdentityClaims {
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Per-client subject issued by pairwise identity providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairwise_sub: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

impl IdentityClaims {
    /// The user id the token speaks for
    pub fn user_id(&self) -> Option<&str> {
        self.pairwise_sub
            .as_deref()
            .or(self.sub.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Verifies (and, for tests and tooling, issues) HS256 tokens
#[derive(Clone)]
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate a token and return the user id it carries
    pub fn verify(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<IdentityClaims>(token, &self.decoding_key, &validation)
            .context("Invalid access token")?;

        token_data
            .claims
            .user_id()
            .map(str::to_string)
            .context("Token carries no subject")
    }

    /// Issue a token for a user id
    pub fn issue(&self, user_id: &str, lifetime: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = IdentityClaims {
            sub: Some(user_id.to_string()),
            pairwise_sub: None,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to encode access token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-for-testing";

    #[test]
    fn test_issue_and_verify() {
        let verifier = JwtVerifier::new(SECRET);
        let token = verifier.issue("u1", Duration::minutes(15)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), "u1");
    }

    #[test]
    fn test_pairwise_subject_wins() {
        let verifier = JwtVerifier::new(SECRET);
        let claims = IdentityClaims {
            sub: Some("global-id".to_string()),
            pairwise_sub: Some("pairwise-id".to_string()),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(verifier.verify(&token).unwrap(), "pairwise-id");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtVerifier::new("other-secret")
            .issue("u1", Duration::minutes(5))
            .unwrap();
        assert!(JwtVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let token = verifier.issue("u1", Duration::hours(-1)).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_token_without_subject_rejected() {
        let claims = IdentityClaims {
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            ..Default::default()
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(JwtVerifier::new(SECRET).verify(&token).is_err());
    }
}
