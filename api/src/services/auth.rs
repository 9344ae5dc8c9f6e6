//! Bearer-token verification against the identity provider

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

/// Verified owner of a request. Store operations take one of these, so an
/// unauthenticated save or query cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor(String);

impl Actor {
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required")]
    Missing,
    #[error("Invalid authentication token")]
    Invalid,
    #[error("Authentication token expired")]
    Expired,
    #[error("Authentication not configured")]
    NotConfigured,
    #[error("Identity provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to the owning user's id
    async fn verify(&self, token: &str) -> Result<Actor, AuthError>;
}

/// Verify a possibly-absent token; absent or blank tokens never reach the provider
pub async fn authenticate(
    provider: &dyn IdentityProvider,
    token: Option<&str>,
) -> Result<Actor, AuthError> {
    let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;
    provider.verify(token).await
}

/// JWT claims carried by provider access tokens
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Local HS256 verification with the provider's JWT secret
pub struct JwtIdentity {
    key: DecodingKey,
}

impl JwtIdentity {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentity {
    async fn verify(&self, token: &str) -> Result<Actor, AuthError> {
        // HS256 only, to rule out algorithm confusion
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &self.key, &validation).map_err(|e| {
            tracing::debug!(error = ?e.kind(), "jwt rejected");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::Invalid);
        }
        Ok(Actor(data.claims.sub))
    }
}

/// Remote verification: `GET {base}/auth/v1/user`
#[derive(Clone)]
pub struct SupabaseIdentity {
    base_url: String,
    api_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
}

impl SupabaseIdentity {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn verify(&self, token: &str) -> Result<Actor, AuthError> {
        let url = format!("{}/auth/v1/user", self.base_url);

        let resp = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::Invalid);
        }
        if !status.is_success() {
            return Err(AuthError::Provider(format!("user lookup returned {}", status)));
        }

        let user: SupabaseUser = resp
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(Actor(user.id))
    }
}

/// Used when no provider is configured; every token is refused
pub struct Unconfigured;

#[async_trait]
impl IdentityProvider for Unconfigured {
    async fn verify(&self, _token: &str) -> Result<Actor, AuthError> {
        Err(AuthError::NotConfigured)
    }
}
