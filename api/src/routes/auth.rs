//! Request authentication helpers
//!
//! Dashboard clients send `auth_token` in the JSON body or query string.
//! An `Authorization: Bearer` header is accepted when neither is present.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use crate::AppState;
use crate::services::auth::{Actor, authenticate};
use crate::services::error::ApiError;

/// Optional bearer token from the Authorization header
pub struct BearerToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(BearerToken(token))
    }
}

/// Verify the caller and charge one token from their rate bucket
pub async fn require_actor(
    state: &AppState,
    payload_token: Option<&str>,
    bearer: &BearerToken,
) -> Result<Actor, ApiError> {
    let token = payload_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or(bearer.0.as_deref());

    let actor = authenticate(state.identity.as_ref(), token).await?;

    if !state.rate_limiter.check(actor.user_id()) {
        tracing::warn!(user_id = %actor, "rate limited");
        return Err(ApiError::RateLimited);
    }

    Ok(actor)
}
