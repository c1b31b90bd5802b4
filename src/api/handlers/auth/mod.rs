//! Auth endpoints and their shared helpers.
//!
//! Handlers stay thin: extract and sanity-check the payload, enforce rate
//! limits before any expensive work, then delegate to the orchestrator and
//! map its outcome to a status code.

pub mod login;
pub mod password;
pub mod register;
pub mod session;
pub mod state;
pub mod types;
pub mod verification;

#[cfg(test)]
pub(crate) mod testutil;

use axum::{
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use tracing::error;

use crate::auth::rate_limit::{RateLimitDecision, RateLimitQuota};
use crate::auth::{unix_now, AuthError};

use self::state::AuthState;
use self::types::MessageResponse;

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Map an orchestrator failure to a response, hiding internal detail.
pub(super) fn error_response(err: &AuthError) -> Response {
    if matches!(err, AuthError::Internal(_) | AuthError::HashFormat(_)) {
        error!("auth operation failed: {err:?}");
    }
    (
        err.status_code(),
        Json(MessageResponse::error(err.public_message())),
    )
        .into_response()
}

/// Rate-limit headers mirrored on every limited endpoint's response.
pub(super) fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    let reset_at = unix_now() + i64::try_from(decision.reset_after.as_secs()).unwrap_or(0);
    if let Ok(value) = HeaderValue::from_str(&reset_at.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
    if let Some(retry_after) = decision.retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
            headers.insert(RETRY_AFTER, value);
        }
    }
    headers
}

/// Count this request and either hand back the headers to attach or the
/// ready-made 429 response.
pub(super) async fn enforce_rate_limit(
    auth_state: &AuthState,
    identity: &str,
    quota: RateLimitQuota,
) -> Result<HeaderMap, Response> {
    let decision = auth_state.limiter().check(identity, quota).await;
    let headers = rate_limit_headers(&decision);

    if decision.allowed {
        Ok(headers)
    } else {
        Err((
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Json(MessageResponse::error(
                "Too many requests. Please try again later.",
            )),
        )
            .into_response())
    }
}
