//! Error taxonomy for core auth operations.
//!
//! Every expected failure is a value with a stable kind and an HTTP status
//! hint; only genuinely unexpected conditions travel as `Internal`. Token and
//! credential failures are deliberately coarse so callers cannot tell which
//! check rejected them.

use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::password::HashError;
use crate::kv::KvError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already registered")]
    Conflict,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("please verify your email before logging in")]
    EmailNotVerified,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("authentication required")]
    Unauthorized,
    #[error("insufficient permissions for this action")]
    Forbidden,
    #[error("token store unavailable")]
    StoreUnavailable(#[from] KvError),
    #[error("corrupt credential hash")]
    HashFormat(#[from] HashError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Default HTTP status for this kind.
    ///
    /// `InvalidOrExpiredToken` maps to 400; the refresh endpoint overrides it
    /// to 401 because there the token is the credential itself.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::EmailNotVerified | Self::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::HashFormat(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Internal detail stays in the server-side logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "service temporarily unavailable".to_string(),
            Self::HashFormat(_) | Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
