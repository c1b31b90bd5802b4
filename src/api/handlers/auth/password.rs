//! Forgot/reset password endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::auth::AuthService;

use super::state::AuthState;
use super::types::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest};
use super::{enforce_rate_limit, error_response, extract_client_ip, valid_email};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If the email is registered, a password reset link has been sent.";

/// Request a password-reset link.
///
/// The response is identical whether or not the account exists; only the
/// delivery collaborator learns the difference.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Generic acknowledgement", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse::error("Missing payload")),
            )
                .into_response()
        }
    };

    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let rate_headers = match enforce_rate_limit(
        &auth_state,
        &client_ip,
        auth_state.config().auth_quota(),
    )
    .await
    {
        Ok(rate_headers) => rate_headers,
        Err(rejection) => return rejection,
    };

    let email = request.email.trim().to_lowercase();
    if !valid_email(&email) {
        // Malformed emails get the same opaque acknowledgement.
        return (
            StatusCode::OK,
            rate_headers,
            Json(MessageResponse::success(FORGOT_PASSWORD_MESSAGE)),
        )
            .into_response();
    }

    match service.forgot_password(&email).await {
        Ok(()) => (
            StatusCode::OK,
            rate_headers,
            Json(MessageResponse::success(FORGOT_PASSWORD_MESSAGE)),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Redeem a one-time reset token and set a new password.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse::error("Missing payload")),
            )
                .into_response()
        }
    };

    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let rate_headers = match enforce_rate_limit(
        &auth_state,
        &client_ip,
        auth_state.config().auth_quota(),
    )
    .await
    {
        Ok(rate_headers) => rate_headers,
        Err(rejection) => return rejection,
    };

    if request.new_password.len() < 8 {
        return (
            StatusCode::BAD_REQUEST,
            rate_headers,
            Json(MessageResponse::error(
                "Password must be at least 8 characters.",
            )),
        )
            .into_response();
    }

    match service
        .reset_password(&request.token, &request.new_password)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            rate_headers,
            Json(MessageResponse::success(
                "Password reset successfully. You can now log in with the new password.",
            )),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
