//! Email verification endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::auth::AuthService;

use super::state::AuthState;
use super::types::{MessageResponse, VerifyEmailRequest};
use super::{enforce_rate_limit, error_response, extract_client_ip};

/// Consume the emailed token and activate the account.
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
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
    // Rate limits run before any token work to avoid amplification.
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

    match service.verify_email(&request.token).await {
        Ok(()) => (
            StatusCode::OK,
            rate_headers,
            Json(MessageResponse::success("Email verified successfully.")),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
