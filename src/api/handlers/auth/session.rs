//! Refresh and logout endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::auth::{AuthError, AuthService};

use super::state::AuthState;
use super::types::{LogoutRequest, MessageResponse, RefreshRequest, RefreshResponse};
use super::{enforce_rate_limit, error_response, extract_client_ip};

/// Exchange a whitelisted refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
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

    match service.refresh(&request.refresh_token).await {
        Ok(access_token) => (
            StatusCode::OK,
            rate_headers,
            Json(RefreshResponse { access_token }),
        )
            .into_response(),
        // Here the token is the credential, so rejection is 401 rather than
        // the 400 used by the one-time token endpoints.
        Err(AuthError::InvalidOrExpiredToken) => (
            StatusCode::UNAUTHORIZED,
            rate_headers,
            Json(MessageResponse::error("invalid or expired token")),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Revoke a refresh token. Idempotent: unknown tokens still return 200.
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Refresh token revoked", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request: LogoutRequest = match payload {
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

    match service.logout(&request.refresh_token).await {
        Ok(_revoked) => (
            StatusCode::OK,
            rate_headers,
            Json(MessageResponse::success("Logged out successfully.")),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{harness_with_extensions, response_status, test_extensions};
    use super::*;

    #[tokio::test]
    async fn refresh_missing_payload() {
        let (service, auth_state) = test_extensions();
        let response = refresh(HeaderMap::new(), service, auth_state, None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_garbage_token_is_unauthorized() {
        let (service, auth_state) = test_extensions();
        let status = response_status(
            refresh(
                HeaderMap::new(),
                service,
                auth_state,
                Some(Json(RefreshRequest {
                    refresh_token: "garbage".to_string(),
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_then_refresh_fails() {
        let (harness, service, auth_state) = harness_with_extensions();
        harness
            .register_active("ana@example.com", "Passw0rd!")
            .await
            .expect("account becomes active");
        let pair = harness
            .service
            .login("ana@example.com", "Passw0rd!", None)
            .await
            .expect("login succeeds");

        let status = response_status(
            refresh(
                HeaderMap::new(),
                service.clone(),
                auth_state.clone(),
                Some(Json(RefreshRequest {
                    refresh_token: pair.refresh_token.clone(),
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::OK);

        let status = response_status(
            logout(
                HeaderMap::new(),
                service.clone(),
                auth_state.clone(),
                Some(Json(LogoutRequest {
                    refresh_token: pair.refresh_token.clone(),
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::OK);

        let status = response_status(
            refresh(
                HeaderMap::new(),
                service.clone(),
                auth_state.clone(),
                Some(Json(RefreshRequest {
                    refresh_token: pair.refresh_token.clone(),
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Logging out twice is still a 200.
        let status = response_status(
            logout(
                HeaderMap::new(),
                service,
                auth_state,
                Some(Json(LogoutRequest {
                    refresh_token: pair.refresh_token,
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::OK);
    }
}
