//! Login endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::auth::AuthService;

use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse, MessageResponse};
use super::{enforce_rate_limit, error_response, extract_client_ip};

/// Authenticate with email and password, returning an access/refresh pair.
///
/// Invalid credentials and unknown accounts answer identically, and the
/// login-specific limiter keys on IP plus email so one address cannot burn
/// another's window.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid credentials or unverified email", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
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
    if let Err(rejection) = enforce_rate_limit(
        &auth_state,
        &client_ip,
        auth_state.config().auth_quota(),
    )
    .await
    {
        return rejection;
    }

    let email = request.email.trim().to_lowercase();
    let login_identity = format!("{client_ip}:{email}");
    let rate_headers = match enforce_rate_limit(
        &auth_state,
        &login_identity,
        auth_state.config().login_quota(),
    )
    .await
    {
        Ok(rate_headers) => rate_headers,
        Err(rejection) => return rejection,
    };

    match service
        .login(&email, &request.password, Some(client_ip.as_str()))
        .await
    {
        Ok(pair) => (
            StatusCode::OK,
            rate_headers,
            Json(LoginResponse {
                status: "success".to_string(),
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            }),
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
    async fn login_missing_payload() {
        let (service, auth_state) = test_extensions();
        let response = login(HeaderMap::new(), service, auth_state, None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_unknown_email_is_bad_request() {
        let (service, auth_state) = test_extensions();
        let status = response_status(
            login(
                HeaderMap::new(),
                service,
                auth_state,
                Some(Json(LoginRequest {
                    email: "ghost@example.com".to_string(),
                    password: "Passw0rd!".to_string(),
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_active_user_returns_tokens() {
        let (harness, service, auth_state) = harness_with_extensions();
        harness
            .register_active("ana@example.com", "Passw0rd!")
            .await
            .expect("account becomes active");

        let status = response_status(
            login(
                HeaderMap::new(),
                service,
                auth_state,
                Some(Json(LoginRequest {
                    email: "Ana@Example.com".to_string(),
                    password: "Passw0rd!".to_string(),
                })),
            )
            .await,
        );
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn sixth_attempt_in_window_is_limited() {
        let (service, auth_state) = test_extensions();

        for _ in 0..5 {
            let status = response_status(
                login(
                    HeaderMap::new(),
                    service.clone(),
                    auth_state.clone(),
                    Some(Json(LoginRequest {
                        email: "ana@example.com".to_string(),
                        password: "wrong".to_string(),
                    })),
                )
                .await,
            );
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let response = login(
            HeaderMap::new(),
            service,
            auth_state,
            Some(Json(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "wrong".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }
}
