//! Registration endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::auth::AuthService;

use super::state::AuthState;
use super::types::{MessageResponse, RegisterRequest};
use super::{enforce_rate_limit, error_response, extract_client_ip, valid_email};

/// Create a `pending` account and send the verification link.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = MessageResponse),
        (status = 400, description = "Invalid payload", body = MessageResponse),
        (status = 409, description = "Email already registered", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
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

    let name = request.name.trim();
    let email = request.email.trim().to_lowercase();
    if name.is_empty() || !valid_email(&email) || request.password.len() < 8 {
        return (
            StatusCode::BAD_REQUEST,
            rate_headers,
            Json(MessageResponse::error("Invalid registration payload")),
        )
            .into_response();
    }

    match service.register(name, &email, &request.password).await {
        Ok(()) => (
            StatusCode::CREATED,
            rate_headers,
            Json(MessageResponse::success(
                "Registration successful. Check your email to activate the account.",
            )),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{response_status, test_extensions};
    use super::*;

    #[tokio::test]
    async fn register_missing_payload() {
        let (service, auth_state) = test_extensions();
        let response = register(HeaderMap::new(), service, auth_state, None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let (service, auth_state) = test_extensions();
        let response = register(
            HeaderMap::new(),
            service,
            auth_state,
            Some(Json(RegisterRequest {
                name: "Ana".to_string(),
                email: "not-an-email".to_string(),
                password: "Passw0rd!".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_creates_then_conflicts() {
        let (service, auth_state) = test_extensions();

        let request = || {
            Some(Json(RegisterRequest {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                password: "Passw0rd!".to_string(),
            }))
        };

        let status = response_status(
            register(
                HeaderMap::new(),
                service.clone(),
                auth_state.clone(),
                request(),
            )
            .await,
        );
        assert_eq!(status, StatusCode::CREATED);

        let status =
            response_status(register(HeaderMap::new(), service, auth_state, request()).await);
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
