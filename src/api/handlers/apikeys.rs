//! API-key issuance endpoint (admin only).

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use utoipa::ToSchema;

use crate::auth::service::ApiKeyRequest;
use crate::auth::AuthService;

use super::auth::types::MessageResponse;
use super::auth::{error_response, extract_bearer_token};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateApiKeyRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// RFC 3339 timestamp; omitted means the key never expires.
    pub expires_at: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiKeyData {
    pub api_key: String,
    pub api_key_id: String,
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_at: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateApiKeyResponse {
    pub status: String,
    pub message: String,
    pub data: ApiKeyData,
}

/// Issue a new API key; the raw key appears in this response and never again.
#[utoipa::path(
    post,
    path = "/apikeys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "API key created", body = CreateApiKeyResponse),
        (status = 400, description = "Invalid payload", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = MessageResponse),
        (status = 403, description = "Caller lacks the admin role", body = MessageResponse)
    ),
    tag = "apikeys"
)]
pub async fn create_api_key(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<CreateApiKeyRequest>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse::error("Missing bearer token")),
        )
            .into_response();
    };

    let claims = match service.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(err) => return error_response(&err),
    };

    let request = payload.map_or_else(CreateApiKeyRequest::default_payload, |Json(body)| body);

    let expires_at = match request.expires_at.as_deref().map(parse_expiry).transpose() {
        Ok(expires_at) => expires_at,
        Err(()) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse::error(
                    "expires_at must be an RFC 3339 timestamp",
                )),
            )
                .into_response()
        }
    };

    match service
        .create_api_key(
            &claims,
            ApiKeyRequest {
                name: request.name,
                permissions: request.permissions,
                expires_at,
            },
        )
        .await
    {
        Ok(created) => (
            StatusCode::CREATED,
            Json(CreateApiKeyResponse {
                status: "success".to_string(),
                message: "API key created. Store it safely, it will not be shown again."
                    .to_string(),
                data: ApiKeyData {
                    api_key: created.api_key,
                    api_key_id: created.record.id.to_string(),
                    name: created.record.name,
                    permissions: created.record.permissions,
                    expires_at: created.record.expires_at.and_then(format_expiry),
                },
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

impl CreateApiKeyRequest {
    fn default_payload() -> Self {
        Self {
            name: None,
            permissions: Vec::new(),
            expires_at: None,
        }
    }
}

fn parse_expiry(value: &str) -> Result<i64, ()> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(OffsetDateTime::unix_timestamp)
        .map_err(|_| ())
}

fn format_expiry(unix_seconds: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(unix_seconds)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
}

#[cfg(test)]
mod tests {
    use super::super::auth::testutil::harness_with_extensions;
    use super::*;
    use crate::auth::models::Role;
    use crate::auth::unix_now;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header");
        headers.insert(axum::http::header::AUTHORIZATION, value);
        headers
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (_harness, service, _state) = harness_with_extensions();
        let response = create_api_key(HeaderMap::new(), service, None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let (harness, service, _state) = harness_with_extensions();
        harness
            .register_active("ana@example.com", "Passw0rd!")
            .await
            .expect("account becomes active");
        let pair = harness
            .service
            .login("ana@example.com", "Passw0rd!", None)
            .await
            .expect("login succeeds");

        let response = create_api_key(bearer(&pair.access_token), service, None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn invalid_expiry_is_rejected() {
        let (harness, service, _state) = harness_with_extensions();
        let token = harness.sign_access_for(&harness.claims_for(&[Role::Admin]));

        let response = create_api_key(
            bearer(&token),
            service,
            Some(Json(CreateApiKeyRequest {
                name: None,
                permissions: vec![],
                expires_at: Some("next tuesday".to_string()),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_creates_key_with_expiry() {
        let (harness, service, _state) = harness_with_extensions();
        let token = harness.sign_access_for(&harness.claims_for(&[Role::Admin]));

        let expires_at = format_expiry(unix_now() + 3600).expect("valid timestamp");
        let response = create_api_key(
            bearer(&token),
            service,
            Some(Json(CreateApiKeyRequest {
                name: Some("ci".to_string()),
                permissions: vec!["read:users".to_string()],
                expires_at: Some(expires_at),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn expiry_round_trips_through_rfc3339() {
        let formatted = format_expiry(1_700_000_000).expect("valid timestamp");
        assert_eq!(parse_expiry(&formatted), Ok(1_700_000_000));
        assert!(parse_expiry("not-a-date").is_err());
    }
}
