//! Handler-level test wiring over the in-memory orchestrator harness.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

use crate::auth::rate_limit::FixedWindowLimiter;
use crate::auth::testutil::TestHarness;
use crate::auth::AuthService;
use crate::kv::MemoryKv;

use super::state::{AuthConfig, AuthState};

pub(crate) fn test_state() -> Extension<Arc<AuthState>> {
    Extension(Arc::new(AuthState::new(
        AuthConfig::new(),
        FixedWindowLimiter::new(Arc::new(MemoryKv::new())),
    )))
}

/// Service and state extensions over fresh in-memory collaborators.
pub(crate) fn test_extensions() -> (Extension<Arc<AuthService>>, Extension<Arc<AuthState>>) {
    let harness = TestHarness::new();
    (Extension(harness.service.clone()), test_state())
}

/// Full harness plus the extensions, for tests that inspect delivered mail.
pub(crate) fn harness_with_extensions(
) -> (TestHarness, Extension<Arc<AuthService>>, Extension<Arc<AuthState>>) {
    let harness = TestHarness::new();
    let service = Extension(harness.service.clone());
    (harness, service, test_state())
}

pub(crate) fn response_status(response: impl IntoResponse) -> StatusCode {
    response.into_response().status()
}
