//! Shared auth-endpoint state: quotas and the request limiter.

use crate::auth::rate_limit::{FixedWindowLimiter, RateLimitQuota};
use std::time::Duration;

const DEFAULT_AUTH_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_AUTH_MAX_REQUESTS: u32 = 20;
const DEFAULT_LOGIN_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_LOGIN_MAX_REQUESTS: u32 = 5;

#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    auth_quota: RateLimitQuota,
    login_quota: RateLimitQuota,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            auth_quota: RateLimitQuota::new(DEFAULT_AUTH_WINDOW, DEFAULT_AUTH_MAX_REQUESTS),
            login_quota: RateLimitQuota::new(DEFAULT_LOGIN_WINDOW, DEFAULT_LOGIN_MAX_REQUESTS),
        }
    }

    #[must_use]
    pub fn with_auth_quota(mut self, quota: RateLimitQuota) -> Self {
        self.auth_quota = quota;
        self
    }

    #[must_use]
    pub fn with_login_quota(mut self, quota: RateLimitQuota) -> Self {
        self.login_quota = quota;
        self
    }

    /// Per-IP quota fronting every auth entry point.
    #[must_use]
    pub fn auth_quota(&self) -> RateLimitQuota {
        self.auth_quota
    }

    /// Stricter per-IP-and-email quota for login attempts.
    #[must_use]
    pub fn login_quota(&self) -> RateLimitQuota {
        self.login_quota
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuthState {
    config: AuthConfig,
    limiter: FixedWindowLimiter,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, limiter: FixedWindowLimiter) -> Self {
        Self { config, limiter }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }
}
