//! Token lifecycle and credential verification.
//!
//! Leaves first: [`password`] hashes and verifies secrets, [`tokens`] signs
//! and validates JWTs, [`token_store`] keeps the refresh whitelist and
//! one-time tokens, [`rate_limit`] counts requests. [`service`] is the
//! orchestrator tying them to the user-record and audit collaborators.

pub mod audit;
pub mod error;
pub mod models;
pub mod password;
pub mod rate_limit;
pub mod repo;
pub mod service;
pub mod token_store;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::error::AuthError;
pub use self::service::{AuthOptions, AuthService, TokenPair};

/// Current unix time in whole seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}
