//! # Custodia (Authentication & Session Authority)
//!
//! `custodia` is a user-authentication and session-management API:
//! registration with email verification, password login, JWT access/refresh
//! token issuance, password reset, API-key issuance, and role-based
//! authorization.
//!
//! ## Token model
//!
//! Access tokens are short-lived RS256 JWTs and are validated statelessly
//! (signature + expiry only). Refresh tokens are longer-lived JWTs that are
//! additionally gated by a server-side whitelist in the key-value store,
//! keyed by the token's `jti`; deleting the whitelist entry revokes the token
//! immediately, independent of its cryptographic expiry.
//!
//! ## One-time tokens
//!
//! Email-verification and password-reset tokens are random values handed to
//! the user exactly once. The server keeps only a hash (verification) or a
//! TTL-bound key-value entry (reset) and consumes the entry atomically on
//! redemption, so two racing redemptions cannot both succeed.
//!
//! ## Enumeration defense
//!
//! Login failures collapse to one error regardless of which factor failed,
//! and `forgot-password` answers identically whether or not the account
//! exists.

pub mod api;
pub mod auth;
pub mod cli;
pub mod kv;
pub mod mail;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
