//! Whitelist of outstanding refresh tokens and one-time reset tokens.
//!
//! Both live in the key-value store with TTLs matching their lifetimes, so
//! expiry needs no background sweep: an entry the store no longer returns is
//! simply absent. Revocation is a delete; redemption is an atomic get-del.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::kv::{KvError, KvStore};

const REFRESH_PREFIX: &str = "refresh_token:";
const RESET_PREFIX: &str = "password_reset:";

#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KvStore>,
}

impl TokenStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Register a refresh token id for `user_id`, valid for `ttl`.
    ///
    /// Overwrites silently; jtis are random UUIDs, so a collision would mean
    /// a reissued id rather than a distinct token.
    ///
    /// # Errors
    ///
    /// Propagates [`KvError`] when the store is unreachable.
    pub async fn whitelist_refresh(
        &self,
        jti: Uuid,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), KvError> {
        self.kv
            .set_with_ttl(
                &format!("{REFRESH_PREFIX}{jti}"),
                &user_id.to_string(),
                ttl,
            )
            .await
    }

    /// True iff the jti is present and mapped to the same subject.
    ///
    /// Store failures propagate: the caller fails closed on this path.
    ///
    /// # Errors
    ///
    /// Propagates [`KvError`] when the store is unreachable.
    pub async fn is_refresh_whitelisted(&self, jti: Uuid, user_id: Uuid) -> Result<bool, KvError> {
        let stored = self.kv.get(&format!("{REFRESH_PREFIX}{jti}")).await?;
        Ok(stored.is_some_and(|subject| subject == user_id.to_string()))
    }

    /// Delete the whitelist entry for `jti`.
    ///
    /// Returns how many entries were removed; 0 means already expired or
    /// revoked, which callers treat as success.
    ///
    /// # Errors
    ///
    /// Propagates [`KvError`] when the store is unreachable.
    pub async fn revoke_refresh(&self, jti: Uuid) -> Result<u64, KvError> {
        self.kv.del(&format!("{REFRESH_PREFIX}{jti}")).await
    }

    /// Store a one-time password-reset token for `user_id`.
    ///
    /// The raw token is the key; it is never persisted anywhere else and the
    /// entry dies with its TTL.
    ///
    /// # Errors
    ///
    /// Propagates [`KvError`] when the store is unreachable.
    pub async fn issue_reset_token(
        &self,
        raw_token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), KvError> {
        self.kv
            .set_with_ttl(
                &format!("{RESET_PREFIX}{raw_token}"),
                &user_id.to_string(),
                ttl,
            )
            .await
    }

    /// Redeem a reset token, consuming it in the same atomic step.
    ///
    /// Of two racing redemptions exactly one observes the subject; the other
    /// sees `None`.
    ///
    /// # Errors
    ///
    /// Propagates [`KvError`] when the store is unreachable or the stored
    /// subject is not a UUID.
    pub async fn redeem_reset_token(&self, raw_token: &str) -> Result<Option<Uuid>, KvError> {
        let Some(subject) = self.kv.get_del(&format!("{RESET_PREFIX}{raw_token}")).await? else {
            return Ok(None);
        };
        let user_id = subject.parse().map_err(|_| KvError::UnexpectedReply)?;
        Ok(Some(user_id))
    }
}
