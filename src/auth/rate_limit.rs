//! Fixed-window request counters over the key-value store.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::kv::{KvCommand, KvError, KvStore};

const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// Window length and request ceiling for one identity class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitQuota {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitQuota {
    #[must_use]
    pub const fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }
}

/// Result of one counter check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Decision handed out when the counter backend is unreachable.
    ///
    /// Availability wins over strict enforcement for this component.
    fn fail_open(quota: RateLimitQuota) -> Self {
        Self {
            allowed: true,
            limit: quota.max_requests,
            remaining: quota.max_requests,
            reset_after: quota.window,
            retry_after: None,
        }
    }
}

/// Fixed-window counter keyed by client identity.
///
/// Each check atomically increments the identity's counter and reads its TTL
/// in one batch. A counter with no TTL (first request of a window, or a
/// half-applied batch from a crashed peer) is treated as a fresh window and
/// given one, so the counter can neither lock an identity out forever nor
/// keep a window open indefinitely.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    kv: Arc<dyn KvStore>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Count this request against `identity` and decide whether to admit it.
    ///
    /// Never fails: backend errors log a warning and admit the request.
    pub async fn check(&self, identity: &str, quota: RateLimitQuota) -> RateLimitDecision {
        match self.try_check(identity, quota).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!("rate limiter failing open for {identity}: {err}");
                RateLimitDecision::fail_open(quota)
            }
        }
    }

    async fn try_check(
        &self,
        identity: &str,
        quota: RateLimitQuota,
    ) -> Result<RateLimitDecision, KvError> {
        let key = format!("{RATE_LIMIT_PREFIX}{identity}");

        let replies = self
            .kv
            .atomic(&[
                KvCommand::Incr { key: key.clone() },
                KvCommand::Ttl { key: key.clone() },
            ])
            .await?;

        let [count_reply, ttl_reply] = replies.as_slice() else {
            return Err(KvError::UnexpectedReply);
        };
        let count = count_reply.as_int()?;
        let ttl = ttl_reply.as_int()?;

        // TTL -1/-2 means a fresh window (or a counter that lost its expiry);
        // stamp the window length so the key always converges to expiring.
        let reset_after = if ttl < 0 {
            self.kv.expire(&key, quota.window).await?;
            quota.window
        } else {
            Duration::from_secs(u64::try_from(ttl).unwrap_or(0))
        };

        let allowed = count <= i64::from(quota.max_requests);
        let remaining = u32::try_from(i64::from(quota.max_requests) - count).unwrap_or(0);

        Ok(RateLimitDecision {
            allowed,
            limit: quota.max_requests,
            remaining,
            reset_after,
            retry_after: (!allowed).then_some(reset_after),
        })
    }
}
