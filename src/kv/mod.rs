//! Key-value store contract shared by the token store and the rate limiter.
//!
//! The store is the only cross-request coordination point: revocation
//! visibility, one-time token redemption, and rate-limit counters all reduce
//! to its atomic single-key primitives. Implementations must guarantee that
//! [`KvStore::get_del`] and [`KvStore::atomic`] are not splittable into a
//! separate read followed by a separate write.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod memory;
mod redis;

pub use self::memory::MemoryKv;
pub use self::redis::RedisKv;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected reply from key-value store")]
    UnexpectedReply,
}

/// One command inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    Incr { key: String },
    Ttl { key: String },
    Expire { key: String, ttl: Duration },
    Del { key: String },
}

/// Reply for one command inside an atomic batch, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvReply {
    Int(i64),
    Value(String),
    Nil,
    Ok,
}

impl KvReply {
    /// Integer payload of the reply.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::UnexpectedReply`] when the reply carries no integer.
    pub fn as_int(&self) -> Result<i64, KvError> {
        match self {
            Self::Int(value) => Ok(*value),
            _ => Err(KvError::UnexpectedReply),
        }
    }
}

/// Async key-value backend with TTL support and atomic batches.
///
/// All operations are single-key; the backend's own serialization of
/// concurrent single-key read-modify-write operations is what makes the
/// higher layers correct without in-process locks.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set `key` to `value`, expiring after `ttl`. Overwrites silently.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Delete `key`, reporting how many entries were removed (0 or 1).
    async fn del(&self, key: &str) -> Result<u64, KvError>;

    /// Fetch and delete `key` in one atomic step.
    ///
    /// Two concurrent calls for the same key must not both observe the value.
    async fn get_del(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set the TTL of an existing key; returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Execute `batch` atomically and return one reply per command, in order.
    async fn atomic(&self, batch: &[KvCommand]) -> Result<Vec<KvReply>, KvError>;

    /// Cheap liveness probe used by the health path.
    async fn ping(&self) -> Result<(), KvError>;
}
