//! Redis-backed implementation of the key-value contract.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

use super::{KvCommand, KvError, KvReply, KvStore};

/// Key-value store backed by a shared Redis connection manager.
///
/// The manager reconnects on its own; callers only observe
/// [`KvError::Unavailable`] while the backend is unreachable. Batches are
/// submitted as a MULTI/EXEC transaction so the server applies them as one
/// unit, and get-del maps to the single GETDEL command.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to the key-value store.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Unavailable`] when the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(KvError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(KvError::from)?;
        Ok(Self { manager })
    }
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

fn reply_from_value(value: redis::Value) -> Result<KvReply, KvError> {
    match value {
        redis::Value::Int(int) => Ok(KvReply::Int(int)),
        redis::Value::Nil => Ok(KvReply::Nil),
        redis::Value::Okay => Ok(KvReply::Ok),
        redis::Value::SimpleString(text) => Ok(KvReply::Value(text)),
        redis::Value::BulkString(bytes) => Ok(KvReply::Value(
            String::from_utf8(bytes).map_err(|_| KvError::UnexpectedReply)?,
        )),
        _ => Err(KvError::UnexpectedReply),
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    // Round sub-second windows up so a short TTL never becomes "no TTL".
    let secs = ttl.as_secs();
    if secs == 0 && ttl.subsec_nanos() > 0 {
        1
    } else {
        secs
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut con = self.manager.clone();
        Ok(con.get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut con = self.manager.clone();
        Ok(con.set_ex(key, value, ttl_seconds(ttl)).await?)
    }

    async fn del(&self, key: &str) -> Result<u64, KvError> {
        let mut con = self.manager.clone();
        Ok(con.del(key).await?)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut con = self.manager.clone();
        Ok(redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut con)
            .await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut con = self.manager.clone();
        let ttl = i64::try_from(ttl_seconds(ttl)).map_err(|_| KvError::UnexpectedReply)?;
        Ok(con.expire(key, ttl).await?)
    }

    async fn atomic(&self, batch: &[KvCommand]) -> Result<Vec<KvReply>, KvError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in batch {
            match command {
                KvCommand::Incr { key } => {
                    pipe.cmd("INCR").arg(key);
                }
                KvCommand::Ttl { key } => {
                    pipe.cmd("TTL").arg(key);
                }
                KvCommand::Expire { key, ttl } => {
                    pipe.cmd("EXPIRE").arg(key).arg(ttl_seconds(*ttl));
                }
                KvCommand::Del { key } => {
                    pipe.cmd("DEL").arg(key);
                }
            }
        }

        let mut con = self.manager.clone();
        let values: Vec<redis::Value> = pipe.query_async(&mut con).await?;
        if values.len() != batch.len() {
            return Err(KvError::UnexpectedReply);
        }

        values.into_iter().map(reply_from_value).collect()
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut con = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut con)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_conversion_covers_scalar_values() -> Result<(), KvError> {
        assert_eq!(reply_from_value(redis::Value::Int(3))?, KvReply::Int(3));
        assert_eq!(reply_from_value(redis::Value::Nil)?, KvReply::Nil);
        assert_eq!(reply_from_value(redis::Value::Okay)?, KvReply::Ok);
        assert_eq!(
            reply_from_value(redis::Value::BulkString(b"user-1".to_vec()))?,
            KvReply::Value("user-1".to_string())
        );
        assert!(reply_from_value(redis::Value::Array(vec![])).is_err());
        Ok(())
    }

    #[test]
    fn ttl_seconds_never_rounds_to_zero() {
        assert_eq!(ttl_seconds(Duration::from_millis(200)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(60)), 60);
    }
}
