//! In-process key-value backend for tests and single-node development.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{KvCommand, KvError, KvReply, KvStore};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Mutex-guarded map with lazy TTL eviction.
///
/// Every operation takes the lock once, so batches and get-del are atomic by
/// construction. Expired entries are treated as absent on every read path and
/// physically removed when touched.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
        return None;
    }
    entries.get_mut(key)
}

fn apply(entries: &mut HashMap<String, Entry>, command: &KvCommand, now: Instant) -> KvReply {
    match command {
        KvCommand::Incr { key } => {
            if let Some(entry) = live_entry(entries, key, now) {
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                KvReply::Int(count)
            } else {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                KvReply::Int(1)
            }
        }
        KvCommand::Ttl { key } => match live_entry(entries, key, now) {
            // -2 absent, -1 present without expiry, else whole seconds left
            None => KvReply::Int(-2),
            Some(entry) => match entry.expires_at {
                None => KvReply::Int(-1),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(now);
                    KvReply::Int(i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX))
                }
            },
        },
        KvCommand::Expire { key, ttl } => match live_entry(entries, key, now) {
            None => KvReply::Int(0),
            Some(entry) => {
                entry.expires_at = Some(now + *ttl);
                KvReply::Int(1)
            }
        },
        KvCommand::Del { key } => {
            let removed = live_entry(entries, key, now).is_some() && entries.remove(key).is_some();
            KvReply::Int(i64::from(removed))
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock();
        Ok(live_entry(&mut entries, key, Instant::now()).map(|entry| entry.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64, KvError> {
        let mut entries = self.entries.lock();
        match apply(&mut entries, &KvCommand::Del { key: key.to_string() }, Instant::now()) {
            KvReply::Int(removed) => Ok(u64::try_from(removed).unwrap_or(0)),
            _ => Err(KvError::UnexpectedReply),
        }
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if live_entry(&mut entries, key, now).is_none() {
            return Ok(None);
        }
        Ok(entries.remove(key).map(|entry| entry.value))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries.lock();
        let command = KvCommand::Expire {
            key: key.to_string(),
            ttl,
        };
        match apply(&mut entries, &command, Instant::now()) {
            KvReply::Int(updated) => Ok(updated == 1),
            _ => Err(KvError::UnexpectedReply),
        }
    }

    async fn atomic(&self, batch: &[KvCommand]) -> Result<Vec<KvReply>, KvError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Ok(batch
            .iter()
            .map(|command| apply(&mut entries, command, now))
            .collect())
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}
