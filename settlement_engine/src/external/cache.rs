use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("The cache is unavailable: {0}")]
    Unavailable(String),
    #[error("Could not (de)serialize cached value: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// The slice of a key-value cache the engine relies on.
#[allow(async_fn_in_trait)]
pub trait KeyValueCache {
    /// Stores `value` under `key`. A `ttl_minutes` of zero keeps the entry until it is deleted.
    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl_minutes: u32) -> Result<(), CacheError>;
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Time left before `key` expires. `None` if the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t > now).unwrap_or(true)
    }
}

/// An in-process [`KeyValueCache`]. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn purge_expired(entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) {
    let before = entries.len();
    entries.retain(|_, e| e.is_live(now));
    let purged = before - entries.len();
    if purged > 0 {
        trace!("📦️ Purged {purged} expired cache entries");
    }
}

impl KeyValueCache for MemoryCache {
    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl_minutes: u32) -> Result<(), CacheError> {
        let value = serde_json::to_string(value)?;
        let expires_at = (ttl_minutes > 0).then(|| Utc::now() + Duration::minutes(i64::from(ttl_minutes)));
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, Utc::now());
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        let ttl = entries.get(key).filter(|e| e.is_live(now)).and_then(|e| e.expires_at).map(|t| t - now);
        Ok(ttl)
    }
}
