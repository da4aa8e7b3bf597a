//! moka-backed cache
//!
//! moka enforces one lifetime for the whole cache, so each value also
//! records its own deadline and a shorter per-call TTL is checked on read.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Stamped {
    json: Arc<str>,
    deadline: Instant,
}

pub struct MemoryCache {
    inner: Cache<String, Stamped>,
    ttl: Duration,
}

impl MemoryCache {
    /// 1 000 entries for an hour; the taxonomy is a few dozen keys.
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(1_000, Duration::from_secs(3600))
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build();
        Self { inner, ttl }
    }

    /// Cache-wide entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryCache({} entries, ttl {:?})", self.inner.entry_count(), self.ttl)
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let Some(stamped) = self.inner.get(key).await else {
            return Ok(None);
        };
        if Instant::now() >= stamped.deadline {
            self.inner.invalidate(key).await;
            return Ok(None);
        }
        let value = serde_json::from_str(&stamped.json)
            .with_context(|| format!("Cached value under {} has an unexpected shape", key))?;
        Ok(Some(value))
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value).context("Value cannot be cached as JSON")?;
        let stamped = Stamped {
            json: json.into(),
            deadline: Instant::now() + ttl.min(self.ttl),
        };
        self.inner.insert(key.to_owned(), stamped).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }
}
