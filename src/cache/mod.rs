//! Cache layer
//!
//! An in-process moka cache holds the taxonomy (category list and
//! subcategories per category), which every page needs and which only
//! changes when seeding runs.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Key/value cache with JSON-serialized values.
///
/// Generic methods make this trait unusable as `dyn`, so services hold the
/// concrete [`MemoryCache`].
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Store `value`; `ttl` is capped by the cache-wide lifetime.
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    tracing::debug!(capacity = config.max_capacity, ttl_secs = config.ttl_seconds, "Taxonomy cache configured");
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl))
}
