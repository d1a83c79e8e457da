//! Cache layer
//!
//! Hot read paths (the category list and single categories) are cached in
//! process with moka. Writers invalidate by key or by glob pattern.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mitaan::cache::{create_cache, CacheLayer};
//! use mitaan::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("categories:list", &list, Duration::from_secs(60)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// Methods are generic over the cached value, so this trait is used through
/// concrete types rather than as `dyn CacheLayer`.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value with its own time-to-live
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all keys matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Shared cache handle used by services
pub type Cache = MemoryCache;

/// Create the process cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_entries, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let cache = create_cache(&CacheConfig::default());
        assert_eq!(cache.default_ttl(), Duration::from_secs(600));

        cache
            .set("test_key", &"test_value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }
}
