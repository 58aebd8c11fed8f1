//! In-memory cache provider backed by moka.
//!
//! Entries are weighted by payload size so `max_size_bytes` bounds memory use.
//! Eviction is automatic; [`Cache::gc`] only flushes moka's pending work.

use std::time::{Duration, Instant};

use bytes::Bytes;
use moka::future::Cache as MokaCache;

use super::traits::{BoxFuture, Cache, GcResult, ServiceCacheError};

/// Memory-bounded tile payload store.
pub struct MemoryCacheProvider {
    cache: MokaCache<String, Bytes>,
    max_size_bytes: u64,
}

impl MemoryCacheProvider {
    /// Creates a provider holding at most `max_size_bytes` of payload, with an
    /// optional time-to-live per entry.
    pub fn new(max_size_bytes: u64, ttl: Option<Duration>) -> Self {
        let mut builder = MokaCache::builder()
            .weigher(|_key: &String, value: &Bytes| -> u32 {
                value.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes);

        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            max_size_bytes,
        }
    }
}

impl Cache for MemoryCacheProvider {
    fn set(&self, key: &str, value: Bytes) -> BoxFuture<'_, Result<(), ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            if value.len() as u64 > self.max_size_bytes {
                return Err(ServiceCacheError::ValueTooLarge {
                    size: value.len(),
                    max: self.max_size_bytes as usize,
                });
            }
            self.cache.insert(key, value).await;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Bytes>, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.cache.get(&key).await) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.cache.remove(&key).await.is_some()) })
    }

    fn contains(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.cache.contains_key(&key)) })
    }

    fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    fn gc(&self) -> BoxFuture<'_, Result<GcResult, ServiceCacheError>> {
        Box::pin(async move {
            let start = Instant::now();
            let size_before = self.cache.weighted_size();
            let count_before = self.cache.entry_count();

            self.cache.run_pending_tasks().await;

            Ok(GcResult {
                entries_removed: count_before.saturating_sub(self.cache.entry_count()) as usize,
                bytes_freed: size_before.saturating_sub(self.cache.weighted_size()),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        })
    }
}
