//! Storage interface behind the remote tile cache.
//!
//! The [`Cache`] trait is a plain key-value store over string keys and byte
//! payloads. Tile-specific naming lives in [`super::TileContentCache`], so any
//! provider (in-memory, disk, a cloud bucket client) can sit underneath.
//!
//! Methods return [`BoxFuture`] so providers can be used as `Arc<dyn Cache>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;

/// Result of a garbage collection pass.
#[derive(Debug, Clone, Default)]
pub struct GcResult {
    pub entries_removed: usize,
    pub bytes_freed: u64,
    pub duration_ms: u64,
}

impl fmt::Display for GcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC: removed {} entries, freed {} bytes in {}ms",
            self.entries_removed, self.bytes_freed, self.duration_ms
        )
    }
}

/// Errors raised by cache providers.
#[derive(Debug, Error)]
pub enum ServiceCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache is shutting down")]
    ShuttingDown,

    #[error("Value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value storage for tile payloads.
///
/// Implementations must be `Send + Sync`; they are shared across request
/// tasks behind an `Arc`.
pub trait Cache: Send + Sync {
    /// Stores `value` under `key`, replacing any existing entry.
    fn set(&self, key: &str, value: Bytes) -> BoxFuture<'_, Result<(), ServiceCacheError>>;

    /// Returns the value for `key`, or `Ok(None)` if absent.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Bytes>, ServiceCacheError>>;

    /// Removes `key`; returns whether it existed.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>>;

    fn contains(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>>;

    /// Weighted size of all entries in bytes.
    fn size_bytes(&self) -> u64;

    fn entry_count(&self) -> u64;

    fn max_size_bytes(&self) -> u64;

    /// Runs pending eviction work.
    fn gc(&self) -> BoxFuture<'_, Result<GcResult, ServiceCacheError>>;
}
