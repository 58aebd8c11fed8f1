//! Remote tile cache.
//!
//! Tile content is looked up in a cache keyed by resource name before the
//! backend is asked to generate it.
//!
//! - [`Cache`]: generic byte store, dyn-compatible
//! - [`MemoryCacheProvider`]: moka-backed in-memory store
//! - [`TileContentCache`]: resource naming and miss-tolerant reads

mod client;
mod memory;
mod traits;

pub use client::{TileContentCache, UNFINGERPRINTED_GUID};
pub use memory::MemoryCacheProvider;
pub use traits::{BoxFuture, Cache, GcResult, ServiceCacheError};
