//! Remote tile cache client.
//!
//! Translates a [`TileContentIdentifier`] into a resource name and reads
//! payloads from the underlying [`Cache`]. Provider faults are logged and
//! treated as misses so a flaky cache never fails a tile request.
//!
//! # Resource names
//!
//! `<connection key>/<tree id>/<content id>/<guid>`, where the guid segment is
//! `first` for models that have not been fingerprinted yet. Example:
//! `imodel-7/cs-12/4_0-0x1c/-1-0-0-0-0-1/first`.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{trace, warn};

use super::traits::Cache;
use crate::id::TileContentIdentifier;

/// Guid segment used before a model has a geometry fingerprint.
pub const UNFINGERPRINTED_GUID: &str = "first";

/// Tile-aware view over a generic [`Cache`].
#[derive(Clone)]
pub struct TileContentCache {
    cache: Arc<dyn Cache>,
}

impl TileContentCache {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Resource name under which `id`'s content is stored.
    pub fn form_resource_name(id: &TileContentIdentifier) -> String {
        format!(
            "{}/{}/{}/{}",
            id.connection_key,
            id.tree_id,
            id.content_id,
            id.guid.as_deref().unwrap_or(UNFINGERPRINTED_GUID)
        )
    }

    /// Returns cached content for `id`, or `None` on a miss.
    pub async fn retrieve(&self, id: &TileContentIdentifier) -> Option<Bytes> {
        let name = Self::form_resource_name(id);
        match self.cache.get(&name).await {
            Ok(Some(bytes)) => {
                trace!(resource = %name, size = bytes.len(), "Tile cache hit");
                Some(bytes)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, resource = %name, "Tile cache read failed");
                None
            }
        }
    }

    /// Stores content for `id`. Failures are logged and otherwise ignored.
    pub async fn store(&self, id: &TileContentIdentifier, bytes: Bytes) {
        let name = Self::form_resource_name(id);
        if let Err(e) = self.cache.set(&name, bytes).await {
            warn!(error = %e, resource = %name, "Tile cache write failed");
        }
    }

    pub fn inner(&self) -> &Arc<dyn Cache> {
        &self.cache
    }
}

impl std::fmt::Debug for TileContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileContentCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
