//! Fetches and decodes tile content for one tree.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::tile::Tile;
use crate::admin::TileStatistics;
use crate::cache::TileContentCache;
use crate::decode::{RenderSystem, TileContentReader, TileReadResult};
use crate::id::{BatchType, ContentIdProvider, Id64, TileContentIdentifier};
use crate::transport::{TileTransport, TransportError};

/// Result of one content fetch.
#[derive(Debug)]
pub enum ContentFetch {
    Content(Bytes),
    /// The request was canceled before the backend was asked.
    Canceled,
}

/// Everything a loader needs, gathered when its tree is created.
#[derive(Clone)]
pub struct LoaderParams {
    pub transport: Arc<dyn TileTransport>,
    pub cache: Option<TileContentCache>,
    pub render_system: Arc<dyn RenderSystem>,
    pub connection_key: String,
    pub tree_id: String,
    pub model_id: Id64,
    pub is_3d: bool,
    pub batch_type: BatchType,
    pub edges_required: bool,
    pub animation_id: Option<Id64>,
    pub geometry_guid: Option<String>,
    pub content_ids: ContentIdProvider,
}

pub struct TileLoader {
    params: LoaderParams,
}

impl TileLoader {
    pub fn new(params: LoaderParams) -> Self {
        Self { params }
    }

    pub fn tree_id(&self) -> &str {
        &self.params.tree_id
    }

    pub fn model_id(&self) -> Id64 {
        self.params.model_id
    }

    pub fn is_3d(&self) -> bool {
        self.params.is_3d
    }

    pub fn batch_type(&self) -> BatchType {
        self.params.batch_type
    }

    pub fn edges_required(&self) -> bool {
        self.params.edges_required
    }

    pub fn animation_id(&self) -> Option<Id64> {
        self.params.animation_id
    }

    pub fn geometry_guid(&self) -> Option<&str> {
        self.params.geometry_guid.as_deref()
    }

    pub fn content_ids(&self) -> &ContentIdProvider {
        &self.params.content_ids
    }

    pub fn root_content_id(&self) -> String {
        self.params.content_ids.root_content_id()
    }

    pub fn content_identifier(&self, tile: &Tile) -> TileContentIdentifier {
        TileContentIdentifier {
            connection_key: self.params.connection_key.clone(),
            tree_id: self.params.tree_id.clone(),
            content_id: tile.content_id().to_string(),
            guid: self.params.geometry_guid.clone(),
        }
    }

    /// Returns the tile's bytes from the cache, or from the transport on a miss.
    ///
    /// A miss is only counted (and the transport only asked) if the request is
    /// still wanted when the cache lookup finishes. Content fetched from the
    /// transport is written back to the cache.
    pub async fn request_tile_content(
        &self,
        tile: &Tile,
        cancel: &CancellationToken,
        stats: &TileStatistics,
    ) -> Result<ContentFetch, TransportError> {
        let id = self.content_identifier(tile);

        if let Some(cache) = &self.params.cache {
            if let Some(bytes) = cache.retrieve(&id).await {
                debug!(tile = %id, bytes = bytes.len(), "Tile cache hit");
                stats.record_cache_hit();
                return Ok(ContentFetch::Content(bytes));
            }
        }

        if cancel.is_cancelled() {
            return Ok(ContentFetch::Canceled);
        }
        stats.record_cache_miss();

        let bytes = self.params.transport.request_tile_content(&id).await?;
        if let Some(cache) = &self.params.cache {
            cache.store(&id, bytes.clone()).await;
        }
        Ok(ContentFetch::Content(bytes))
    }

    /// Decodes `bytes`. Content the reader refuses resolves as
    /// `NewerMajorVersion` or `InvalidHeader`.
    pub async fn load_tile_content(
        &self,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> TileReadResult {
        let reader = TileContentReader::create(
            bytes.clone(),
            self.params.model_id,
            self.params.is_3d,
            Arc::clone(&self.params.render_system),
        );

        match reader {
            Some(reader) => {
                reader
                    .with_batch_type(self.params.batch_type)
                    .with_edges(self.params.edges_required)
                    .with_cancellation(cancel.clone())
                    .read()
                    .await
            }
            None => {
                let result = TileReadResult::rejected(&bytes);
                warn!(
                    tree = %self.params.tree_id,
                    status = ?result.status,
                    "Tile content cannot be read"
                );
                result
            }
        }
    }
}

impl std::fmt::Debug for TileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLoader")
            .field("tree_id", &self.params.tree_id)
            .field("model_id", &self.params.model_id)
            .field("is_3d", &self.params.is_3d)
            .field("batch_type", &self.params.batch_type)
            .finish()
    }
}
