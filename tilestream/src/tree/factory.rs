//! Creates tile trees from backend metadata.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loader::{LoaderParams, TileLoader};
use super::owner::TreeLoadError;
use super::tile_tree::TileTree;
use crate::admin::TileAdmin;
use crate::cache::TileContentCache;
use crate::decode::RenderSystem;
use crate::id::{ContentIdProvider, Id64, TileTreeId};
use crate::transport::{TileTransport, TileTreeProps, TransportError};

/// What a tree owner asks the factory to build.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeParams {
    pub model_id: Id64,
    pub tree_id: TileTreeId,
    /// Canonical id string sent to the backend.
    pub id_string: String,
    pub geometry_guid: Option<String>,
    /// Dimensionality from the model registry; the backend's answer is used
    /// when the model was never registered.
    pub is_3d: Option<bool>,
}

/// Shared per-session state needed to build trees.
#[derive(Clone)]
pub struct TreeFactory {
    pub(crate) admin: Arc<TileAdmin>,
    pub(crate) transport: Arc<dyn TileTransport>,
    pub(crate) cache: Option<TileContentCache>,
    pub(crate) render_system: Arc<dyn RenderSystem>,
    pub(crate) connection_key: String,
    pub(crate) cancel: CancellationToken,
}

impl TreeFactory {
    pub fn new(
        admin: Arc<TileAdmin>,
        transport: Arc<dyn TileTransport>,
        render_system: Arc<dyn RenderSystem>,
        connection_key: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            admin,
            transport,
            cache: None,
            render_system,
            connection_key: connection_key.into(),
            cancel,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetches the tree's metadata (retrying timeouts) and builds the tree.
    pub async fn create_tree(&self, params: &TreeParams) -> Result<Arc<TileTree>, TreeLoadError> {
        let props = self.fetch_props(&params.id_string).await?;
        if self.is_disposed() {
            return Err(TreeLoadError::Disposed);
        }

        let major = self.admin.max_major_version(props.format_version);
        let is_3d = params.is_3d.unwrap_or(props.is_3d);
        let flags = self.admin.content_flags(self.render_system.as_ref());
        let loader = TileLoader::new(LoaderParams {
            transport: Arc::clone(&self.transport),
            cache: self.cache.clone(),
            render_system: Arc::clone(&self.render_system),
            connection_key: self.connection_key.clone(),
            tree_id: props.id.clone(),
            model_id: params.model_id,
            is_3d,
            batch_type: params.tree_id.batch_type(),
            edges_required: params.tree_id.edges_required(),
            animation_id: params.tree_id.animation_id(),
            geometry_guid: params.geometry_guid.clone(),
            content_ids: ContentIdProvider::for_major(major, flags),
        });

        info!(
            tree = %props.id,
            model = %params.model_id,
            major_version = major,
            is_3d,
            "Tile tree loaded"
        );
        Ok(Arc::new(TileTree::new(&props, loader, self.cancel.child_token())))
    }

    async fn fetch_props(&self, id: &str) -> Result<TileTreeProps, TreeLoadError> {
        let policy = &self.admin.config().retry_policy;
        let mut attempt = 0;
        loop {
            if self.is_disposed() {
                return Err(TreeLoadError::Disposed);
            }
            attempt += 1;

            let error = match self.transport.get_tile_tree_props(id).await {
                Ok(props) => return Ok(props),
                Err(TransportError::NotFound(_)) => {
                    return Err(TreeLoadError::NotFound(id.to_string()))
                }
                Err(e) => e,
            };

            let delay = if error.is_retryable() {
                policy.delay_for_attempt(attempt)
            } else {
                None
            };
            let Some(delay) = delay else {
                warn!(tree = %id, attempts = attempt, error = %error, "Tile tree request failed");
                return Err(TreeLoadError::Failed {
                    id: id.to_string(),
                    reason: error.to_string(),
                });
            };

            debug!(
                tree = %id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying tile tree request"
            );
            let cancel = self.cancel.clone();
            let disposed = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if disposed {
                return Err(TreeLoadError::Disposed);
            }
        }
    }
}
