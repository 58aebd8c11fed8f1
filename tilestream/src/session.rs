//! Per-connection tile context.
//!
//! A session ties one connection (model repository and version) to a
//! transport, an optional remote cache and a shared [`TileAdmin`]. It keeps the
//! model registry and the memoized tree owners. Owners are keyed on the
//! canonical tree id, the model, and the model's geometry fingerprint, so a
//! fingerprint change yields fresh owners while toggling an option back
//! returns the owner already created for it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::admin::{RequestHandle, TileAdmin};
use crate::cache::TileContentCache;
use crate::decode::RenderSystem;
use crate::id::{Id64, TileTreeId};
use crate::transport::TileTransport;
use crate::tree::{
    Tile, TileLoadStatus, TileTree, TreeFactory, TreeLoadError, TreeOwner, TreeParams,
};

/// What the session knows about a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: Id64,
    /// `None` defers to the backend's tree metadata.
    pub is_3d: Option<bool>,
    pub geometry_guid: Option<String>,
}

impl ModelInfo {
    pub fn new(id: Id64) -> Self {
        Self {
            id,
            is_3d: None,
            geometry_guid: None,
        }
    }

    pub fn with_3d(mut self, is_3d: bool) -> Self {
        self.is_3d = Some(is_3d);
        self
    }

    pub fn with_geometry_guid(mut self, guid: impl Into<String>) -> Self {
        self.geometry_guid = Some(guid.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct OwnerKey {
    id_string: String,
    model_id: Id64,
    guid: Option<String>,
}

/// Result of [`TileSession::load_tree_to_depth`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeWalkSummary {
    pub tiles_requested: usize,
    pub tiles_ready: usize,
    pub tiles_failed: usize,
    pub tiles_canceled: usize,
    pub empty_tiles: usize,
    pub leaf_tiles: usize,
    pub max_depth_reached: u32,
}

pub struct TileSession {
    connection_key: String,
    admin: Arc<TileAdmin>,
    factory: Arc<TreeFactory>,
    models: DashMap<Id64, ModelInfo>,
    owners: DashMap<OwnerKey, Arc<TreeOwner>>,
    cancel: CancellationToken,
}

impl TileSession {
    pub fn new(
        connection_key: impl Into<String>,
        admin: Arc<TileAdmin>,
        transport: Arc<dyn TileTransport>,
        render_system: Arc<dyn RenderSystem>,
    ) -> Self {
        let connection_key = connection_key.into();
        let cancel = CancellationToken::new();
        let factory = TreeFactory::new(
            Arc::clone(&admin),
            transport,
            render_system,
            connection_key.clone(),
            cancel.clone(),
        );
        Self {
            connection_key,
            admin,
            factory: Arc::new(factory),
            models: DashMap::new(),
            owners: DashMap::new(),
            cancel,
        }
    }

    /// Serves tile content from `cache` before asking the transport.
    pub fn with_cache(mut self, cache: TileContentCache) -> Self {
        Arc::make_mut(&mut self.factory).cache = Some(cache);
        self
    }

    pub fn connection_key(&self) -> &str {
        &self.connection_key
    }

    pub fn admin(&self) -> &Arc<TileAdmin> {
        &self.admin
    }

    pub fn register_model(&self, info: ModelInfo) {
        let id = info.id;
        let guid = info.geometry_guid.clone();
        let previous = self.models.insert(id, info);
        if previous.is_some_and(|p| p.geometry_guid != guid) {
            self.drop_stale_owners(id, &guid);
        }
    }

    pub fn model(&self, model_id: Id64) -> Option<ModelInfo> {
        self.models.get(&model_id).map(|m| m.value().clone())
    }

    pub fn geometry_guid(&self, model_id: Id64) -> Option<String> {
        self.models
            .get(&model_id)
            .and_then(|m| m.geometry_guid.clone())
    }

    /// Records a new geometry fingerprint. Owners created under any other
    /// fingerprint of the model are dropped.
    pub fn set_geometry_guid(&self, model_id: Id64, guid: Option<String>) {
        let changed = {
            let mut model = self
                .models
                .entry(model_id)
                .or_insert_with(|| ModelInfo::new(model_id));
            let changed = model.geometry_guid != guid;
            model.geometry_guid = guid.clone();
            changed
        };
        if changed {
            info!(model = %model_id, guid = ?guid, "Geometry fingerprint changed");
            self.drop_stale_owners(model_id, &guid);
        }
    }

    fn drop_stale_owners(&self, model_id: Id64, guid: &Option<String>) {
        self.owners
            .retain(|key, _| key.model_id != model_id || &key.guid == guid);
    }

    /// The owner of `tree_id` for `model_id`, created on first use.
    ///
    /// After [`dispose`](Self::dispose) this returns a detached owner whose
    /// loads fail with [`TreeLoadError::Disposed`].
    pub fn tree_owner(&self, model_id: Id64, tree_id: &TileTreeId) -> Arc<TreeOwner> {
        let id_string = tree_id.to_id_string(model_id, &self.admin.tree_id_options());
        let model = self.model(model_id);
        let guid = model.as_ref().and_then(|m| m.geometry_guid.clone());

        let params = TreeParams {
            model_id,
            tree_id: tree_id.clone(),
            id_string: id_string.clone(),
            geometry_guid: guid.clone(),
            is_3d: model.and_then(|m| m.is_3d),
        };
        if self.is_disposed() {
            return Arc::new(TreeOwner::new(params, Arc::clone(&self.factory)));
        }

        let key = OwnerKey {
            id_string,
            model_id,
            guid,
        };
        let owner = self
            .owners
            .entry(key)
            .or_insert_with(|| {
                debug!(tree = %params.id_string, "Creating tree owner");
                Arc::new(TreeOwner::new(params, Arc::clone(&self.factory)))
            });
        Arc::clone(owner.value())
    }

    pub async fn load_tree(
        &self,
        model_id: Id64,
        tree_id: &TileTreeId,
    ) -> Result<Arc<TileTree>, TreeLoadError> {
        self.tree_owner(model_id, tree_id).load().await
    }

    pub fn request_tile(&self, tree: &Arc<TileTree>, tile: &Arc<Tile>) -> Option<RequestHandle> {
        self.admin.request_tile(tree, tile)
    }

    /// Requests `tile` if needed and waits for it to settle.
    pub async fn load_tile(&self, tree: &Arc<TileTree>, tile: &Arc<Tile>) -> TileLoadStatus {
        self.admin.request_tile(tree, tile);
        tile.wait_until_settled().await
    }

    /// Loads `tree` breadth-first down to `max_depth`. Failed or canceled
    /// tiles are counted and skipped; their siblings keep loading.
    pub async fn load_tree_to_depth(
        &self,
        tree: &Arc<TileTree>,
        max_depth: u32,
    ) -> TreeWalkSummary {
        let mut summary = TreeWalkSummary::default();
        let mut level = vec![Arc::clone(tree.root())];

        while !level.is_empty() {
            for tile in &level {
                if self.admin.request_tile(tree, tile).is_some() {
                    summary.tiles_requested += 1;
                }
            }
            let statuses = join_all(level.iter().map(|tile| tile.wait_until_settled())).await;

            let mut next = Vec::new();
            for (tile, status) in level.iter().zip(statuses) {
                summary.max_depth_reached = summary.max_depth_reached.max(tile.depth());
                match status {
                    TileLoadStatus::Ready => {
                        summary.tiles_ready += 1;
                        if let Some(content) = tile.content() {
                            if content.is_empty() {
                                summary.empty_tiles += 1;
                            }
                            if content.is_leaf {
                                summary.leaf_tiles += 1;
                            }
                        }
                        if tile.depth() < max_depth {
                            next.extend(tree.children(tile));
                        }
                    }
                    TileLoadStatus::Failed => summary.tiles_failed += 1,
                    TileLoadStatus::NotLoaded => summary.tiles_canceled += 1,
                    TileLoadStatus::Queued | TileLoadStatus::Loading => {}
                }
            }
            level = next;
        }

        summary
    }

    /// Number of owners currently memoized.
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Drops owners nobody outside the session holds that have been idle
    /// longer than `max_idle`. Returns how many were dropped.
    pub fn purge(&self, max_idle: Duration) -> usize {
        let before = self.owners.len();
        self.owners
            .retain(|_, owner| Arc::strong_count(owner) > 1 || owner.idle_time() < max_idle);
        let purged = before.saturating_sub(self.owners.len());
        if purged > 0 {
            debug!(purged, "Purged idle tree owners");
        }
        purged
    }

    /// [`purge`](Self::purge) with the admin's configured tree expiration.
    pub fn purge_expired(&self) -> usize {
        self.purge(self.admin.config().tree_expiration)
    }

    /// Forgets every owner; the session stays usable and later lookups create
    /// fresh owners. Trees already handed out keep working.
    pub fn reset(&self) {
        self.owners.clear();
    }

    /// Ends the session: in-flight and queued requests see themselves as
    /// canceled and no further trees load.
    pub fn dispose(&self) {
        info!(connection = %self.connection_key, "Disposing tile session");
        self.cancel.cancel();
        self.owners.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for TileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSession")
            .field("connection_key", &self.connection_key)
            .field("models", &self.models.len())
            .field("owners", &self.owners.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
