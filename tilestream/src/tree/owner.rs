//! Lazy, coalescing holder of one tile tree.
//!
//! The first [`TreeOwner::load`] starts a load task; callers arriving while it
//! runs await the same shared future, so the backend sees one props request no
//! matter how many callers ask. The task is spawned, so it completes even if
//! every caller gives up waiting.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;

use super::factory::{TreeFactory, TreeParams};
use super::tile_tree::TileTree;
use crate::cache::BoxFuture;
use crate::id::{Id64, TileTreeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeLoadError {
    #[error("Tile tree not found: {0}")]
    NotFound(String),

    #[error("Failed to load tile tree {id}: {reason}")]
    Failed { id: String, reason: String },

    #[error("Tile session has been disposed")]
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreeLoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    NotFound,
    Failed,
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<TileTree>, TreeLoadError>>>;

enum OwnerState {
    NotLoaded,
    Loading(LoadFuture),
    Loaded(Arc<TileTree>),
    Failed(TreeLoadError),
}

pub struct TreeOwner {
    params: TreeParams,
    factory: Arc<TreeFactory>,
    state: Mutex<OwnerState>,
    last_access: Mutex<Instant>,
}

impl TreeOwner {
    pub fn new(params: TreeParams, factory: Arc<TreeFactory>) -> Self {
        Self {
            params,
            factory,
            state: Mutex::new(OwnerState::NotLoaded),
            last_access: Mutex::new(Instant::now()),
        }
    }

    /// Canonical tree id string.
    pub fn id(&self) -> &str {
        &self.params.id_string
    }

    pub fn model_id(&self) -> Id64 {
        self.params.model_id
    }

    pub fn tree_id(&self) -> &TileTreeId {
        &self.params.tree_id
    }

    pub fn geometry_guid(&self) -> Option<&str> {
        self.params.geometry_guid.as_deref()
    }

    pub fn load_status(&self) -> TreeLoadStatus {
        match &*self.state.lock() {
            OwnerState::NotLoaded => TreeLoadStatus::NotLoaded,
            OwnerState::Loading(_) => TreeLoadStatus::Loading,
            OwnerState::Loaded(_) => TreeLoadStatus::Loaded,
            OwnerState::Failed(TreeLoadError::NotFound(_)) => TreeLoadStatus::NotFound,
            OwnerState::Failed(_) => TreeLoadStatus::Failed,
        }
    }

    /// The tree, if loaded.
    pub fn tree(&self) -> Option<Arc<TileTree>> {
        self.touch();
        match &*self.state.lock() {
            OwnerState::Loaded(tree) => Some(Arc::clone(tree)),
            _ => None,
        }
    }

    pub fn idle_time(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// Loads the tree, joining a load already in progress. Failures are
    /// remembered; the owner does not retry on its own.
    ///
    /// # Panics
    ///
    /// Starting a load spawns a task, so this panics when called outside a
    /// Tokio runtime.
    pub async fn load(self: &Arc<Self>) -> Result<Arc<TileTree>, TreeLoadError> {
        self.touch();
        let pending = {
            let mut state = self.state.lock();
            match &*state {
                OwnerState::Loaded(tree) => return Ok(Arc::clone(tree)),
                OwnerState::Failed(error) => return Err(error.clone()),
                OwnerState::Loading(pending) => pending.clone(),
                OwnerState::NotLoaded => {
                    let pending = self.begin_load();
                    *state = OwnerState::Loading(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Starts loading without waiting for the result.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime, like [`load`](Self::load).
    pub fn start_load(self: &Arc<Self>) {
        self.touch();
        let mut state = self.state.lock();
        if matches!(*state, OwnerState::NotLoaded) {
            *state = OwnerState::Loading(self.begin_load());
        }
    }

    fn begin_load(self: &Arc<Self>) -> LoadFuture {
        let owner: Weak<Self> = Arc::downgrade(self);
        let factory = Arc::clone(&self.factory);
        let params = self.params.clone();

        let load: BoxFuture<'static, Result<Arc<TileTree>, TreeLoadError>> = Box::pin(async move {
            let result = factory.create_tree(&params).await;
            if let Some(owner) = owner.upgrade() {
                owner.complete(&result);
            }
            result
        });

        let shared = load.shared();
        tokio::spawn(shared.clone());
        shared
    }

    fn complete(&self, result: &Result<Arc<TileTree>, TreeLoadError>) {
        let mut state = self.state.lock();
        *state = match result {
            Ok(tree) => OwnerState::Loaded(Arc::clone(tree)),
            Err(error) => OwnerState::Failed(error.clone()),
        };
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }
}

impl std::fmt::Debug for TreeOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeOwner")
            .field("id", &self.params.id_string)
            .field("model_id", &self.params.model_id)
            .field("status", &self.load_status())
            .finish()
    }
}
