//! A node of a tile tree.
//!
//! Status transitions go through a `watch` channel so any number of callers can
//! wait for a tile to settle:
//!
//! ```text
//! NotLoaded ──► Queued ──► Loading ──► Ready
//!     ▲            │           │  └──► Failed
//!     └────────────┴───────────┘ (canceled)
//! ```
//!
//! `Failed` is terminal; a canceled request returns the tile to `NotLoaded` so
//! it can be requested again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::decode::{RenderGraphic, TileReadResult};
use crate::geometry::Range3d;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileLoadStatus {
    NotLoaded,
    Queued,
    Loading,
    Ready,
    Failed,
}

impl TileLoadStatus {
    /// Queued or loading.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::Loading)
    }
}

/// Decoded content of a ready tile.
#[derive(Debug)]
pub struct TileContent {
    pub graphic: Option<RenderGraphic>,
    pub content_range: Option<Range3d>,
    pub is_leaf: bool,
    pub size_multiplier: Option<f64>,
    pub empty_sub_ranges: u32,
}

impl TileContent {
    pub fn is_empty(&self) -> bool {
        self.graphic.is_none()
    }
}

impl From<TileReadResult> for TileContent {
    fn from(result: TileReadResult) -> Self {
        Self {
            graphic: result.graphic,
            content_range: result.content_range,
            is_leaf: result.is_leaf,
            size_multiplier: result.size_multiplier,
            empty_sub_ranges: result.empty_sub_ranges,
        }
    }
}

pub struct Tile {
    content_id: String,
    depth: u32,
    range: Range3d,
    leaf_hint: Option<bool>,
    status: watch::Sender<TileLoadStatus>,
    content: Mutex<Option<Arc<TileContent>>>,
    children: Mutex<Option<Vec<Arc<Tile>>>>,
    pending_request: Mutex<Option<CancellationToken>>,
    last_canceled: Mutex<Option<Instant>>,
}

impl Tile {
    /// `leaf_hint` is what the tree's metadata says before content is loaded.
    pub fn new(
        content_id: impl Into<String>,
        depth: u32,
        range: Range3d,
        leaf_hint: Option<bool>,
    ) -> Self {
        let (status, _) = watch::channel(TileLoadStatus::NotLoaded);
        Self {
            content_id: content_id.into(),
            depth,
            range,
            leaf_hint,
            status,
            content: Mutex::new(None),
            children: Mutex::new(None),
            pending_request: Mutex::new(None),
            last_canceled: Mutex::new(None),
        }
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn range(&self) -> &Range3d {
        &self.range
    }

    pub fn load_status(&self) -> TileLoadStatus {
        *self.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.load_status() == TileLoadStatus::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<TileLoadStatus> {
        self.status.subscribe()
    }

    pub fn content(&self) -> Option<Arc<TileContent>> {
        self.content.lock().clone()
    }

    /// Leaf-ness from loaded content, else from tree metadata.
    pub fn is_leaf(&self) -> Option<bool> {
        match self.content() {
            Some(content) => Some(content.is_leaf),
            None => self.leaf_hint,
        }
    }

    /// Children created so far, if any.
    pub fn children(&self) -> Option<Vec<Arc<Tile>>> {
        self.children.lock().clone()
    }

    pub(crate) fn children_or_insert_with(
        &self,
        create: impl FnOnce() -> Vec<Arc<Tile>>,
    ) -> Vec<Arc<Tile>> {
        self.children.lock().get_or_insert_with(create).clone()
    }

    /// Waits until the tile is neither queued nor loading.
    pub async fn wait_until_settled(&self) -> TileLoadStatus {
        let mut rx = self.status.subscribe();
        let settled = match rx.wait_for(|status| !status.is_pending()).await {
            Ok(status) => *status,
            Err(_) => self.load_status(),
        };
        settled
    }

    /// Cancels the in-flight request for this tile, if there is one.
    pub fn cancel_request(&self) -> bool {
        match self.pending_request.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Time left before a recently canceled tile may be requested again.
    pub fn cancellation_backoff_remaining(&self, backoff: Duration) -> Option<Duration> {
        let canceled_at = (*self.last_canceled.lock())?;
        backoff.checked_sub(canceled_at.elapsed()).filter(|d| !d.is_zero())
    }

    /// Claims the tile for a new request: `NotLoaded` becomes `Queued`.
    pub(crate) fn try_begin_request(&self, token: &CancellationToken) -> bool {
        let claimed = self.status.send_if_modified(|status| {
            if *status == TileLoadStatus::NotLoaded {
                *status = TileLoadStatus::Queued;
                true
            } else {
                false
            }
        });
        if claimed {
            *self.pending_request.lock() = Some(token.clone());
        }
        claimed
    }

    pub(crate) fn mark_loading(&self) {
        self.status.send_replace(TileLoadStatus::Loading);
    }

    pub(crate) fn set_content(&self, content: TileContent) {
        *self.content.lock() = Some(Arc::new(content));
        self.finish_request(TileLoadStatus::Ready);
    }

    pub(crate) fn set_failed(&self) {
        self.finish_request(TileLoadStatus::Failed);
    }

    pub(crate) fn set_canceled(&self) {
        *self.last_canceled.lock() = Some(Instant::now());
        self.finish_request(TileLoadStatus::NotLoaded);
    }

    fn finish_request(&self, status: TileLoadStatus) {
        self.pending_request.lock().take();
        self.status.send_replace(status);
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("content_id", &self.content_id)
            .field("depth", &self.depth)
            .field("status", &self.load_status())
            .finish()
    }
}
