//! Process-wide tile request scheduler.
//!
//! The admin owns the pending queue, the active-request budget and the
//! statistics. It is created explicitly and shared by `Arc`; any number of
//! sessions can use the same admin.
//!
//! Requests must be submitted from within a Tokio runtime: each dispatched
//! request runs on its own spawned task.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::config::TileAdminConfig;
use super::queue::RequestQueue;
use super::stats::{TileStatistics, TileStatisticsSnapshot};
use crate::decode::RenderSystem;
use crate::id::{max_major_version, ContentFlags, TreeIdOptions};
use crate::request::{Priority, TileRequest};
use crate::tree::{Tile, TileLoadStatus, TileTree};

/// Caller's view of a submitted request.
#[derive(Clone, Debug)]
pub struct RequestHandle {
    tile: Arc<Tile>,
    cancel: CancellationToken,
}

impl RequestHandle {
    pub fn tile(&self) -> &Arc<Tile> {
        &self.tile
    }

    /// Marks the request as no longer wanted. A queued request is dropped
    /// without being dispatched; an active one finishes its current fetch and
    /// discards the result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the tile to settle.
    pub async fn wait(&self) -> TileLoadStatus {
        self.tile.wait_until_settled().await
    }
}

#[derive(Default)]
struct DispatchState {
    queue: RequestQueue<TileRequest>,
    active: usize,
    /// Requests held back by the cancellation backoff.
    delayed: usize,
}

impl DispatchState {
    fn is_idle(&self) -> bool {
        self.active == 0 && self.delayed == 0 && self.queue.is_empty()
    }
}

pub struct TileAdmin {
    config: TileAdminConfig,
    stats: TileStatistics,
    dispatch: Mutex<DispatchState>,
    idle: Notify,
}

impl TileAdmin {
    pub fn new(config: TileAdminConfig) -> Arc<Self> {
        let config = TileAdminConfig {
            max_active_requests: config.max_active_requests.max(1),
            ..config
        };
        Arc::new(Self {
            config,
            stats: TileStatistics::new(),
            dispatch: Mutex::new(DispatchState::default()),
            idle: Notify::new(),
        })
    }

    pub fn config(&self) -> &TileAdminConfig {
        &self.config
    }

    /// Major format version to request from a backend whose own format
    /// version is `backend_format_version`.
    pub fn max_major_version(&self, backend_format_version: Option<u32>) -> u16 {
        max_major_version(self.config.maximum_major_tile_format_version, backend_format_version)
    }

    /// Options for formatting tree ids before any backend has been asked.
    pub fn tree_id_options(&self) -> TreeIdOptions {
        TreeIdOptions {
            major_version: self.max_major_version(None),
            use_project_extents: self.config.use_project_extents,
        }
    }

    pub fn content_flags(&self, render_system: &dyn RenderSystem) -> ContentFlags {
        if self.config.enable_instancing && render_system.supports_instancing() {
            ContentFlags::ALLOW_INSTANCING
        } else {
            ContentFlags::NONE
        }
    }

    pub fn statistics(&self) -> TileStatisticsSnapshot {
        let state = self.dispatch.lock();
        self.stats
            .snapshot(state.active, state.queue.len() + state.delayed)
    }

    /// Zeroes the cumulative counters; the active and pending gauges are live
    /// and unaffected.
    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    pub(crate) fn stats(&self) -> &TileStatistics {
        &self.stats
    }

    pub fn num_active_requests(&self) -> usize {
        self.dispatch.lock().active
    }

    pub fn num_pending_requests(&self) -> usize {
        let state = self.dispatch.lock();
        state.queue.len() + state.delayed
    }

    /// Requests `tile` at the default priority (shallower tiles first).
    ///
    /// Returns `None` if the tile is already queued, loading, loaded or
    /// failed, or if its tree has been disposed.
    pub fn request_tile(
        self: &Arc<Self>,
        tree: &Arc<TileTree>,
        tile: &Arc<Tile>,
    ) -> Option<RequestHandle> {
        self.request_tile_with_priority(tree, tile, Priority::from_depth(tile.depth()))
    }

    pub fn request_tile_with_priority(
        self: &Arc<Self>,
        tree: &Arc<TileTree>,
        tile: &Arc<Tile>,
        priority: Priority,
    ) -> Option<RequestHandle> {
        if tree.is_disposed() {
            return None;
        }

        let request = TileRequest::new(Arc::clone(tree), Arc::clone(tile), priority);
        if !tile.try_begin_request(request.cancel_token()) {
            return None;
        }
        let handle = RequestHandle {
            tile: Arc::clone(tile),
            cancel: request.cancel_token().clone(),
        };

        match tile.cancellation_backoff_remaining(self.config.cancellation_backoff) {
            Some(remaining) => {
                trace!(
                    content_id = %tile.content_id(),
                    remaining_ms = remaining.as_millis() as u64,
                    "Delaying recently canceled tile"
                );
                self.dispatch.lock().delayed += 1;
                let admin = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(remaining).await;
                    admin.dispatch.lock().delayed -= 1;
                    admin.enqueue(request);
                });
            }
            None => self.enqueue(request),
        }

        Some(handle)
    }

    /// Waits until no request is queued, delayed or active.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.dispatch.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn enqueue(self: &Arc<Self>, request: TileRequest) {
        let priority = request.priority();
        self.dispatch.lock().queue.push(request, priority);
        self.pump();
    }

    /// Starts queued requests until the active budget is used up.
    fn pump(self: &Arc<Self>) {
        loop {
            let mut abandoned = Vec::new();
            let next = {
                let mut state = self.dispatch.lock();
                let mut next = None;
                while state.active < self.config.max_active_requests {
                    match state.queue.pop() {
                        Some(queued) if queued.item.is_canceled() => abandoned.push(queued.item),
                        Some(queued) => {
                            state.active += 1;
                            next = Some((queued.wait_time(), queued.item));
                            break;
                        }
                        None => break,
                    }
                }
                next
            };

            for request in abandoned {
                let outcome = request.abandon(&self.stats);
                debug!(
                    content_id = %outcome.content_id,
                    "Dropped canceled tile request before dispatch"
                );
            }

            let Some((waited, request)) = next else {
                self.notify_if_idle();
                return;
            };
            trace!(
                content_id = %request.tile().content_id(),
                waited_ms = waited.as_millis() as u64,
                "Dispatching tile request"
            );

            let admin = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = request.dispatch(&admin.config.retry_policy, &admin.stats).await;
                trace!(
                    content_id = %outcome.content_id,
                    state = ?outcome.state,
                    attempts = outcome.attempts,
                    "Tile request finished"
                );
                admin.dispatch.lock().active -= 1;
                admin.pump();
            });
        }
    }

    fn notify_if_idle(&self) {
        if self.dispatch.lock().is_idle() {
            self.idle.notify_waiters();
        }
    }
}

impl std::fmt::Debug for TileAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileAdmin")
            .field("config", &self.config)
            .field("statistics", &self.statistics())
            .finish()
    }
}
