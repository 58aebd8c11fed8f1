//! One request for one tile's content.
//!
//! ```text
//! Queued ──► Active ──► Completed
//!              │ ▲  └──► Failed
//!              │ └── timeout, retry after policy delay
//!              └──► Canceled   (also from Queued)
//! ```
//!
//! Every attempt counts as a dispatch. A fetch already in flight is never
//! aborted; if the request is canceled meanwhile, the result is discarded.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::policy::{Priority, RetryPolicy};
use crate::admin::TileStatistics;
use crate::decode::TileReadStatus;
use crate::tree::{ContentFetch, Tile, TileContent, TileTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    Queued,
    Active,
    Completed,
    Failed,
    Canceled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

/// How a request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOutcome {
    pub content_id: String,
    pub state: RequestState,
    pub attempts: u32,
}

pub struct TileRequest {
    tree: Arc<TileTree>,
    tile: Arc<Tile>,
    state: RequestState,
    attempts: u32,
    priority: Priority,
    cancel: CancellationToken,
    created_at: Instant,
}

impl TileRequest {
    /// The request's token is a child of the tree's, so disposing the session
    /// cancels it.
    pub fn new(tree: Arc<TileTree>, tile: Arc<Tile>, priority: Priority) -> Self {
        let cancel = tree.cancel_token().child_token();
        Self {
            tree,
            tile,
            state: RequestState::Queued,
            attempts: 0,
            priority,
            cancel,
            created_at: Instant::now(),
        }
    }

    pub fn tree(&self) -> &Arc<TileTree> {
        &self.tree
    }

    pub fn tile(&self) -> &Arc<Tile> {
        &self.tile
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ends a request that never left the queue.
    pub fn abandon(mut self, stats: &TileStatistics) -> RequestOutcome {
        self.finish(RequestState::Canceled, stats)
    }

    /// Runs the request to a terminal state.
    #[instrument(skip_all, fields(tree = %self.tree.id(), content_id = %self.tile.content_id()))]
    pub async fn dispatch(
        mut self,
        policy: &RetryPolicy,
        stats: &TileStatistics,
    ) -> RequestOutcome {
        let loader = Arc::clone(self.tree.loader());
        let cancel = self.cancel.clone();
        debug!(
            priority = %self.priority,
            queued_ms = self.created_at.elapsed().as_millis() as u64,
            "Dispatching tile request"
        );
        self.tile.mark_loading();

        let bytes = loop {
            if cancel.is_cancelled() {
                return self.finish(RequestState::Canceled, stats);
            }
            self.state = RequestState::Active;
            self.attempts += 1;
            stats.record_dispatch();

            let error = match loader.request_tile_content(&self.tile, &cancel, stats).await {
                Ok(ContentFetch::Content(bytes)) => break bytes,
                Ok(ContentFetch::Canceled) => return self.finish(RequestState::Canceled, stats),
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(error = %error, "Tile request failed");
                return self.finish(RequestState::Failed, stats);
            }

            stats.record_timeout();
            let Some(delay) = policy.delay_for_attempt(self.attempts) else {
                warn!(attempts = self.attempts, "Tile request timed out, giving up");
                return self.finish(RequestState::Failed, stats);
            };

            debug!(
                attempt = self.attempts,
                delay_ms = delay.as_millis() as u64,
                "Tile request timed out, retrying"
            );
            let canceled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if canceled {
                return self.finish(RequestState::Canceled, stats);
            }
        };

        if cancel.is_cancelled() {
            return self.finish(RequestState::Canceled, stats);
        }

        let result = loader.load_tile_content(bytes, &cancel).await;
        match result.status {
            TileReadStatus::Success => {
                if result.graphic.is_none() {
                    if result.rejected_primitives > 0 {
                        stats.record_undisplayable();
                    } else {
                        stats.record_empty();
                    }
                }
                let content = TileContent::from(result);
                let outcome = self.finish(RequestState::Completed, stats);
                self.tile.set_content(content);
                outcome
            }
            TileReadStatus::Canceled => self.finish(RequestState::Canceled, stats),
            status => {
                warn!(?status, "Tile content could not be decoded");
                self.finish(RequestState::Failed, stats)
            }
        }
    }

    fn finish(&mut self, state: RequestState, stats: &TileStatistics) -> RequestOutcome {
        self.state = state;
        match state {
            RequestState::Completed => stats.record_completed(),
            RequestState::Failed => {
                stats.record_failed();
                self.tile.set_failed();
            }
            RequestState::Canceled => {
                stats.record_aborted();
                self.tile.set_canceled();
            }
            RequestState::Queued | RequestState::Active => {}
        }

        RequestOutcome {
            content_id: self.tile.content_id().to_string(),
            state,
            attempts: self.attempts,
        }
    }
}

impl std::fmt::Debug for TileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRequest")
            .field("tree", &self.tree.id())
            .field("content_id", &self.tile.content_id())
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("priority", &self.priority)
            .finish()
    }
}
