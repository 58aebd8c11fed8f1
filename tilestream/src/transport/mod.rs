//! Content-fetch boundary.
//!
//! A [`TileTransport`] is whatever answers tile tree metadata and tile content
//! requests: an RPC client, a test double, or the [`DirectoryTransport`] which
//! serves pre-generated tiles from disk. Implementations are injected into a
//! session, which is also how tests inject timeouts and failures.

mod fs;
mod props;

use bytes::Bytes;
use thiserror::Error;

pub use fs::{DirectoryTransport, TREE_PROPS_FILE, TILE_FILE_EXTENSION};
pub use props::{TileProps, TileTreeProps};

use crate::cache::BoxFuture;
use crate::id::TileContentIdentifier;

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The backend did not answer in time; the request may be retried.
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Source of tile tree metadata and tile content.
pub trait TileTransport: Send + Sync {
    /// Fetches the metadata of the tree named by a canonical tree id.
    fn get_tile_tree_props<'a>(
        &'a self,
        tree_id: &'a str,
    ) -> BoxFuture<'a, Result<TileTreeProps, TransportError>>;

    /// Fetches (generating if necessary) the content of one tile.
    fn request_tile_content<'a>(
        &'a self,
        id: &'a TileContentIdentifier,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>>;
}
