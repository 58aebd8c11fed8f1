//! Tilestream - tile tree streaming and decoding
//!
//! This library requests, caches and decodes the binary tiles of hierarchical
//! tile trees. A [`session::TileSession`] resolves tree ids to lazily loaded
//! [`tree::TileTree`]s; tile requests are scheduled by a shared
//! [`admin::TileAdmin`] that bounds concurrency, retries timeouts and keeps
//! statistics; fetched bytes are decoded into graphics by
//! [`decode::TileContentReader`].
//!
//! ```text
//! TileSession ──► TreeOwner ──► TileTree ──► Tile
//!      │                            │
//!      ▼                            ▼
//!  TileAdmin ──► TileRequest ──► TileLoader ──► cache / transport ──► decoder
//! ```

pub mod admin;
pub mod cache;
pub mod decode;
pub mod format;
pub mod geometry;
pub mod id;
pub mod logging;
pub mod request;
pub mod session;
pub mod transport;
pub mod tree;

pub use admin::{TileAdmin, TileAdminConfig, TileStatisticsSnapshot};
pub use id::{Id64, TileTreeId};
pub use session::{ModelInfo, TileSession, TreeWalkSummary};
pub use tree::{Tile, TileLoadStatus, TileTree, TreeLoadError};
