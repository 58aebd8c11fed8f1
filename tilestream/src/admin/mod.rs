//! Tile admin: configuration, scheduling and statistics shared by sessions.

mod config;
mod queue;
mod stats;
mod tile_admin;

pub use config::{
    ConfigError, TileAdminConfig, CONFIG_SECTION, DEFAULT_MAX_ACTIVE_REQUESTS,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_TREE_EXPIRATION_SECS,
};
pub use queue::{Queued, RequestQueue};
pub use stats::{TileStatistics, TileStatisticsSnapshot};
pub use tile_admin::{RequestHandle, TileAdmin};
