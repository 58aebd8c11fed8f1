//! Tile requests: retry policy, priority and the per-request state machine.

mod policy;
mod tile_request;

pub use policy::{
    Priority, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_MAX_DELAY_SECS,
};
pub use tile_request::{RequestOutcome, RequestState, TileRequest};
