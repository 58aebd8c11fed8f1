//! Tile identity: element ids, tree ids, content ids and format-version
//! negotiation.
//!
//! A tile tree is addressed by a canonical *tree id* string derived from the
//! model id, the tree's options and the negotiated major format version. Each
//! tile inside a tree is addressed by a *content id* whose syntax also depends
//! on the major version:
//!
//! | Major | Tree id example        | Root content id     |
//! |-------|------------------------|---------------------|
//! | 1     | `E:0_0x1c`             | `0/0/0/0/1`         |
//! | 3     | `0x1c`                 | `_3_0_0_0_0_0_1`    |
//! | 4     | `4_0-0x1c`             | `-1-0-0-0-0-1`      |

mod content_id;
mod id64;
mod tree_id;
mod version;

use thiserror::Error;

pub use content_id::{
    ContentFlags, ContentIdProvider, ContentIdScheme, ContentSpec, TileContentIdentifier,
};
pub use id64::Id64;
pub use tree_id::{parse_tree_id, BatchType, ParsedTreeId, TileTreeId, TreeFlags, TreeIdOptions};
pub use version::max_major_version;

/// Errors raised when parsing ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid 64-bit id: {0:?}")]
    InvalidId64(String),

    #[error("invalid tree id {id:?}: {reason}")]
    InvalidTreeId { id: String, reason: String },

    #[error("invalid content id {0:?}")]
    InvalidContentId(String),

    #[error("content id {0:?} is too deep to subdivide")]
    TooDeep(String),
}
