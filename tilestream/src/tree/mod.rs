//! Tile trees and the owners that load them.
//!
//! A [`TreeOwner`] lazily loads one [`TileTree`] through a [`TreeFactory`].
//! Each tree has a root [`Tile`] whose children are created as content
//! arrives, and a [`TileLoader`] that fetches and decodes tile content.

mod factory;
mod loader;
mod owner;
mod tile;
mod tile_tree;

pub use factory::{TreeFactory, TreeParams};
pub use loader::{ContentFetch, LoaderParams, TileLoader};
pub use owner::{TreeLoadError, TreeLoadStatus, TreeOwner};
pub use tile::{Tile, TileContent, TileLoadStatus};
pub use tile_tree::TileTree;
