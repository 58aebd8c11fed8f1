//! A loaded tile tree: its root tile, loader, and cancellation scope.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::loader::TileLoader;
use super::tile::Tile;
use crate::geometry::Range3d;
use crate::id::Id64;
use crate::transport::TileTreeProps;

pub struct TileTree {
    id: String,
    root: Arc<Tile>,
    loader: Arc<TileLoader>,
    max_tiles_to_skip: u32,
    cancel: CancellationToken,
}

impl TileTree {
    /// Builds the tree described by `props`. The root's content id is always
    /// derived from the loader's negotiated id scheme.
    pub fn new(props: &TileTreeProps, loader: TileLoader, cancel: CancellationToken) -> Self {
        let root = Tile::new(
            loader.root_content_id(),
            0,
            props.root_tile.range,
            Some(props.root_tile.is_leaf),
        );
        Self {
            id: props.id.clone(),
            root: Arc::new(root),
            loader: Arc::new(loader),
            max_tiles_to_skip: props.max_tiles_to_skip,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model_id(&self) -> Id64 {
        self.loader.model_id()
    }

    pub fn is_3d(&self) -> bool {
        self.loader.is_3d()
    }

    pub fn root(&self) -> &Arc<Tile> {
        &self.root
    }

    pub fn range(&self) -> &Range3d {
        self.root.range()
    }

    pub fn loader(&self) -> &Arc<TileLoader> {
        &self.loader
    }

    pub fn max_tiles_to_skip(&self) -> u32 {
        self.max_tiles_to_skip
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the owning session has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Children of a ready, non-leaf tile, created on first call.
    ///
    /// A tile with a size multiplier refines into one child covering the same
    /// range at higher resolution. Otherwise it subdivides into octants (3D) or
    /// quadrants (2D), skipping sub-ranges its content marked empty.
    pub fn children(&self, tile: &Tile) -> Vec<Arc<Tile>> {
        let Some(content) = tile.content() else {
            return Vec::new();
        };
        if content.is_leaf {
            return Vec::new();
        }

        tile.children_or_insert_with(|| {
            let ids = self.loader.content_ids();
            let depth = tile.depth() + 1;

            if let Some(multiplier) = content.size_multiplier {
                let child = ids.spec_from_id(tile.content_id()).and_then(|spec| {
                    let scaled = (spec.multiplier as f64 * multiplier).round() as u32;
                    ids.id_from_parent_and_multiplier(tile.content_id(), scaled)
                });
                return match child {
                    Ok(id) => vec![Arc::new(Tile::new(id, depth, *tile.range(), None))],
                    Err(e) => {
                        warn!(tree = %self.id, error = %e, "Cannot refine tile");
                        Vec::new()
                    }
                };
            }

            match ids.child_ids(tile.content_id(), self.is_3d()) {
                Ok(children) => children
                    .into_iter()
                    .filter(|(octant, _)| content.empty_sub_ranges & (1 << octant) == 0)
                    .map(|(octant, id)| {
                        let range = tile.range().subdivide(octant, self.is_3d());
                        Arc::new(Tile::new(id, depth, range, None))
                    })
                    .collect(),
                Err(e) => {
                    warn!(tree = %self.id, error = %e, "Cannot subdivide tile");
                    Vec::new()
                }
            }
        })
    }
}

impl std::fmt::Debug for TileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileTree")
            .field("id", &self.id)
            .field("model_id", &self.model_id())
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DefaultRenderSystem;
    use crate::id::{BatchType, ContentFlags, ContentIdProvider};
    use crate::transport::{DirectoryTransport, TileProps};
    use crate::tree::loader::LoaderParams;
    use crate::tree::tile::TileContent;
    use glam::DVec3;

    fn tree(major: u16, is_3d: bool) -> TileTree {
        let props = TileTreeProps {
            id: "0x1c".to_string(),
            format_version: None,
            root_tile: TileProps {
                content_id: String::new(),
                range: Range3d::new(DVec3::ZERO, DVec3::splat(8.0)),
                content_range: None,
                is_leaf: false,
            },
            max_tiles_to_skip: 1,
            is_3d,
        };
        let loader = TileLoader::new(LoaderParams {
            transport: Arc::new(DirectoryTransport::new("/nonexistent")),
            cache: None,
            render_system: Arc::new(DefaultRenderSystem::new()),
            connection_key: "test".to_string(),
            tree_id: props.id.clone(),
            model_id: Id64(0x1c),
            is_3d,
            batch_type: BatchType::Primary,
            edges_required: false,
            animation_id: None,
            geometry_guid: None,
            content_ids: ContentIdProvider::for_major(major, ContentFlags::NONE),
        });
        TileTree::new(&props, loader, CancellationToken::new())
    }

    fn content(is_leaf: bool, size_multiplier: Option<f64>, empty_sub_ranges: u32) -> TileContent {
        TileContent {
            graphic: None,
            content_range: None,
            is_leaf,
            size_multiplier,
            empty_sub_ranges,
        }
    }

    #[test]
    fn test_root_uses_negotiated_scheme() {
        assert_eq!(tree(1, true).root().content_id(), "0/0/0/0/1");
        assert_eq!(tree(4, true).root().content_id(), "-0-0-0-0-0-1");
        assert_eq!(tree(1, true).max_tiles_to_skip(), 1);
    }

    #[test]
    fn test_unloaded_tile_has_no_children() {
        let tree = tree(1, true);
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn test_octree_children_skip_empty_sub_ranges() {
        let tree = tree(1, true);
        tree.root().set_content(content(false, None, 0b0000_0101));

        let children = tree.children(tree.root());
        assert_eq!(children.len(), 6);
        assert!(children.iter().all(|c| c.depth() == 1));
        assert_eq!(children[0].content_id(), "1/1/0/0/1");
    }

    #[test]
    fn test_quadtree_children() {
        let tree = tree(1, false);
        tree.root().set_content(content(false, None, 0));
        assert_eq!(tree.children(tree.root()).len(), 4);
    }

    #[test]
    fn test_size_multiplier_refines_in_place() {
        let tree = tree(1, true);
        tree.root().set_content(content(false, Some(2.0), 0));

        let children = tree.children(tree.root());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].content_id(), "0/0/0/0/2");
        assert_eq!(children[0].range(), tree.root().range());
    }

    #[test]
    fn test_leaf_has_no_children() {
        let tree = tree(1, true);
        tree.root().set_content(content(true, None, 0));
        assert!(tree.children(tree.root()).is_empty());
    }
}
