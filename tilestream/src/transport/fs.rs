//! Transport serving pre-generated tiles from a directory.
//!
//! ```text
//! <root>/<tree id>/tree.json              TileTreeProps
//! <root>/<tree id>/<content id>.imdl      tile content
//! ```
//!
//! `/` in content ids is written as `_` so every tile is a single file name.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use super::{TileTransport, TileTreeProps, TransportError};
use crate::cache::BoxFuture;
use crate::id::TileContentIdentifier;

pub const TREE_PROPS_FILE: &str = "tree.json";
pub const TILE_FILE_EXTENSION: &str = "imdl";

#[derive(Clone, Debug)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree_dir(&self, tree_id: &str) -> PathBuf {
        self.root.join(tree_id)
    }

    pub fn props_path(&self, tree_id: &str) -> PathBuf {
        self.tree_dir(tree_id).join(TREE_PROPS_FILE)
    }

    pub fn content_path(&self, tree_id: &str, content_id: &str) -> PathBuf {
        self.tree_dir(tree_id).join(format!(
            "{}.{}",
            content_id.replace('/', "_"),
            TILE_FILE_EXTENSION
        ))
    }

    /// Writes `props` to its `tree.json`, creating the tree directory.
    pub async fn write_props(&self, props: &TileTreeProps) -> io::Result<()> {
        let json = props
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tokio::fs::create_dir_all(self.tree_dir(&props.id)).await?;
        tokio::fs::write(self.props_path(&props.id), json).await
    }

    /// Writes one tile's content, creating the tree directory.
    pub async fn write_content(
        &self,
        tree_id: &str,
        content_id: &str,
        bytes: &[u8],
    ) -> io::Result<()> {
        tokio::fs::create_dir_all(self.tree_dir(tree_id)).await?;
        tokio::fs::write(self.content_path(tree_id, content_id), bytes).await
    }
}

fn map_io(path: &Path, e: io::Error) -> TransportError {
    if e.kind() == io::ErrorKind::NotFound {
        TransportError::NotFound(path.display().to_string())
    } else {
        TransportError::Failed(format!("{}: {}", path.display(), e))
    }
}

impl TileTransport for DirectoryTransport {
    fn get_tile_tree_props<'a>(
        &'a self,
        tree_id: &'a str,
    ) -> BoxFuture<'a, Result<TileTreeProps, TransportError>> {
        Box::pin(async move {
            let path = self.props_path(tree_id);
            let json = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| map_io(&path, e))?;
            debug!(path = %path.display(), "Loaded tile tree props");
            TileTreeProps::from_json(&json)
                .map_err(|e| TransportError::Failed(format!("{}: {}", path.display(), e)))
        })
    }

    fn request_tile_content<'a>(
        &'a self,
        id: &'a TileContentIdentifier,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        Box::pin(async move {
            let path = self.content_path(&id.tree_id, &id.content_id);
            let bytes = tokio::fs::read(&path).await.map_err(|e| map_io(&path, e))?;
            Ok(Bytes::from(bytes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Range3d;
    use crate::transport::TileProps;
    use glam::DVec3;

    fn props() -> TileTreeProps {
        TileTreeProps {
            id: "0x1c".to_string(),
            format_version: Some(1 << 16),
            root_tile: TileProps {
                content_id: "0/0/0/0/1".to_string(),
                range: Range3d::new(DVec3::ZERO, DVec3::ONE),
                content_range: None,
                is_leaf: false,
            },
            max_tiles_to_skip: 0,
            is_3d: true,
        }
    }

    fn identifier(content_id: &str) -> TileContentIdentifier {
        TileContentIdentifier {
            connection_key: "local".to_string(),
            tree_id: "0x1c".to_string(),
            content_id: content_id.to_string(),
            guid: None,
        }
    }

    #[test]
    fn test_content_path_flattens_slashes() {
        let transport = DirectoryTransport::new("/tiles");
        assert_eq!(
            transport.content_path("0x1c", "0/0/0/0/1"),
            PathBuf::from("/tiles/0x1c/0_0_0_0_1.imdl")
        );
    }

    #[tokio::test]
    async fn test_serves_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());

        transport.write_props(&props()).await.unwrap();
        transport.write_content("0x1c", "0/0/0/0/1", b"imdl").await.unwrap();

        let loaded = transport.get_tile_tree_props("0x1c").await.unwrap();
        assert_eq!(loaded, props());

        let bytes = transport.request_tile_content(&identifier("0/0/0/0/1")).await.unwrap();
        assert_eq!(&bytes[..], b"imdl");
    }

    #[tokio::test]
    async fn test_missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());

        assert!(matches!(
            transport.get_tile_tree_props("0x99").await,
            Err(TransportError::NotFound(_))
        ));
        assert!(matches!(
            transport.request_tile_content(&identifier("1/0/0/0/1")).await,
            Err(TransportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_props_fail() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());
        tokio::fs::create_dir_all(transport.tree_dir("0x1c")).await.unwrap();
        tokio::fs::write(transport.props_path("0x1c"), "{ not json").await.unwrap();

        assert!(matches!(
            transport.get_tile_tree_props("0x1c").await,
            Err(TransportError::Failed(_))
        ));
    }
}
