//! `walk` command - load a tile tree served from a directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use tilestream::admin::TileAdminConfig;
use tilestream::decode::DefaultRenderSystem;
use tilestream::id::{parse_tree_id, TreeFlags};
use tilestream::transport::DirectoryTransport;
use tilestream::{TileAdmin, TileSession, TileStatisticsSnapshot, TreeWalkSummary};
use tracing::{info, warn};

use crate::error::CliError;

/// Config file looked up under the user config directory when `--config` is
/// not given.
pub const DEFAULT_CONFIG_FILE: &str = "tilestream/config.ini";

/// Major version assumed for tree ids without a version prefix.
const LEGACY_MAJOR_VERSION: u16 = 3;

#[derive(Debug, Args)]
pub struct WalkArgs {
    /// Directory holding `<tree id>/tree.json` and the tiles
    pub dir: PathBuf,

    /// Canonical tree id, e.g. 4_0-0x1c
    pub tree_id: String,

    /// Deepest tile level to load
    #[arg(long, default_value_t = 2)]
    pub depth: u32,

    /// INI file with a [tiles] section
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug)]
pub struct WalkReport {
    pub tree_id: String,
    pub summary: TreeWalkSummary,
    pub statistics: TileStatisticsSnapshot,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.is_file())
}

pub fn load_config(path: Option<&Path>) -> Result<TileAdminConfig, CliError> {
    match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => {
            info!(path = %path.display(), "Loading tile configuration");
            Ok(TileAdminConfig::load(&path)?)
        }
        None => Ok(TileAdminConfig::default()),
    }
}

pub async fn walk(
    dir: &Path,
    tree_id: &str,
    depth: u32,
    config: TileAdminConfig,
) -> Result<WalkReport, CliError> {
    let parsed = parse_tree_id(tree_id)?;
    let config = config
        .with_max_major_version(parsed.major_version.unwrap_or(LEGACY_MAJOR_VERSION))
        .with_project_extents(parsed.flags.contains(TreeFlags::USE_PROJECT_EXTENTS));

    let session = TileSession::new(
        format!("local:{}", dir.display()),
        TileAdmin::new(config),
        Arc::new(DirectoryTransport::new(dir)),
        Arc::new(DefaultRenderSystem::new()),
    );

    let owner = session.tree_owner(parsed.model_id, &parsed.tree_id);
    if owner.id() != tree_id {
        warn!(requested = tree_id, canonical = owner.id(), "Tree id is not in canonical form");
    }
    let tree = owner.load().await?;
    let summary = session.load_tree_to_depth(&tree, depth).await;
    session.admin().wait_for_idle().await;

    Ok(WalkReport {
        tree_id: tree.id().to_string(),
        summary,
        statistics: session.admin().statistics(),
    })
}

pub fn run(args: WalkArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let report = super::runtime()?.block_on(walk(&args.dir, &args.tree_id, args.depth, config))?;
    let summary = &report.summary;

    println!("Tree: {}", report.tree_id);
    println!("  Tiles requested: {}", summary.tiles_requested);
    println!("  Tiles ready:     {}", summary.tiles_ready);
    println!("  Tiles failed:    {}", summary.tiles_failed);
    println!("  Tiles canceled:  {}", summary.tiles_canceled);
    println!("  Empty tiles:     {}", summary.empty_tiles);
    println!("  Leaf tiles:      {}", summary.leaf_tiles);
    println!("  Deepest level:   {}", summary.max_depth_reached);
    println!();
    println!("{}", report.statistics);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sample::sample_tile;
    use tilestream::format::FormatVersion;
    use tilestream::geometry::Range3d;
    use tilestream::transport::{TileProps, TileTreeProps};

    async fn write_tree(dir: &Path, tree_id: &str, major: u16, root_content_id: &str) {
        let transport = DirectoryTransport::new(dir);
        let props = TileTreeProps {
            id: tree_id.to_string(),
            format_version: Some(u32::from(major) << 16),
            root_tile: TileProps {
                content_id: root_content_id.to_string(),
                range: Range3d::new([-8.0, -8.0, -8.0].into(), [8.0, 8.0, 8.0].into()),
                content_range: None,
                is_leaf: false,
            },
            max_tiles_to_skip: 0,
            is_3d: true,
        };
        transport.write_props(&props).await.unwrap();
        let tile = sample_tile(FormatVersion::new(major, 0)).unwrap();
        transport
            .write_content(tree_id, root_content_id, &tile)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_walk_current_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), "4_0-0x1c", 4, "-1-0-0-0-0-1").await;

        let report = walk(dir.path(), "4_0-0x1c", 3, TileAdminConfig::default())
            .await
            .unwrap();

        assert_eq!(report.tree_id, "4_0-0x1c");
        assert_eq!(report.summary.tiles_ready, 1);
        assert_eq!(report.summary.leaf_tiles, 1);
        assert_eq!(report.statistics.total_completed_requests, 1);
    }

    #[tokio::test]
    async fn test_walk_legacy_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), "0x1c", 3, "_3_1_0_0_0_0_1").await;

        let report = walk(dir.path(), "0x1c", 1, TileAdminConfig::default())
            .await
            .unwrap();

        assert_eq!(report.summary.tiles_ready, 1);
    }

    #[tokio::test]
    async fn test_walk_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let result = walk(dir.path(), "4_0-0x1c", 1, TileAdminConfig::default()).await;
        assert!(matches!(result, Err(CliError::TreeLoad(_))));
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[tiles]\nmax_active_requests = 4\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_active_requests, 4);

        let missing = dir.path().join("missing.ini");
        assert!(matches!(load_config(Some(&missing)), Err(CliError::Config(_))));
    }
}
