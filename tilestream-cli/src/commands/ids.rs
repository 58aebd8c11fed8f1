//! `tree-id` and `content-id` commands.

use clap::{Args, ValueEnum};
use tilestream::id::{
    max_major_version, ContentFlags, ContentIdProvider, ContentSpec, Id64, TileTreeId,
    TreeIdOptions,
};

use crate::error::CliError;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ClassifierKind {
    /// Volume classifier (always uses project extents)
    Volume,
    /// Planar classifier
    Planar,
}

#[derive(Debug, Args)]
pub struct TreeIdArgs {
    /// Model id, e.g. 0x1c
    pub model: Id64,

    /// Omit edges from the tree's tiles
    #[arg(long)]
    pub no_edges: bool,

    /// Schedule-script animation id
    #[arg(long, value_name = "ID")]
    pub animation: Option<Id64>,

    /// Highest tile format major version to request
    #[arg(long, value_name = "N")]
    pub max_version: Option<u16>,

    /// Build a classifier tree id instead of a primary one
    #[arg(long, value_enum)]
    pub classifier: Option<ClassifierKind>,

    /// Classifier expansion distance
    #[arg(long, default_value_t = 0.0)]
    pub expansion: f64,

    /// Use the project extents as the tree's range
    #[arg(long)]
    pub project_extents: bool,
}

impl TreeIdArgs {
    fn tree_id(&self) -> TileTreeId {
        match self.classifier {
            Some(ClassifierKind::Volume) => TileTreeId::VolumeClassifier {
                expansion: self.expansion,
            },
            Some(ClassifierKind::Planar) => TileTreeId::PlanarClassifier {
                expansion: self.expansion,
            },
            None => TileTreeId::Primary {
                edges_required: !self.no_edges,
                animation_id: self.animation,
            },
        }
    }

    pub fn id_string(&self) -> String {
        let options = TreeIdOptions {
            major_version: max_major_version(self.max_version, None),
            use_project_extents: self.project_extents,
        };
        self.tree_id().to_id_string(self.model, &options)
    }
}

#[derive(Debug, Args)]
pub struct ContentIdArgs {
    /// Negotiated tile format major version
    #[arg(long)]
    pub major: u16,

    /// Allow instanced geometry in the content
    #[arg(long)]
    pub instancing: bool,

    pub depth: u32,
    pub i: u32,
    pub j: u32,
    pub k: u32,

    /// Size multiplier
    #[arg(default_value_t = 1)]
    pub multiplier: u32,
}

impl ContentIdArgs {
    pub fn id_string(&self) -> Result<String, CliError> {
        if self.multiplier == 0 {
            return Err(CliError::InvalidArgument(
                "multiplier must be at least 1".to_string(),
            ));
        }
        let flags = if self.instancing {
            ContentFlags::ALLOW_INSTANCING
        } else {
            ContentFlags::NONE
        };
        let spec = ContentSpec {
            depth: self.depth,
            i: self.i,
            j: self.j,
            k: self.k,
            multiplier: self.multiplier,
        };
        Ok(ContentIdProvider::for_major(self.major, flags).id_from_spec(&spec))
    }
}

pub fn run_tree_id(args: TreeIdArgs) -> Result<(), CliError> {
    println!("{}", args.id_string());
    Ok(())
}

pub fn run_content_id(args: ContentIdArgs) -> Result<(), CliError> {
    println!("{}", args.id_string()?);
    Ok(())
}
