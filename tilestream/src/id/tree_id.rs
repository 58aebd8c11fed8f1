//! Canonical tile tree id strings.
//!
//! ```text
//! [<major>_<flags>-] [A:<animation id>_] [E:0_] <model id>        primary
//! [<major>_<flags>-] C:<expansion>_ <model id>                     volume classifier
//! [<major>_<flags>-] CP:<expansion>_ <model id>                    planar classifier
//! ```
//!
//! The version prefix is only emitted for major version 4 and later; older
//! versions share the unversioned scheme. `E:0_` marks a tree whose tiles
//! omit edges. Numbers in the prefix are lowercase hex; expansions are printed
//! with six decimals.

use std::fmt::Write;

use super::{Id64, IdError};

/// What a tile tree's batches are used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchType {
    Primary,
    VolumeClassifier,
    PlanarClassifier,
}

impl BatchType {
    pub fn is_classifier(self) -> bool {
        !matches!(self, Self::Primary)
    }
}

/// Flags carried in a versioned tree id prefix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TreeFlags(pub u32);

impl TreeFlags {
    pub const NONE: TreeFlags = TreeFlags(0);
    /// Tiles are generated against the project extents rather than the model's.
    pub const USE_PROJECT_EXTENTS: TreeFlags = TreeFlags(1 << 0);

    pub fn contains(self, other: TreeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TreeFlags) {
        self.0 |= other.0;
    }
}

/// Options that shape a tree id but are not part of the tree's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeIdOptions {
    /// Negotiated major format version.
    pub major_version: u16,
    pub use_project_extents: bool,
}

/// Identity of a tile tree within a model.
#[derive(Clone, Debug, PartialEq)]
pub enum TileTreeId {
    Primary {
        edges_required: bool,
        animation_id: Option<Id64>,
    },
    VolumeClassifier {
        expansion: f64,
    },
    PlanarClassifier {
        expansion: f64,
    },
}

impl Default for TileTreeId {
    fn default() -> Self {
        Self::primary()
    }
}

impl TileTreeId {
    /// A primary tree with edges and no animation.
    pub fn primary() -> Self {
        Self::Primary {
            edges_required: true,
            animation_id: None,
        }
    }

    pub fn with_edges(edges_required: bool) -> Self {
        Self::Primary {
            edges_required,
            animation_id: None,
        }
    }

    pub fn batch_type(&self) -> BatchType {
        match self {
            Self::Primary { .. } => BatchType::Primary,
            Self::VolumeClassifier { .. } => BatchType::VolumeClassifier,
            Self::PlanarClassifier { .. } => BatchType::PlanarClassifier,
        }
    }

    /// Classifier trees never carry edges.
    pub fn edges_required(&self) -> bool {
        match self {
            Self::Primary { edges_required, .. } => *edges_required,
            _ => false,
        }
    }

    pub fn animation_id(&self) -> Option<Id64> {
        match self {
            Self::Primary { animation_id, .. } => *animation_id,
            _ => None,
        }
    }

    /// Builds the canonical id string for `model_id`.
    pub fn to_id_string(&self, model_id: Id64, options: &TreeIdOptions) -> String {
        let mut flags = TreeFlags::NONE;
        if options.use_project_extents {
            flags.insert(TreeFlags::USE_PROJECT_EXTENTS);
        }

        let mut tokens = String::new();
        match self {
            Self::Primary {
                edges_required,
                animation_id,
            } => {
                if let Some(animation_id) = animation_id {
                    let _ = write!(tokens, "A:{}_", animation_id);
                }
                if !edges_required {
                    tokens.push_str("E:0_");
                }
            }
            Self::VolumeClassifier { expansion } => {
                flags.insert(TreeFlags::USE_PROJECT_EXTENTS);
                let _ = write!(tokens, "C:{:.6}_", expansion);
            }
            Self::PlanarClassifier { expansion } => {
                let _ = write!(tokens, "CP:{:.6}_", expansion);
            }
        }

        let mut id = String::new();
        if options.major_version >= 4 {
            let _ = write!(id, "{:x}_{:x}-", options.major_version, flags.0);
        }
        id.push_str(&tokens);
        let _ = write!(id, "{}", model_id);
        id
    }
}

/// A tree id string decomposed into its parts.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTreeId {
    pub model_id: Id64,
    pub tree_id: TileTreeId,
    /// `None` for unversioned (major <= 3) ids.
    pub major_version: Option<u16>,
    pub flags: TreeFlags,
}

/// Parses a canonical tree id string.
pub fn parse_tree_id(id: &str) -> Result<ParsedTreeId, IdError> {
    let invalid = |reason: &str| IdError::InvalidTreeId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let (major_version, flags, mut rest) = match split_version_prefix(id) {
        Some((major, flags, rest)) => (Some(major), flags, rest),
        None => (None, TreeFlags::NONE, id),
    };

    let mut animation_id = None;
    let mut edges_required = true;
    let mut classifier = None;

    loop {
        if let Some(after) = rest.strip_prefix("A:") {
            let (token, tail) = after.split_once('_').ok_or_else(|| invalid("unterminated A:"))?;
            animation_id = Some(token.parse::<Id64>()?);
            rest = tail;
        } else if let Some(after) = rest.strip_prefix("E:0_") {
            edges_required = false;
            rest = after;
        } else if let Some(after) = rest.strip_prefix("CP:") {
            let (token, tail) = after.split_once('_').ok_or_else(|| invalid("unterminated CP:"))?;
            let expansion = token.parse::<f64>().map_err(|_| invalid("bad expansion"))?;
            classifier = Some(TileTreeId::PlanarClassifier { expansion });
            rest = tail;
        } else if let Some(after) = rest.strip_prefix("C:") {
            let (token, tail) = after.split_once('_').ok_or_else(|| invalid("unterminated C:"))?;
            let expansion = token.parse::<f64>().map_err(|_| invalid("bad expansion"))?;
            classifier = Some(TileTreeId::VolumeClassifier { expansion });
            rest = tail;
        } else {
            break;
        }
    }

    let model_id = rest.parse::<Id64>()?;
    let tree_id = match classifier {
        Some(classifier) => {
            if animation_id.is_some() || !edges_required {
                return Err(invalid("classifier ids take no primary tokens"));
            }
            classifier
        }
        None => TileTreeId::Primary {
            edges_required,
            animation_id,
        },
    };

    Ok(ParsedTreeId {
        model_id,
        tree_id,
        major_version,
        flags,
    })
}

fn split_version_prefix(id: &str) -> Option<(u16, TreeFlags, &str)> {
    let (prefix, rest) = id.split_once('-')?;
    let (major, flags) = prefix.split_once('_')?;
    let major = u16::from_str_radix(major, 16).ok()?;
    let flags = u32::from_str_radix(flags, 16).ok()?;
    Some((major, TreeFlags(flags), rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: Id64 = Id64(0x1c);

    fn options(major_version: u16) -> TreeIdOptions {
        TreeIdOptions {
            major_version,
            use_project_extents: false,
        }
    }

    #[test]
    fn test_primary_ids() {
        assert_eq!(TileTreeId::primary().to_id_string(MODEL, &options(4)), "4_0-0x1c");
        assert_eq!(
            TileTreeId::with_edges(false).to_id_string(MODEL, &options(4)),
            "4_0-E:0_0x1c"
        );
    }

    #[test]
    fn test_legacy_ids_have_no_prefix() {
        assert_eq!(TileTreeId::primary().to_id_string(MODEL, &options(3)), "0x1c");
        assert_eq!(
            TileTreeId::with_edges(false).to_id_string(MODEL, &options(1)),
            "E:0_0x1c"
        );
    }

    #[test]
    fn test_animation_precedes_edge_token() {
        let id = TileTreeId::Primary {
            edges_required: false,
            animation_id: Some(Id64(0x123)),
        };
        assert_eq!(id.to_id_string(Id64(0xabc), &options(3)), "A:0x123_E:0_0xabc");
        assert_eq!(
            id.to_id_string(Id64(0xabc), &options(4)),
            "4_0-A:0x123_E:0_0xabc"
        );
    }

    #[test]
    fn test_classifier_ids() {
        let volume = TileTreeId::VolumeClassifier { expansion: 0.0 };
        assert_eq!(volume.to_id_string(MODEL, &options(4)), "4_1-C:0.000000_0x1c");

        let planar = TileTreeId::PlanarClassifier {
            expansion: 12.1234567,
        };
        assert_eq!(planar.to_id_string(MODEL, &options(4)), "4_0-CP:12.123457_0x1c");
        assert!(!planar.edges_required());
    }

    #[test]
    fn test_project_extents_flag() {
        let opts = TreeIdOptions {
            major_version: 4,
            use_project_extents: true,
        };
        assert_eq!(TileTreeId::primary().to_id_string(MODEL, &opts), "4_1-0x1c");
    }

    #[test]
    fn test_parse_versioned() {
        let parsed = parse_tree_id("4_1-A:0x5_E:0_0x1c").unwrap();
        assert_eq!(parsed.model_id, MODEL);
        assert_eq!(parsed.major_version, Some(4));
        assert!(parsed.flags.contains(TreeFlags::USE_PROJECT_EXTENTS));
        assert_eq!(
            parsed.tree_id,
            TileTreeId::Primary {
                edges_required: false,
                animation_id: Some(Id64(5)),
            }
        );
    }

    #[test]
    fn test_parse_legacy_and_classifier() {
        let parsed = parse_tree_id("0x1c").unwrap();
        assert_eq!(parsed.major_version, None);
        assert_eq!(parsed.tree_id, TileTreeId::primary());

        let parsed = parse_tree_id("4_0-CP:12.123457_0x1c").unwrap();
        assert_eq!(parsed.tree_id.batch_type(), BatchType::PlanarClassifier);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_tree_id("").is_err());
        assert!(parse_tree_id("4_0-Z:1_0x1c").is_err());
        assert!(parse_tree_id("A:0x5").is_err());
        assert!(parse_tree_id("C:1.0_E:0_0x1c").is_err());
    }
}
