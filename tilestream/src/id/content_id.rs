//! Tile content ids.
//!
//! A content id locates one tile inside its tree by depth, integer position
//! `(i, j, k)` at that depth and a size multiplier used when a tile is refined
//! into a single higher-resolution child. The spelling depends on the
//! negotiated major version:
//!
//! ```text
//! V1 (major <= 1)  depth/i/j/k/mult
//! V2 (major 2-3)   _<major>_<flags>_depth_i_j_k_mult
//! V4 (major >= 4)  -<flags>-depth-i-j-k-mult
//! ```
//!
//! All numbers are lowercase hex.

use std::fmt;

use super::IdError;

/// Flags embedded in V2+ content ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContentFlags(pub u32);

impl ContentFlags {
    pub const NONE: ContentFlags = ContentFlags(0);
    pub const ALLOW_INSTANCING: ContentFlags = ContentFlags(1 << 0);
    pub const IMPROVED_ELISION: ContentFlags = ContentFlags(1 << 1);

    pub fn contains(self, other: ContentFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ContentFlags {
    type Output = ContentFlags;

    fn bitor(self, rhs: ContentFlags) -> ContentFlags {
        ContentFlags(self.0 | rhs.0)
    }
}

/// Position of a tile within its tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentSpec {
    pub depth: u32,
    pub i: u32,
    pub j: u32,
    pub k: u32,
    pub multiplier: u32,
}

impl ContentSpec {
    pub const ROOT: ContentSpec = ContentSpec {
        depth: 0,
        i: 0,
        j: 0,
        k: 0,
        multiplier: 1,
    };

    /// Spec of the child selected by `octant` (bit 0 = i, bit 1 = j, bit 2 = k).
    ///
    /// `None` once a coordinate no longer fits in 32 bits.
    pub fn child(&self, octant: u8) -> Option<ContentSpec> {
        let split = |value: u32, bit: u8| {
            value.checked_mul(2)?.checked_add(u32::from((octant >> bit) & 1))
        };
        Some(ContentSpec {
            depth: self.depth.checked_add(1)?,
            i: split(self.i, 0)?,
            j: split(self.j, 1)?,
            k: split(self.k, 2)?,
            multiplier: 1,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentIdScheme {
    V1,
    V2 { major: u16, flags: ContentFlags },
    V4 { flags: ContentFlags },
}

/// Formats and parses content ids for one negotiated major version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentIdProvider {
    scheme: ContentIdScheme,
}

impl ContentIdProvider {
    pub fn for_major(major: u16, flags: ContentFlags) -> Self {
        let scheme = match major {
            0 | 1 => ContentIdScheme::V1,
            2 | 3 => ContentIdScheme::V2 { major, flags },
            _ => ContentIdScheme::V4 { flags },
        };
        Self { scheme }
    }

    pub fn scheme(&self) -> ContentIdScheme {
        self.scheme
    }

    fn separator(&self) -> char {
        match self.scheme {
            ContentIdScheme::V1 => '/',
            ContentIdScheme::V2 { .. } => '_',
            ContentIdScheme::V4 { .. } => '-',
        }
    }

    fn prefix(&self) -> String {
        match self.scheme {
            ContentIdScheme::V1 => String::new(),
            ContentIdScheme::V2 { major, flags } => format!("_{:x}_{:x}_", major, flags.0),
            ContentIdScheme::V4 { flags } => format!("-{:x}-", flags.0),
        }
    }

    pub fn id_from_spec(&self, spec: &ContentSpec) -> String {
        let sep = self.separator();
        format!(
            "{}{:x}{sep}{:x}{sep}{:x}{sep}{:x}{sep}{:x}",
            self.prefix(),
            spec.depth,
            spec.i,
            spec.j,
            spec.k,
            spec.multiplier,
        )
    }

    pub fn root_content_id(&self) -> String {
        self.id_from_spec(&ContentSpec::ROOT)
    }

    /// Parses the trailing five numeric parts of `id`.
    pub fn spec_from_id(&self, id: &str) -> Result<ContentSpec, IdError> {
        let parts: Vec<&str> = id.rsplitn(6, self.separator()).collect();
        if parts.len() < 5 {
            return Err(IdError::InvalidContentId(id.to_string()));
        }
        let num = |s: &str| {
            u32::from_str_radix(s, 16).map_err(|_| IdError::InvalidContentId(id.to_string()))
        };
        // rsplitn yields parts last-first.
        Ok(ContentSpec {
            depth: num(parts[4])?,
            i: num(parts[3])?,
            j: num(parts[2])?,
            k: num(parts[1])?,
            multiplier: num(parts[0])?,
        })
    }

    /// Replaces the multiplier of `parent_id`.
    pub fn id_from_parent_and_multiplier(
        &self,
        parent_id: &str,
        multiplier: u32,
    ) -> Result<String, IdError> {
        let (head, last) = parent_id
            .rsplit_once(self.separator())
            .ok_or_else(|| IdError::InvalidContentId(parent_id.to_string()))?;
        u32::from_str_radix(last, 16)
            .map_err(|_| IdError::InvalidContentId(parent_id.to_string()))?;
        Ok(format!("{}{}{:x}", head, self.separator(), multiplier))
    }

    /// Ids of the children of `parent_id`, paired with their octant bits.
    ///
    /// 3D trees split into eight octants, 2D trees into four quadrants.
    pub fn child_ids(&self, parent_id: &str, is_3d: bool) -> Result<Vec<(u8, String)>, IdError> {
        let parent = self.spec_from_id(parent_id)?;
        let count = if is_3d { 8 } else { 4 };
        (0..count)
            .map(|octant| match parent.child(octant) {
                Some(child) => Ok((octant, self.id_from_spec(&child))),
                None => Err(IdError::TooDeep(parent_id.to_string())),
            })
            .collect()
    }
}

/// Everything needed to address one tile's content in the remote cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileContentIdentifier {
    /// Identifies the connection (model repository and version) the tree belongs to.
    pub connection_key: String,
    pub tree_id: String,
    pub content_id: String,
    /// Geometry fingerprint; `None` until the model has been fingerprinted.
    pub guid: Option<String>,
}

impl fmt::Display for TileContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tree_id, self.content_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_ids_per_version() {
        let v1 = ContentIdProvider::for_major(1, ContentFlags::ALLOW_INSTANCING);
        assert_eq!(v1.root_content_id(), "0/0/0/0/1");

        let v2 = ContentIdProvider::for_major(3, ContentFlags::NONE);
        assert_eq!(v2.root_content_id(), "_3_0_0_0_0_0_1");

        let v4 = ContentIdProvider::for_major(4, ContentFlags::ALLOW_INSTANCING);
        assert_eq!(v4.root_content_id(), "-1-0-0-0-0-1");
    }

    #[test]
    fn test_numbers_are_hex() {
        let provider = ContentIdProvider::for_major(1, ContentFlags::NONE);
        let spec = ContentSpec {
            depth: 10,
            i: 255,
            j: 16,
            k: 0,
            multiplier: 2,
        };
        assert_eq!(provider.id_from_spec(&spec), "a/ff/10/0/2");
        assert_eq!(provider.spec_from_id("a/ff/10/0/2").unwrap(), spec);
    }

    #[test]
    fn test_spec_from_prefixed_ids() {
        let v2 = ContentIdProvider::for_major(2, ContentFlags::ALLOW_INSTANCING);
        let id = v2.id_from_spec(&ContentSpec::ROOT.child(5).unwrap());
        assert_eq!(id, "_2_1_1_1_0_1_1");
        assert_eq!(v2.spec_from_id(&id).unwrap(), ContentSpec::ROOT.child(5).unwrap());

        let v4 = ContentIdProvider::for_major(4, ContentFlags::NONE);
        let id = v4.id_from_spec(&ContentSpec::ROOT.child(7).unwrap());
        assert_eq!(id, "-0-1-1-1-1-1");
        assert_eq!(v4.spec_from_id(&id).unwrap(), ContentSpec::ROOT.child(7).unwrap());
    }

    #[test]
    fn test_spec_from_id_rejects_garbage() {
        let v1 = ContentIdProvider::for_major(1, ContentFlags::NONE);
        assert!(v1.spec_from_id("0/0/1").is_err());
        assert!(v1.spec_from_id("0/0/0/0/x").is_err());
    }

    #[test]
    fn test_id_from_parent_and_multiplier() {
        let v4 = ContentIdProvider::for_major(4, ContentFlags::ALLOW_INSTANCING);
        let child = v4
            .id_from_parent_and_multiplier(&v4.root_content_id(), 2)
            .unwrap();
        assert_eq!(child, "-1-0-0-0-0-2");
        assert_eq!(v4.spec_from_id(&child).unwrap().multiplier, 2);
    }

    #[test]
    fn test_child_ids() {
        let v1 = ContentIdProvider::for_major(1, ContentFlags::NONE);
        let children = v1.child_ids("0/0/0/0/1", true).unwrap();
        assert_eq!(children.len(), 8);
        assert_eq!(children[0].1, "1/0/0/0/1");
        assert_eq!(children[7].1, "1/1/1/1/1");

        let quads = v1.child_ids("1/1/0/0/1", false).unwrap();
        assert_eq!(quads.len(), 4);
        assert_eq!(quads[3].1, "2/3/1/0/1");
    }

    #[test]
    fn test_deepest_tile_cannot_subdivide() {
        let deep = ContentSpec {
            depth: 32,
            i: u32::MAX,
            j: 0,
            k: 0,
            multiplier: 1,
        };
        assert!(deep.child(0).is_none());
        let max_depth = ContentSpec {
            depth: u32::MAX,
            ..ContentSpec::ROOT
        };
        assert!(max_depth.child(0).is_none());

        let v4 = ContentIdProvider::for_major(4, ContentFlags::NONE);
        let id = v4.id_from_spec(&deep);
        assert_eq!(v4.child_ids(&id, true), Err(IdError::TooDeep(id.clone())));
    }
}
