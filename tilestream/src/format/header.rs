//! Tile content header.
//!
//! Every tile blob starts with a fixed little-endian header:
//!
//! ```text
//! offset  size  field
//!      0     4  magic ("imdl")
//!      4     4  version (major << 16 | minor)
//!      8     4  header length
//!     12     4  flags (ImdlFlags)
//!     16     4  tile length
//!     20     4  elements included
//!     24     4  elements excluded
//!     28    48  content range (low xyz, high xyz as f64)
//!     76     4  empty sub-ranges (major >= 2 only)
//! ```
//!
//! The header length is self-describing: readers skip any bytes between the
//! fields they know and `header_length`, which lets newer minor versions append
//! fields without breaking older readers.

use std::fmt;

use glam::DVec3;

use super::stream::ByteStream;
use crate::geometry::Range3d;

/// Magic number identifying tile content ("imdl" read as little-endian u32).
pub const TILE_FORMAT_MAGIC: u32 = 0x6c64_6d69;

/// Newest major format version this crate can read.
pub const CURRENT_MAJOR_VERSION: u16 = 4;

/// Minor version written by [`super::TileContentWriter`] by default.
pub const CURRENT_MINOR_VERSION: u16 = 0;

/// Header length for major version 1 (no empty sub-range field).
pub const V1_HEADER_LENGTH: u32 = 76;

/// Header length for major version 2 and later.
pub const V2_HEADER_LENGTH: u32 = 80;

/// Packed `major << 16 | minor` format version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion(pub u32);

impl FormatVersion {
    pub const CURRENT: FormatVersion =
        FormatVersion::new(CURRENT_MAJOR_VERSION, CURRENT_MINOR_VERSION);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Minimum header length a blob of this version must declare.
    pub fn min_header_length(self) -> u32 {
        if self.major() >= 2 {
            V2_HEADER_LENGTH
        } else {
            V1_HEADER_LENGTH
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// Content flags stored in the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImdlFlags(pub u32);

impl ImdlFlags {
    pub const NONE: ImdlFlags = ImdlFlags(0);
    /// Tile contains curved geometry that can be refined by a single
    /// higher-resolution child.
    pub const CONTAINS_CURVES: ImdlFlags = ImdlFlags(1 << 0);
    /// Some elements or geometry were omitted from the tile.
    pub const INCOMPLETE: ImdlFlags = ImdlFlags(1 << 2);
    /// Tile must not be magnified past its own resolution.
    pub const DISALLOW_MAGNIFICATION: ImdlFlags = ImdlFlags(1 << 3);
    /// A pattern section follows the scene section.
    pub const HAS_PATTERNS: ImdlFlags = ImdlFlags(1 << 4);

    pub fn contains(self, other: ImdlFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ImdlFlags) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ImdlFlags {
    type Output = ImdlFlags;

    fn bitor(self, rhs: ImdlFlags) -> ImdlFlags {
        ImdlFlags(self.0 | rhs.0)
    }
}

/// Parsed tile content header.
#[derive(Clone, Debug, PartialEq)]
pub struct TileFormatHeader {
    pub format: u32,
    pub version: FormatVersion,
    pub header_length: u32,
    pub flags: ImdlFlags,
    pub tile_length: u32,
    pub num_elements_included: u32,
    pub num_elements_excluded: u32,
    pub content_range: Range3d,
    /// Bitfield of child sub-volumes known to be empty (major >= 2).
    pub empty_sub_ranges: u32,
    is_valid: bool,
}

impl TileFormatHeader {
    /// Builds a valid header for writing. Lengths are filled in by the writer.
    pub fn new(version: FormatVersion, flags: ImdlFlags, content_range: Range3d) -> Self {
        Self {
            format: TILE_FORMAT_MAGIC,
            version,
            header_length: version.min_header_length(),
            flags,
            tile_length: 0,
            num_elements_included: 0,
            num_elements_excluded: 0,
            content_range,
            empty_sub_ranges: 0,
            is_valid: true,
        }
    }

    /// Reads a header from the start of the stream.
    ///
    /// Never fails: a truncated buffer, a wrong magic number or a header length
    /// shorter than the version's fields produce a header whose
    /// [`is_valid`](Self::is_valid) is false. On success the stream is left
    /// positioned at `header_length`.
    pub fn read(stream: &mut ByteStream<'_>) -> Self {
        let start = stream.pos();
        let mut header = Self {
            format: 0,
            version: FormatVersion(0),
            header_length: 0,
            flags: ImdlFlags::NONE,
            tile_length: 0,
            num_elements_included: 0,
            num_elements_excluded: 0,
            content_range: Range3d::null(),
            empty_sub_ranges: 0,
            is_valid: false,
        };

        if header.read_fields(stream).is_err() {
            return header;
        }
        if header.format != TILE_FORMAT_MAGIC {
            return header;
        }

        let consumed = stream.pos() - start;
        if (header.header_length as usize) < consumed {
            return header;
        }

        // Skip fields added by newer minor versions.
        let end = start + header.header_length as usize;
        if stream.set_pos(end).is_err() {
            return header;
        }

        header.is_valid = true;
        header
    }

    fn read_fields(&mut self, stream: &mut ByteStream<'_>) -> Result<(), super::FormatError> {
        self.format = stream.read_u32()?;
        self.version = FormatVersion(stream.read_u32()?);
        self.header_length = stream.read_u32()?;
        self.flags = ImdlFlags(stream.read_u32()?);
        self.tile_length = stream.read_u32()?;
        self.num_elements_included = stream.read_u32()?;
        self.num_elements_excluded = stream.read_u32()?;
        let low = stream.read_dvec3()?;
        let high = stream.read_dvec3()?;
        self.content_range = Range3d::new(low, high);
        if self.version.major() >= 2 {
            self.empty_sub_ranges = stream.read_u32()?;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn version_major(&self) -> u16 {
        self.version.major()
    }

    pub fn version_minor(&self) -> u16 {
        self.version.minor()
    }

    /// True if this crate understands the header's major version.
    pub fn is_readable_version(&self) -> bool {
        self.version_major() <= CURRENT_MAJOR_VERSION
    }

    /// Encodes the header fields, padding with zeros up to `header_length`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_length as usize);
        out.extend_from_slice(&self.format.to_le_bytes());
        out.extend_from_slice(&self.version.0.to_le_bytes());
        out.extend_from_slice(&self.header_length.to_le_bytes());
        out.extend_from_slice(&self.flags.0.to_le_bytes());
        out.extend_from_slice(&self.tile_length.to_le_bytes());
        out.extend_from_slice(&self.num_elements_included.to_le_bytes());
        out.extend_from_slice(&self.num_elements_excluded.to_le_bytes());
        push_dvec3(&mut out, self.content_range.low);
        push_dvec3(&mut out, self.content_range.high);
        if self.version.major() >= 2 {
            out.extend_from_slice(&self.empty_sub_ranges.to_le_bytes());
        }
        if out.len() < self.header_length as usize {
            out.resize(self.header_length as usize, 0);
        }
        out
    }
}

pub(crate) fn push_dvec3(out: &mut Vec<u8>, v: DVec3) {
    out.extend_from_slice(&v.x.to_le_bytes());
    out.extend_from_slice(&v.y.to_le_bytes());
    out.extend_from_slice(&v.z.to_le_bytes());
}
