//! `sample` command - write a single-rectangle tile.

use std::path::Path;

use tilestream::format::{FormatVersion, PrimitiveBuilder, TileContentWriter};
use tilestream::geometry::Range3d;
use tilestream::id::Id64;

use crate::error::CliError;

pub const SAMPLE_MODEL_ID: Id64 = Id64(0x1c);
pub const SAMPLE_ELEMENT_ID: Id64 = Id64(0x20);

/// Parses `MAJOR.MINOR` (or a bare `MAJOR`).
pub fn parse_version(text: &str) -> Result<FormatVersion, CliError> {
    let invalid = || CliError::InvalidArgument(format!("format version {:?}", text));
    let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
    let major: u16 = major.trim().parse().map_err(|_| invalid())?;
    let minor: u16 = minor.trim().parse().map_err(|_| invalid())?;
    if major == 0 {
        return Err(invalid());
    }
    Ok(FormatVersion::new(major, minor))
}

/// A 5 x 10 rectangle centred on the origin, with edges.
pub fn sample_tile(version: FormatVersion) -> Result<Vec<u8>, CliError> {
    let (w, h) = (2.5, 5.0);
    let positions = vec![
        [-w, -h, 0.0].into(),
        [w, -h, 0.0].into(),
        [w, h, 0.0].into(),
        [-w, h, 0.0].into(),
    ];
    let rectangle = PrimitiveBuilder::mesh(positions, vec![0, 1, 2, 0, 2, 3])
        .edges(vec![[0, 1], [1, 2], [2, 3], [3, 0]])
        .planar(true);

    Ok(TileContentWriter::new(version, SAMPLE_MODEL_ID)
        .content_range(Range3d::new([-w, -h, 0.0].into(), [w, h, 0.0].into()))
        .element(SAMPLE_ELEMENT_ID)
        .primitive(rectangle)
        .finish()?)
}

pub fn run(out: &Path, version: &str) -> Result<(), CliError> {
    let version = parse_version(version)?;
    let bytes = sample_tile(version)?;
    std::fs::write(out, &bytes).map_err(|source| CliError::Write {
        path: out.to_path_buf(),
        source,
    })?;
    println!("Wrote {} ({} bytes, format {})", out.display(), bytes.len(), version);
    Ok(())
}
