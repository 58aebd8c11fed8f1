//! Binary tile content format.
//!
//! This module owns the byte layer: a little-endian cursor, the fixed tile
//! header and a writer that assembles complete tile blobs. Decoding the body
//! into graphics lives in [`crate::decode`].

mod error;
mod header;
mod stream;
mod writer;

pub use error::FormatError;
pub use header::{
    FormatVersion, ImdlFlags, TileFormatHeader, CURRENT_MAJOR_VERSION, CURRENT_MINOR_VERSION,
    TILE_FORMAT_MAGIC, V1_HEADER_LENGTH, V2_HEADER_LENGTH,
};
pub use stream::ByteStream;
pub use writer::{encode_primitive, PrimitiveBuilder, TileContentWriter, DEFAULT_COLOR};
