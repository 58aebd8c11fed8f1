//! Errors raised while reading or writing tile content bytes.

use thiserror::Error;

/// Errors produced by the byte-level tile format layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    /// A read ran past the end of the buffer.
    #[error("unexpected end of data at offset {offset} (needed {needed} bytes, {available} available)")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A seek targeted a position outside the buffer.
    #[error("position {position} is outside a buffer of {length} bytes")]
    OutOfBounds { position: usize, length: usize },

    /// A section declared a length that does not fit its contents.
    #[error("{section} section is malformed: {reason}")]
    InvalidSection {
        section: &'static str,
        reason: String,
    },

    /// A vertex index referenced a vertex that does not exist.
    #[error("index {index} out of range for {count} vertices")]
    IndexOutOfRange { index: u32, count: u32 },

    /// A value too large for its on-disk field.
    #[error("{field} value {value} does not fit the tile format")]
    Overflow { field: &'static str, value: usize },
}

impl FormatError {
    pub(crate) fn section(section: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSection {
            section,
            reason: reason.into(),
        }
    }
}
