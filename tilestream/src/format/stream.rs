//! Little-endian cursor over tile content bytes.

use glam::DVec3;

use super::error::FormatError;

/// A forward-reading cursor over a byte slice.
///
/// All multi-byte values are little-endian. Reads that would run past the end
/// of the buffer fail without moving the cursor.
#[derive(Debug, Clone)]
pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, FormatError> {
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            buf.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset from the start of the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Moves the cursor to an absolute position. `position == len()` is allowed.
    pub fn set_pos(&mut self, position: usize) -> Result<(), FormatError> {
        if position > self.data.len() {
            return Err(FormatError::OutOfBounds {
                position,
                length: self.data.len(),
            });
        }
        self.pos = position;
        Ok(())
    }

    /// Skips `count` bytes.
    pub fn advance(&mut self, count: usize) -> Result<(), FormatError> {
        self.take(count).map(|_| ())
    }

    /// Returns the next `count` bytes and moves past them.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or(FormatError::UnexpectedEof {
                offset: self.pos,
                needed: count,
                available: self.remaining(),
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    read_le!(read_u8, u8);
    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);

    pub fn read_dvec3(&mut self) -> Result<DVec3, FormatError> {
        Ok(DVec3::new(self.read_f64()?, self.read_f64()?, self.read_f64()?))
    }

    /// Reads a `u32` element count and checks that `count * element_size`
    /// bytes are actually present, so corrupt counts fail before allocating.
    pub fn read_count(&mut self, element_size: usize) -> Result<usize, FormatError> {
        let count = self.read_u32()? as usize;
        let needed = count.saturating_mul(element_size);
        if needed > self.remaining() {
            return Err(FormatError::UnexpectedEof {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let data = [0x69, 0x6d, 0x64, 0x6c, 0x02, 0x00];
        let mut stream = ByteStream::new(&data);

        assert_eq!(stream.read_u32().unwrap(), 0x6c64_6d69);
        assert_eq!(stream.read_u16().unwrap(), 2);
        assert!(stream.is_at_end());
    }

    #[test]
    fn test_read_past_end_does_not_move() {
        let data = [1u8, 2, 3];
        let mut stream = ByteStream::new(&data);

        let err = stream.read_u32().unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { needed: 4, .. }));
        assert_eq!(stream.pos(), 0);
        assert_eq!(stream.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_set_pos_bounds() {
        let data = [0u8; 8];
        let mut stream = ByteStream::new(&data);

        assert!(stream.set_pos(8).is_ok());
        assert!(stream.is_at_end());
        assert!(stream.set_pos(9).is_err());
    }

    #[test]
    fn test_read_count_rejects_oversized() {
        let mut data = Vec::new();
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);
        let mut stream = ByteStream::new(&data);

        assert!(stream.read_count(4).is_err());
    }
}
