//! Fully-resident, seekable byte stream used by the format parsers.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("seek to {target} is outside a stream of {len} bytes")]
    SeekOutOfBounds { target: usize, len: usize },
}

/// Little-endian cursor over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Borrows the next `len` bytes and advances past them.
    pub fn read(&mut self, len: usize) -> Result<&'a [u8], StreamError> {
        if len > self.remaining() {
            return Err(StreamError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, StreamError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, StreamError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads a NUL-terminated string and advances past the terminator.
    pub fn read_cstr(&mut self) -> Result<&'a [u8], StreamError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(StreamError::UnexpectedEof {
                needed: rest.len() + 1,
                remaining: rest.len(),
            })?;
        let bytes = &rest[..len];
        self.pos += len + 1;
        Ok(bytes)
    }

    /// Moves the cursor to an absolute offset. The end of the stream is a
    /// valid target.
    pub fn seek(&mut self, target: usize) -> Result<(), StreamError> {
        if target > self.data.len() {
            return Err(StreamError::SeekOutOfBounds {
                target,
                len: self.data.len(),
            });
        }
        self.pos = target;
        Ok(())
    }

    /// Skips `len` bytes relative to the current position.
    pub fn skip(&mut self, len: usize) -> Result<(), StreamError> {
        let target = self
            .pos
            .checked_add(len)
            .ok_or(StreamError::SeekOutOfBounds {
                target: usize::MAX,
                len: self.data.len(),
            })?;
        self.seek(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let mut stream = ByteStream::new(&[0x03, 0x00, 0x44, 0xac, 0x00, 0x00]);
        assert_eq!(stream.read_u16_le().unwrap(), 3);
        assert_eq!(stream.read_u32_le().unwrap(), 44100);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn reads_big_endian_and_strings() {
        let mut stream = ByteStream::new(&[0x00, 0x32, 0x00, 0x1e, 0x84, 0x80, b'h', b'i', 0, b'x']);
        assert_eq!(stream.read_u16_be().unwrap(), 50);
        assert_eq!(stream.read_u32_be().unwrap(), 2_000_000);
        assert_eq!(stream.read_cstr().unwrap(), b"hi");
        assert!(stream.read_cstr().is_err());
        assert_eq!(stream.remaining(), 1);
    }

    #[test]
    fn short_read_reports_eof() {
        let mut stream = ByteStream::new(&[1, 2]);
        assert_eq!(
            stream.read_u32_le(),
            Err(StreamError::UnexpectedEof {
                needed: 4,
                remaining: 2
            })
        );
        // A failed read does not move the cursor.
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn seek_bounds() {
        let mut stream = ByteStream::new(&[0; 8]);
        assert!(stream.seek(8).is_ok());
        assert!(stream.seek(9).is_err());
        stream.seek(2).unwrap();
        assert!(stream.skip(7).is_err());
        assert!(stream.skip(6).is_ok());
    }
}
