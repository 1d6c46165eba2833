//! Bounds-checked big-endian cursor over a class-file buffer.

use super::{ClassFileError, ClassFileResult};

/// Big-endian reader that tracks its absolute offset in the underlying buffer.
///
/// Every read names the structure being read so truncation errors point at
/// the field that was cut short.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader positioned at `pos`.
    #[must_use]
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current absolute offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current offset.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, needed: usize, context: &'static str) -> ClassFileResult<&'a [u8]> {
        let available = self.remaining();
        if available < needed {
            return Err(ClassFileError::Truncated {
                context,
                offset: self.pos,
                needed,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    pub fn u8(&mut self, context: &'static str) -> ClassFileResult<u8> {
        Ok(self.take(1, context)?[0])
    }

    pub fn u16(&mut self, context: &'static str) -> ClassFileResult<u16> {
        let b = self.take(2, context)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self, context: &'static str) -> ClassFileResult<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self, context: &'static str) -> ClassFileResult<i32> {
        let b = self.take(4, context)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Borrow the next `len` bytes.
    pub fn bytes(&mut self, len: usize, context: &'static str) -> ClassFileResult<&'a [u8]> {
        self.take(len, context)
    }

    /// Advance past `len` bytes.
    pub fn skip(&mut self, len: usize, context: &'static str) -> ClassFileResult<()> {
        self.take(len, context).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x41, 0xFF];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.u32("magic").unwrap(), 0xCAFE_BABE);
        assert_eq!(r.u16("version").unwrap(), 0x41);
        assert_eq!(r.u8("tail").unwrap(), 0xFF);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncation_reports_context_and_offset() {
        let data = [0x00, 0x01, 0x02];
        let mut r = ByteReader::at(&data, 1);
        let err = r.u32("code_length").unwrap_err();
        assert_eq!(
            err,
            ClassFileError::Truncated {
                context: "code_length",
                offset: 1,
                needed: 4,
                available: 2,
            }
        );
        // A failed read does not move the cursor.
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn signed_reads() {
        let data = (-12_i32).to_be_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.i32("offset").unwrap(), -12);
    }
}
