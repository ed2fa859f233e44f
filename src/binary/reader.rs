use super::error::Error;
use super::leb;
use anyhow::{bail, Result};

/// A bounded cursor over a `[start, end)` window of the module buffer.
///
/// Every entity is decoded through a reader view rather than a copy of its
/// bytes, so offsets reported in errors are absolute offsets into the input.
#[derive(Debug, Clone)]
pub struct SectionReader<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> SectionReader<'a> {
    pub fn new(buf: &'a [u8], start: usize, end: usize) -> Self {
        let end = end.min(buf.len());
        Self {
            buf,
            pos: start.min(end),
            end,
        }
    }

    /// A reader over the whole of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self::new(buf, 0, buf.len())
    }

    fn window(&self) -> &'a [u8] {
        &self.buf[..self.end]
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Splits off a sub-reader for the next `len` bytes and advances past them.
    pub fn sub_reader(&mut self, len: usize) -> Result<SectionReader<'a>> {
        if len > self.remaining() {
            bail!(Error::UnexpectedEof(self.pos));
        }
        let sub = SectionReader::new(self.buf, self.pos, self.pos + len);
        self.pos += len;
        Ok(sub)
    }

    pub fn byte(&mut self) -> Result<u8> {
        if self.is_end() {
            bail!(Error::UnexpectedEof(self.pos));
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    pub fn peek(&self) -> Option<u8> {
        (!self.is_end()).then(|| self.buf[self.pos])
    }

    pub fn u32(&mut self) -> Result<u32> {
        let (num, len) = leb::decode_u32(self.window(), self.pos)?;
        self.pos += len;
        Ok(num)
    }

    pub fn i32(&mut self) -> Result<i32> {
        let (num, len) = leb::decode_i32(self.window(), self.pos)?;
        self.pos += len;
        Ok(num)
    }

    pub fn i64(&mut self) -> Result<i64> {
        let (num, len) = leb::decode_i64(self.window(), self.pos)?;
        self.pos += len;
        Ok(num)
    }

    pub fn f32(&mut self) -> Result<u32> {
        let (bits, len) = leb::decode_f32_bits(self.window(), self.pos)?;
        self.pos += len;
        Ok(bits)
    }

    pub fn f64(&mut self) -> Result<u64> {
        let (bits, len) = leb::decode_f64_bits(self.window(), self.pos)?;
        self.pos += len;
        Ok(bits)
    }

    pub fn bytes(&mut self, num: usize) -> Result<&'a [u8]> {
        if num > self.remaining() {
            bail!(Error::UnexpectedEof(self.pos));
        }
        let bytes = &self.buf[self.pos..self.pos + num];
        self.pos += num;
        Ok(bytes)
    }

    pub fn string(&mut self, size: usize) -> Result<String> {
        let start = self.pos;
        let bytes = self.bytes(size)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => bail!(Error::InvalidUtf8(start)),
        }
    }

    /// Fails unless the window has been consumed exactly.
    pub fn finish(&self) -> Result<()> {
        if !self.is_end() {
            bail!(Error::TrailingBytes(self.pos, self.remaining()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_is_bounded_by_window() -> Result<()> {
        let buf = [0x01, 0x02, 0x03, 0x04];
        let mut reader = SectionReader::new(&buf, 1, 3);
        assert_eq!(reader.byte()?, 0x02);
        assert_eq!(reader.byte()?, 0x03);
        let err = reader.byte().unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::UnexpectedEof(3)));
        Ok(())
    }

    #[test]
    fn test_varint_cannot_cross_window() {
        // the continuation byte would be satisfied by buf[2] if the window leaked
        let buf = [0x00, 0x80, 0x01];
        let mut reader = SectionReader::new(&buf, 1, 2);
        let err = reader.u32().unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::MalformedVarint(1)));
    }

    #[test]
    fn test_string() -> Result<()> {
        let buf = [b'h', b'o', b's', b't', 0xC3, 0x28];
        let mut reader = SectionReader::from_slice(&buf);
        assert_eq!(reader.string(4)?, "host");
        let err = reader.string(2).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::InvalidUtf8(4)));
        Ok(())
    }

    #[test]
    fn test_sub_reader_and_finish() -> Result<()> {
        let buf = [0x02, 0xAA, 0xBB, 0xCC];
        let mut reader = SectionReader::from_slice(&buf);
        let len = reader.u32()? as usize;
        let mut sub = reader.sub_reader(len)?;
        assert_eq!(sub.bytes(2)?, &[0xAA, 0xBB]);
        sub.finish()?;
        assert_eq!(reader.position(), 3);
        let err = reader.finish().unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::TrailingBytes(3, 1)));
        Ok(())
    }
}
