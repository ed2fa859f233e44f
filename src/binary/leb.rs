use super::error::Error;
use anyhow::{bail, Result};

// https://webassembly.github.io/spec/core/binary/values.html#integers
//
// All functions here are pure: they read from an immutable buffer at `offset`
// and return the decoded value together with the number of bytes consumed.

fn leb_error(err: leb128::read::Error, offset: usize) -> Error {
    match err {
        leb128::read::Error::IoError(_) => Error::MalformedVarint(offset),
        leb128::read::Error::Overflow => Error::IntegerOverflow(offset, 64),
    }
}

pub fn decode_unsigned(bytes: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut rest = bytes.get(offset..).unwrap_or_default();
    let before = rest.len();
    let value = leb128::read::unsigned(&mut rest).map_err(|e| leb_error(e, offset))?;
    Ok((value, before - rest.len()))
}

pub fn decode_signed(bytes: &[u8], offset: usize, bit_width: u32) -> Result<(i64, usize)> {
    let mut rest = bytes.get(offset..).unwrap_or_default();
    let before = rest.len();
    let value = leb128::read::signed(&mut rest).map_err(|e| leb_error(e, offset))?;
    if bit_width < 64 {
        let min = -(1i64 << (bit_width - 1));
        let max = (1i64 << (bit_width - 1)) - 1;
        if value < min || value > max {
            bail!(Error::IntegerOverflow(offset, bit_width));
        }
    }
    Ok((value, before - rest.len()))
}

pub fn decode_u32(bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
    let (value, len) = decode_unsigned(bytes, offset)?;
    let value = u32::try_from(value).map_err(|_| Error::IntegerOverflow(offset, 32))?;
    Ok((value, len))
}

pub fn decode_i32(bytes: &[u8], offset: usize) -> Result<(i32, usize)> {
    let (value, len) = decode_signed(bytes, offset, 32)?;
    Ok((value as i32, len))
}

pub fn decode_i64(bytes: &[u8], offset: usize) -> Result<(i64, usize)> {
    decode_signed(bytes, offset, 64)
}

fn fixed<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    let buf = bytes
        .get(offset..offset + N)
        .ok_or(Error::UnexpectedEof(offset))?;
    let mut out = [0u8; N];
    out.copy_from_slice(buf);
    Ok(out)
}

// https://www.w3.org/TR/wasm-core-1/#floating-point%E2%91%A4
// Floats are kept as raw bits so NaN payloads survive untouched.
pub fn decode_f32_bits(bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
    Ok((u32::from_le_bytes(fixed::<4>(bytes, offset)?), 4))
}

pub fn decode_f64_bits(bytes: &[u8], offset: usize) -> Result<(u64, usize)> {
    Ok((u64::from_le_bytes(fixed::<8>(bytes, offset)?), 8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::error::kind;
    use rand::Rng;

    #[test]
    fn test_decode_unsigned_with_padding() -> Result<()> {
        assert_eq!(decode_unsigned(&[0xE4, 0x00], 0)?, (100, 2));
        assert_eq!(decode_unsigned(&[0x02], 0)?, (2, 1));
        assert_eq!(decode_unsigned(&[0xFF, 0xE5, 0x8E, 0x26], 1)?, (624485, 3));
        Ok(())
    }

    #[test]
    fn test_decode_signed() -> Result<()> {
        assert_eq!(decode_i32(&[0x7F], 0)?, (-1, 1));
        assert_eq!(decode_i32(&[0xC0, 0xBB, 0x78], 0)?, (-123456, 3));
        assert_eq!(decode_i32(&[0x3F], 0)?, (63, 1));
        assert_eq!(decode_i32(&[0x80, 0x7F], 0)?, (-128, 2));
        assert_eq!(decode_i64(&[0x80, 0x80, 0x80, 0x80, 0x78], 0)?, (-2147483648, 5));
        Ok(())
    }

    #[test]
    fn test_decode_runs_past_buffer() {
        let err = decode_unsigned(&[0x80, 0x80], 0).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::MalformedVarint(0)));

        let err = decode_i32(&[0x01, 0xFF], 1).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::MalformedVarint(1)));

        let err = decode_unsigned(&[0x01], 4).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::MalformedVarint(4)));
    }

    #[test]
    fn test_decode_overflowing_width() {
        // 2^32 does not fit in u32
        let err = decode_u32(&[0x80, 0x80, 0x80, 0x80, 0x10], 0).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::IntegerOverflow(0, 32)));

        // 2^31 does not fit in i32
        let err = decode_i32(&[0x80, 0x80, 0x80, 0x80, 0x08], 0).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::IntegerOverflow(0, 32)));
    }

    #[test]
    fn test_unsigned_round_trip() -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut values = vec![0u32, 1, 127, 128, 16383, 16384, u32::MAX];
        values.extend((0..1000).map(|_| rng.gen::<u32>()));
        for value in values {
            let mut buf = vec![];
            leb128::write::unsigned(&mut buf, value as u64)?;
            assert_eq!(decode_u32(&buf, 0)?, (value, buf.len()));
        }
        Ok(())
    }

    #[test]
    fn test_signed_round_trip() -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut values = vec![0i32, -1, 63, 64, -64, -65, i32::MIN, i32::MAX];
        values.extend((0..1000).map(|_| rng.gen::<i32>()));
        for value in values {
            let mut buf = vec![];
            leb128::write::signed(&mut buf, value as i64)?;
            assert_eq!(decode_i32(&buf, 0)?, (value, buf.len()));
        }
        Ok(())
    }

    #[test]
    fn test_float_bits_are_preserved() -> Result<()> {
        let nan = 0x7FA0_0001u32;
        assert_eq!(decode_f32_bits(&nan.to_le_bytes(), 0)?, (nan, 4));
        let bytes = 1.5f64.to_bits().to_le_bytes();
        assert_eq!(decode_f64_bits(&bytes, 0)?, (1.5f64.to_bits(), 8));

        let err = decode_f64_bits(&[0; 7], 0).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::UnexpectedEof(0)));
        Ok(())
    }
}
