use super::error::Error::*;
use super::reader::SectionReader;
use anyhow::{bail, Result};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::Serialize;
use std::fmt::{self, Display};

/// Number of bytes an entity occupied in the binary.
///
/// Entities carry no absolute offsets, so decoding entity `n + 1` starts
/// exactly `size()` bytes after entity `n`.
pub trait ByteSize {
    fn size(&self) -> usize;
}

macro_rules! impl_byte_size {
    ($($ty: ty),*) => {
        $(
            impl $crate::binary::types::ByteSize for $ty {
                fn size(&self) -> usize {
                    self.size
                }
            }
        )*
    };
}
pub(crate) use impl_byte_size;

// https://webassembly.github.io/spec/core/binary/types.html#value-types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize)]
#[repr(u8)]
pub enum ValueType {
    I32 = 0x7F,
    I64 = 0x7E,
    F32 = 0x7D,
    F64 = 0x7C,
    AnyFunc = 0x70,
    Func = 0x60,
    PseudoType = 0x40,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::AnyFunc => "anyfunc",
            Self::Func => "func",
            Self::PseudoType => "pseudo_type",
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::F32 | Self::F64)
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ValueType {
    type Error = crate::binary::error::Error;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        ValueType::from_u8(code).ok_or(UnknownTypeCode(code))
    }
}

// https://webassembly.github.io/spec/core/binary/types.html#function-types
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum ElemType {
    FuncRef = 0x70,
}

// https://webassembly.github.io/spec/core/binary/types.html#limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableType {
    pub elem_type: ElemType,
    pub limits: Limits,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryType {
    pub limits: Limits,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum Mutability {
    Const = 0x00,
    Var = 0x01,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalType {
    pub content_type: ValueType,
    pub mutability: Mutability,
    pub size: usize,
}

impl_byte_size!(FuncType, Limits, TableType, MemoryType, GlobalType);

pub fn decode_value_type(reader: &mut SectionReader) -> Result<ValueType> {
    let code = reader.byte()?;
    Ok(ValueType::try_from(code)?)
}

/// Decodes a type usable for params, results, locals and globals.
pub fn decode_number_type(reader: &mut SectionReader) -> Result<ValueType> {
    let code = reader.byte()?;
    match ValueType::try_from(code)? {
        ty if ty.is_number() => Ok(ty),
        _ => bail!(UnknownTypeCode(code)),
    }
}

pub fn decode_func_type(reader: &mut SectionReader) -> Result<FuncType> {
    let start = reader.position();
    let form = reader.byte()?;
    if ValueType::from_u8(form) != Some(ValueType::Func) {
        bail!(InvalidFuncForm(form));
    }

    let mut func = FuncType::default();
    let count = reader.u32()?;
    for _ in 0..count {
        func.params.push(decode_number_type(reader)?);
    }

    let count = reader.u32()?;
    if count > 1 {
        bail!(InvalidReturnCount(count));
    }
    for _ in 0..count {
        func.results.push(decode_number_type(reader)?);
    }

    func.size = reader.position() - start;
    Ok(func)
}

pub fn decode_limits(reader: &mut SectionReader) -> Result<Limits> {
    let start = reader.position();
    let flag = reader.byte()?;
    let min = reader.u32()?;
    let max = match flag {
        0x00 => None,
        0x01 => Some(reader.u32()?),
        _ => bail!(InvalidLimitsFlag(flag)),
    };
    Ok(Limits {
        min,
        max,
        size: reader.position() - start,
    })
}

pub fn decode_table_type(reader: &mut SectionReader) -> Result<TableType> {
    let start = reader.position();
    let byte = reader.byte()?;
    let Some(elem_type) = ElemType::from_u8(byte) else {
        bail!(InvalidElemType(byte));
    };
    let limits = decode_limits(reader)?;
    Ok(TableType {
        elem_type,
        limits,
        size: reader.position() - start,
    })
}

pub fn decode_memory_type(reader: &mut SectionReader) -> Result<MemoryType> {
    let limits = decode_limits(reader)?;
    let size = limits.size;
    Ok(MemoryType { limits, size })
}

pub fn decode_global_type(reader: &mut SectionReader) -> Result<GlobalType> {
    let start = reader.position();
    let content_type = decode_number_type(reader)?;
    let byte = reader.byte()?;
    let Some(mutability) = Mutability::from_u8(byte) else {
        bail!(InvalidMutability(byte));
    };
    Ok(GlobalType {
        content_type,
        mutability,
        size: reader.position() - start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::error::Error;

    fn reader(bytes: &[u8]) -> SectionReader {
        SectionReader::from_slice(bytes)
    }

    #[test]
    fn test_decode_func_type() -> Result<()> {
        let func = decode_func_type(&mut reader(&[0x60, 0x01, 0x7C, 0x01, 0x7C]))?;
        assert_eq!(func.params, vec![ValueType::F64]);
        assert_eq!(func.results, vec![ValueType::F64]);
        assert_eq!(func.size(), 5);

        let func = decode_func_type(&mut reader(&[0x60, 0x00, 0x00]))?;
        assert_eq!(func, FuncType { size: 3, ..FuncType::default() });
        Ok(())
    }

    #[test]
    fn test_decode_func_type_rejects_bad_form_and_results() {
        let err = decode_func_type(&mut reader(&[0x61, 0x00, 0x00])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&InvalidFuncForm(0x61)));

        let err = decode_func_type(&mut reader(&[0x60, 0x00, 0x02, 0x7F, 0x7F])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&InvalidReturnCount(2)));
    }

    #[test]
    fn test_unknown_type_code() {
        let err = decode_value_type(&mut reader(&[0x11])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&UnknownTypeCode(0x11)));

        // anyfunc is a known code but not a valid parameter type
        let err = decode_func_type(&mut reader(&[0x60, 0x01, 0x70, 0x00])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&UnknownTypeCode(0x70)));
    }

    #[test]
    fn test_value_type_names() -> Result<()> {
        let names: Vec<_> = [0x7F, 0x7E, 0x7D, 0x7C, 0x70, 0x60, 0x40]
            .into_iter()
            .map(|code| ValueType::try_from(code).map(|ty| ty.to_string()))
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(
            names,
            vec!["i32", "i64", "f32", "f64", "anyfunc", "func", "pseudo_type"]
        );
        Ok(())
    }

    #[test]
    fn test_decode_limits() -> Result<()> {
        let limits = decode_limits(&mut reader(&[0x00, 0x01]))?;
        assert_eq!((limits.min, limits.max, limits.size()), (1, None, 2));

        let limits = decode_limits(&mut reader(&[0x01, 0x01, 0x80, 0x02]))?;
        assert_eq!((limits.min, limits.max, limits.size()), (1, Some(256), 4));

        let err = decode_limits(&mut reader(&[0x02, 0x01])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&InvalidLimitsFlag(0x02)));
        Ok(())
    }

    #[test]
    fn test_decode_table_and_memory_type() -> Result<()> {
        let table = decode_table_type(&mut reader(&[0x70, 0x01, 0x0A, 0x14]))?;
        assert_eq!(table.elem_type, ElemType::FuncRef);
        assert_eq!((table.limits.min, table.limits.max), (10, Some(20)));
        assert_eq!(table.size(), 4);

        let err = decode_table_type(&mut reader(&[0x7F, 0x00, 0x00])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&InvalidElemType(0x7F)));

        let memory = decode_memory_type(&mut reader(&[0x00, 0x02]))?;
        assert_eq!((memory.limits.min, memory.size()), (2, 2));
        Ok(())
    }

    #[test]
    fn test_decode_global_type() -> Result<()> {
        let global = decode_global_type(&mut reader(&[0x7F, 0x01]))?;
        assert_eq!(global.content_type, ValueType::I32);
        assert_eq!(global.mutability, Mutability::Var);
        assert_eq!(global.size(), 2);

        let err = decode_global_type(&mut reader(&[0x7E, 0x02])).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&InvalidMutability(0x02)));
        Ok(())
    }
}
