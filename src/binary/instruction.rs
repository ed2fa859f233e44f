use super::error::Error::*;
use super::reader::SectionReader;
use super::types::{decode_number_type, impl_byte_size, ValueType};
use anyhow::{bail, Result};
use log::trace;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::Serialize;

/// Shape of the immediate operands that follow an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateKind {
    None,
    BlockType,
    BranchDepth,
    BranchTable,
    FunctionIndex,
    CallIndirect,
    LocalIndex,
    GlobalIndex,
    MemoryArg,
    MemoryReserved,
    I32,
    I64,
    F32,
    F64,
}

macro_rules! opcodes {
    ($($name: ident = $code: literal => $mnemonic: literal, $kind: ident;)*) => {
        // https://webassembly.github.io/spec/core/binary/instructions.html
        #[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $code,)*
        }

        impl Opcode {
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }

            pub fn immediate_kind(&self) -> ImmediateKind {
                match self {
                    $(Self::$name => ImmediateKind::$kind,)*
                }
            }
        }
    };
}

opcodes! {
    Unreachable = 0x00 => "unreachable", None;
    Nop = 0x01 => "nop", None;
    Block = 0x02 => "block", BlockType;
    Loop = 0x03 => "loop", BlockType;
    If = 0x04 => "if", BlockType;
    Else = 0x05 => "else", None;
    End = 0x0B => "end", None;
    Br = 0x0C => "br", BranchDepth;
    BrIf = 0x0D => "br_if", BranchDepth;
    BrTable = 0x0E => "br_table", BranchTable;
    Return = 0x0F => "return", None;
    Call = 0x10 => "call", FunctionIndex;
    CallIndirect = 0x11 => "call_indirect", CallIndirect;
    Drop = 0x1A => "drop", None;
    Select = 0x1B => "select", None;
    LocalGet = 0x20 => "local.get", LocalIndex;
    LocalSet = 0x21 => "local.set", LocalIndex;
    LocalTee = 0x22 => "local.tee", LocalIndex;
    GlobalGet = 0x23 => "global.get", GlobalIndex;
    GlobalSet = 0x24 => "global.set", GlobalIndex;
    I32Load = 0x28 => "i32.load", MemoryArg;
    I64Load = 0x29 => "i64.load", MemoryArg;
    F32Load = 0x2A => "f32.load", MemoryArg;
    F64Load = 0x2B => "f64.load", MemoryArg;
    I32Load8S = 0x2C => "i32.load8_s", MemoryArg;
    I32Load8U = 0x2D => "i32.load8_u", MemoryArg;
    I32Load16S = 0x2E => "i32.load16_s", MemoryArg;
    I32Load16U = 0x2F => "i32.load16_u", MemoryArg;
    I64Load8S = 0x30 => "i64.load8_s", MemoryArg;
    I64Load8U = 0x31 => "i64.load8_u", MemoryArg;
    I64Load16S = 0x32 => "i64.load16_s", MemoryArg;
    I64Load16U = 0x33 => "i64.load16_u", MemoryArg;
    I64Load32S = 0x34 => "i64.load32_s", MemoryArg;
    I64Load32U = 0x35 => "i64.load32_u", MemoryArg;
    I32Store = 0x36 => "i32.store", MemoryArg;
    I64Store = 0x37 => "i64.store", MemoryArg;
    F32Store = 0x38 => "f32.store", MemoryArg;
    F64Store = 0x39 => "f64.store", MemoryArg;
    I32Store8 = 0x3A => "i32.store8", MemoryArg;
    I32Store16 = 0x3B => "i32.store16", MemoryArg;
    I64Store8 = 0x3C => "i64.store8", MemoryArg;
    I64Store16 = 0x3D => "i64.store16", MemoryArg;
    I64Store32 = 0x3E => "i64.store32", MemoryArg;
    MemorySize = 0x3F => "memory.size", MemoryReserved;
    MemoryGrow = 0x40 => "memory.grow", MemoryReserved;
    I32Const = 0x41 => "i32.const", I32;
    I64Const = 0x42 => "i64.const", I64;
    F32Const = 0x43 => "f32.const", F32;
    F64Const = 0x44 => "f64.const", F64;
    I32Eqz = 0x45 => "i32.eqz", None;
    I32Eq = 0x46 => "i32.eq", None;
    I32Ne = 0x47 => "i32.ne", None;
    I32LtS = 0x48 => "i32.lt_s", None;
    I32LtU = 0x49 => "i32.lt_u", None;
    I32GtS = 0x4A => "i32.gt_s", None;
    I32GtU = 0x4B => "i32.gt_u", None;
    I32LeS = 0x4C => "i32.le_s", None;
    I32LeU = 0x4D => "i32.le_u", None;
    I32GeS = 0x4E => "i32.ge_s", None;
    I32GeU = 0x4F => "i32.ge_u", None;
    I64Eqz = 0x50 => "i64.eqz", None;
    I64Eq = 0x51 => "i64.eq", None;
    I64Ne = 0x52 => "i64.ne", None;
    I64LtS = 0x53 => "i64.lt_s", None;
    I64LtU = 0x54 => "i64.lt_u", None;
    I64GtS = 0x55 => "i64.gt_s", None;
    I64GtU = 0x56 => "i64.gt_u", None;
    I64LeS = 0x57 => "i64.le_s", None;
    I64LeU = 0x58 => "i64.le_u", None;
    I64GeS = 0x59 => "i64.ge_s", None;
    I64GeU = 0x5A => "i64.ge_u", None;
    F32Eq = 0x5B => "f32.eq", None;
    F32Ne = 0x5C => "f32.ne", None;
    F32Lt = 0x5D => "f32.lt", None;
    F32Gt = 0x5E => "f32.gt", None;
    F32Le = 0x5F => "f32.le", None;
    F32Ge = 0x60 => "f32.ge", None;
    F64Eq = 0x61 => "f64.eq", None;
    F64Ne = 0x62 => "f64.ne", None;
    F64Lt = 0x63 => "f64.lt", None;
    F64Gt = 0x64 => "f64.gt", None;
    F64Le = 0x65 => "f64.le", None;
    F64Ge = 0x66 => "f64.ge", None;
    I32Clz = 0x67 => "i32.clz", None;
    I32Ctz = 0x68 => "i32.ctz", None;
    I32Popcnt = 0x69 => "i32.popcnt", None;
    I32Add = 0x6A => "i32.add", None;
    I32Sub = 0x6B => "i32.sub", None;
    I32Mul = 0x6C => "i32.mul", None;
    I32DivS = 0x6D => "i32.div_s", None;
    I32DivU = 0x6E => "i32.div_u", None;
    I32RemS = 0x6F => "i32.rem_s", None;
    I32RemU = 0x70 => "i32.rem_u", None;
    I32And = 0x71 => "i32.and", None;
    I32Or = 0x72 => "i32.or", None;
    I32Xor = 0x73 => "i32.xor", None;
    I32Shl = 0x74 => "i32.shl", None;
    I32ShrS = 0x75 => "i32.shr_s", None;
    I32ShrU = 0x76 => "i32.shr_u", None;
    I32Rotl = 0x77 => "i32.rotl", None;
    I32Rotr = 0x78 => "i32.rotr", None;
    I64Clz = 0x79 => "i64.clz", None;
    I64Ctz = 0x7A => "i64.ctz", None;
    I64Popcnt = 0x7B => "i64.popcnt", None;
    I64Add = 0x7C => "i64.add", None;
    I64Sub = 0x7D => "i64.sub", None;
    I64Mul = 0x7E => "i64.mul", None;
    I64DivS = 0x7F => "i64.div_s", None;
    I64DivU = 0x80 => "i64.div_u", None;
    I64RemS = 0x81 => "i64.rem_s", None;
    I64RemU = 0x82 => "i64.rem_u", None;
    I64And = 0x83 => "i64.and", None;
    I64Or = 0x84 => "i64.or", None;
    I64Xor = 0x85 => "i64.xor", None;
    I64Shl = 0x86 => "i64.shl", None;
    I64ShrS = 0x87 => "i64.shr_s", None;
    I64ShrU = 0x88 => "i64.shr_u", None;
    I64Rotl = 0x89 => "i64.rotl", None;
    I64Rotr = 0x8A => "i64.rotr", None;
    F32Abs = 0x8B => "f32.abs", None;
    F32Neg = 0x8C => "f32.neg", None;
    F32Ceil = 0x8D => "f32.ceil", None;
    F32Floor = 0x8E => "f32.floor", None;
    F32Trunc = 0x8F => "f32.trunc", None;
    F32Nearest = 0x90 => "f32.nearest", None;
    F32Sqrt = 0x91 => "f32.sqrt", None;
    F32Add = 0x92 => "f32.add", None;
    F32Sub = 0x93 => "f32.sub", None;
    F32Mul = 0x94 => "f32.mul", None;
    F32Div = 0x95 => "f32.div", None;
    F32Min = 0x96 => "f32.min", None;
    F32Max = 0x97 => "f32.max", None;
    F32Copysign = 0x98 => "f32.copysign", None;
    F64Abs = 0x99 => "f64.abs", None;
    F64Neg = 0x9A => "f64.neg", None;
    F64Ceil = 0x9B => "f64.ceil", None;
    F64Floor = 0x9C => "f64.floor", None;
    F64Trunc = 0x9D => "f64.trunc", None;
    F64Nearest = 0x9E => "f64.nearest", None;
    F64Sqrt = 0x9F => "f64.sqrt", None;
    F64Add = 0xA0 => "f64.add", None;
    F64Sub = 0xA1 => "f64.sub", None;
    F64Mul = 0xA2 => "f64.mul", None;
    F64Div = 0xA3 => "f64.div", None;
    F64Min = 0xA4 => "f64.min", None;
    F64Max = 0xA5 => "f64.max", None;
    F64Copysign = 0xA6 => "f64.copysign", None;
    I32WrapI64 = 0xA7 => "i32.wrap_i64", None;
    I32TruncF32S = 0xA8 => "i32.trunc_f32_s", None;
    I32TruncF32U = 0xA9 => "i32.trunc_f32_u", None;
    I32TruncF64S = 0xAA => "i32.trunc_f64_s", None;
    I32TruncF64U = 0xAB => "i32.trunc_f64_u", None;
    I64ExtendI32S = 0xAC => "i64.extend_i32_s", None;
    I64ExtendI32U = 0xAD => "i64.extend_i32_u", None;
    I64TruncF32S = 0xAE => "i64.trunc_f32_s", None;
    I64TruncF32U = 0xAF => "i64.trunc_f32_u", None;
    I64TruncF64S = 0xB0 => "i64.trunc_f64_s", None;
    I64TruncF64U = 0xB1 => "i64.trunc_f64_u", None;
    F32ConvertI32S = 0xB2 => "f32.convert_i32_s", None;
    F32ConvertI32U = 0xB3 => "f32.convert_i32_u", None;
    F32ConvertI64S = 0xB4 => "f32.convert_i64_s", None;
    F32ConvertI64U = 0xB5 => "f32.convert_i64_u", None;
    F32DemoteF64 = 0xB6 => "f32.demote_f64", None;
    F64ConvertI32S = 0xB7 => "f64.convert_i32_s", None;
    F64ConvertI32U = 0xB8 => "f64.convert_i32_u", None;
    F64ConvertI64S = 0xB9 => "f64.convert_i64_s", None;
    F64ConvertI64U = 0xBA => "f64.convert_i64_u", None;
    F64PromoteF32 = 0xBB => "f64.promote_f32", None;
    I32ReinterpretF32 = 0xBC => "i32.reinterpret_f32", None;
    I64ReinterpretF64 = 0xBD => "i64.reinterpret_f64", None;
    F32ReinterpretI32 = 0xBE => "f32.reinterpret_i32", None;
    F64ReinterpretI64 = 0xBF => "f64.reinterpret_i64", None;
    I32Extend8S = 0xC0 => "i32.extend8_s", None;
    I32Extend16S = 0xC1 => "i32.extend16_s", None;
    I64Extend8S = 0xC2 => "i64.extend8_s", None;
    I64Extend16S = 0xC3 => "i64.extend16_s", None;
    I64Extend32S = 0xC4 => "i64.extend32_s", None;
}

impl Opcode {
    /// log2 of the access width, the alignment assumed when none is written.
    pub fn natural_alignment(&self) -> u32 {
        match self {
            Self::I32Load8S
            | Self::I32Load8U
            | Self::I64Load8S
            | Self::I64Load8U
            | Self::I32Store8
            | Self::I64Store8 => 0,
            Self::I32Load16S
            | Self::I32Load16U
            | Self::I64Load16S
            | Self::I64Load16U
            | Self::I32Store16
            | Self::I64Store16 => 1,
            Self::I64Load | Self::F64Load | Self::I64Store | Self::F64Store => 3,
            _ => 2,
        }
    }
}

// https://webassembly.github.io/spec/core/binary/instructions.html#control-instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockType {
    Empty,
    Value(ValueType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryArg {
    pub align: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Immediate {
    None,
    Block(BlockType),
    Depth(u32),
    BrTable { targets: Vec<u32>, default: u32 },
    Function(u32),
    CallIndirect { type_index: u32 },
    Local(u32),
    Global(u32),
    Memory(MemoryArg),
    I32(i32),
    I64(i64),
    // raw IEEE-754 bits
    F32(u32),
    F64(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub immediate: Immediate,
}

impl Instruction {
    pub fn new(opcode: Opcode, immediate: Immediate) -> Self {
        Self { opcode, immediate }
    }

    pub fn name(&self) -> &'static str {
        self.opcode.mnemonic()
    }

    /// `block`, `loop`, `if` and `else` start a nested scope.
    pub fn opens_block(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::Else
        )
    }
}

/// Sizes of the index spaces an instruction may refer to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpace {
    pub types: u32,
    pub functions: u32,
    pub globals: u32,
    pub locals: u32,
}

fn decode_block_type(reader: &mut SectionReader) -> Result<BlockType> {
    match reader.peek() {
        Some(0x40) => {
            reader.byte()?;
            Ok(BlockType::Empty)
        }
        Some(byte) => match ValueType::try_from(byte) {
            Ok(ty) if ty.is_number() => {
                reader.byte()?;
                Ok(BlockType::Value(ty))
            }
            _ => bail!(InvalidBlockType(byte)),
        },
        // the body ended right after a scope was opened
        None => bail!(UnbalancedBlock(reader.position())),
    }
}

fn decode_reserved(reader: &mut SectionReader) -> Result<()> {
    let byte = reader.byte()?;
    if byte != 0x00 {
        bail!(InvalidReservedByte(byte));
    }
    Ok(())
}

fn check_index(index: u32, bound: u32, err: fn(u32) -> super::error::Error) -> Result<u32> {
    if index >= bound {
        bail!(err(index));
    }
    Ok(index)
}

pub fn decode_instruction(reader: &mut SectionReader, space: &IndexSpace) -> Result<Instruction> {
    let offset = reader.position();
    let byte = reader.byte()?;
    let Some(opcode) = Opcode::from_u8(byte) else {
        bail!(UnknownOpcode(byte, offset));
    };
    trace!("decode opcode: {:?}", opcode);

    let immediate = match opcode.immediate_kind() {
        ImmediateKind::None => Immediate::None,
        ImmediateKind::BlockType => Immediate::Block(decode_block_type(reader)?),
        ImmediateKind::BranchDepth => Immediate::Depth(reader.u32()?),
        ImmediateKind::BranchTable => {
            let count = reader.u32()?;
            let mut targets = vec![];
            for _ in 0..count {
                targets.push(reader.u32()?);
            }
            let default = reader.u32()?;
            Immediate::BrTable { targets, default }
        }
        ImmediateKind::FunctionIndex => {
            let index = check_index(reader.u32()?, space.functions, InvalidFunctionIndex)?;
            Immediate::Function(index)
        }
        // type index followed by the reserved table index
        ImmediateKind::CallIndirect => {
            let type_index = check_index(reader.u32()?, space.types, InvalidTypeIndex)?;
            decode_reserved(reader)?;
            Immediate::CallIndirect { type_index }
        }
        ImmediateKind::LocalIndex => {
            Immediate::Local(check_index(reader.u32()?, space.locals, InvalidLocalIndex)?)
        }
        ImmediateKind::GlobalIndex => {
            Immediate::Global(check_index(reader.u32()?, space.globals, InvalidGlobalIndex)?)
        }
        ImmediateKind::MemoryArg => Immediate::Memory(MemoryArg {
            align: reader.u32()?,
            offset: reader.u32()?,
        }),
        ImmediateKind::MemoryReserved => {
            decode_reserved(reader)?;
            Immediate::None
        }
        ImmediateKind::I32 => Immediate::I32(reader.i32()?),
        ImmediateKind::I64 => Immediate::I64(reader.i64()?),
        ImmediateKind::F32 => Immediate::F32(reader.f32()?),
        ImmediateKind::F64 => Immediate::F64(reader.f64()?),
    };

    Ok(Instruction::new(opcode, immediate))
}

/// Decodes the instruction stream of a function body up to and excluding its
/// final `end`.
///
/// Open scopes are tracked on an explicit stack, so nesting depth costs heap
/// rather than call stack. Every `block`/`loop`/`if` must be closed before the
/// reader runs dry.
pub fn decode_instructions(
    reader: &mut SectionReader,
    space: &IndexSpace,
) -> Result<Vec<Instruction>> {
    let mut code = vec![];
    let mut blocks: Vec<Opcode> = vec![];

    loop {
        if reader.is_end() {
            bail!(UnbalancedBlock(reader.position()));
        }
        let offset = reader.position();
        let inst = decode_instruction(reader, space)?;

        match inst.opcode {
            Opcode::End => {
                if blocks.pop().is_none() {
                    break;
                }
            }
            Opcode::Else => match blocks.last_mut() {
                Some(top) if *top == Opcode::If => *top = Opcode::Else,
                _ => bail!(UnexpectedElse(offset)),
            },
            Opcode::Block | Opcode::Loop | Opcode::If => blocks.push(inst.opcode),
            _ => {}
        }
        code.push(inst);
    }

    Ok(code)
}

// https://webassembly.github.io/spec/core/valid/instructions.html#constant-expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitExpr {
    pub instruction: Instruction,
    pub size: usize,
}

impl_byte_size!(InitExpr);

/// Decodes a single constant instruction followed by `end`. Only imported
/// globals, counted by `globals`, may be read.
pub fn decode_init_expr(reader: &mut SectionReader, globals: u32) -> Result<InitExpr> {
    let start = reader.position();
    let byte = reader.byte()?;
    let instruction = match Opcode::from_u8(byte) {
        Some(Opcode::I32Const) => Instruction::new(Opcode::I32Const, Immediate::I32(reader.i32()?)),
        Some(Opcode::I64Const) => Instruction::new(Opcode::I64Const, Immediate::I64(reader.i64()?)),
        Some(Opcode::F32Const) => Instruction::new(Opcode::F32Const, Immediate::F32(reader.f32()?)),
        Some(Opcode::F64Const) => Instruction::new(Opcode::F64Const, Immediate::F64(reader.f64()?)),
        Some(Opcode::GlobalGet) => {
            let index = check_index(reader.u32()?, globals, InvalidGlobalIndex)?;
            Instruction::new(Opcode::GlobalGet, Immediate::Global(index))
        }
        _ => bail!(InvalidInitExpr(byte)),
    };

    let end = reader.byte()?;
    if Opcode::from_u8(end) != Some(Opcode::End) {
        bail!(InvalidInitExpr(end));
    }

    Ok(InitExpr {
        instruction,
        size: reader.position() - start,
    })
}

/// Locals are read one declaration group at a time: `(count, type)`.
pub fn decode_local(reader: &mut SectionReader) -> Result<(u32, ValueType)> {
    let count = reader.u32()?;
    let value_type = decode_number_type(reader)?;
    Ok((count, value_type))
}
