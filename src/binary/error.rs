use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed varint at offset {0:#x}")]
    MalformedVarint(usize),
    #[error("integer at offset {0:#x} does not fit in {1} bits")]
    IntegerOverflow(usize, u32),
    #[error("unexpected end of input at offset {0:#x}")]
    UnexpectedEof(usize),
    #[error("invalid binary magic or version")]
    InvalidMagicOrVersion,
    #[error("unknown section id: {0}")]
    UnknownSection(u8),
    #[error("section {0} appears more than once")]
    DuplicateSection(u8),
    #[error("section {0} is out of order")]
    SectionOutOfOrder(u8),
    #[error("unknown type code: {0:#04x}")]
    UnknownTypeCode(u8),
    #[error("unknown opcode {0:#04x} at offset {1:#x}")]
    UnknownOpcode(u8, usize),
    #[error("unknown external kind: {0:#04x}")]
    UnknownExternalKind(u8),
    #[error("invalid func type form: {0:#04x}")]
    InvalidFuncForm(u8),
    #[error("invalid return count: {0}, at most one result is allowed")]
    InvalidReturnCount(u32),
    #[error("invalid mutability flag: {0:#04x}")]
    InvalidMutability(u8),
    #[error("invalid resizable limits flag: {0:#04x}")]
    InvalidLimitsFlag(u8),
    #[error("invalid table element type: {0:#04x}")]
    InvalidElemType(u8),
    #[error("invalid block type: {0:#04x}")]
    InvalidBlockType(u8),
    #[error("invalid init expr opcode: {0:#04x}")]
    InvalidInitExpr(u8),
    #[error("reserved byte must be zero, got {0:#04x}")]
    InvalidReservedByte(u8),
    #[error("type section is required but missing")]
    MissingTypeSection,
    #[error("function section is required but missing")]
    MissingFunctionSection,
    #[error("code section is required but missing")]
    MissingCodeSection,
    #[error("function section declares {0} functions but code section has {1} bodies")]
    FunctionCountMismatch(usize, usize),
    #[error("invalid function index: {0}")]
    InvalidFunctionIndex(u32),
    #[error("invalid type index: {0}")]
    InvalidTypeIndex(u32),
    #[error("invalid global index: {0}")]
    InvalidGlobalIndex(u32),
    #[error("invalid table index: {0}")]
    InvalidTableIndex(u32),
    #[error("invalid memory index: {0}")]
    InvalidMemoryIndex(u32),
    #[error("invalid local index: {0}")]
    InvalidLocalIndex(u32),
    #[error("too many locals: {0}")]
    TooManyLocals(u64),
    #[error("block opened without matching end before offset {0:#x}")]
    UnbalancedBlock(usize),
    #[error("else without matching if at offset {0:#x}")]
    UnexpectedElse(usize),
    #[error("{1} unread bytes left at offset {0:#x}")]
    TrailingBytes(usize, usize),
    #[error("invalid utf-8 string at offset {0:#x}")]
    InvalidUtf8(usize),
}

/// Finds the decode error anywhere in a context chain.
#[cfg(test)]
pub(crate) fn kind(err: &anyhow::Error) -> Option<&Error> {
    err.chain().find_map(|e| e.downcast_ref::<Error>())
}
