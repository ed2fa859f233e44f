use super::error::Error::*;
use super::instruction::{
    decode_init_expr, decode_instructions, decode_local, IndexSpace, InitExpr, Instruction,
};
use super::module::Module;
use super::reader::SectionReader;
use super::types::*;
use anyhow::{bail, Context, Result};
use log::debug;
use num_derive::FromPrimitive;
use serde::Serialize;

// printing every local by name gets unwieldy past this point
pub const MAX_LOCALS: u64 = 50000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum SectionID {
    Custom = 0x00,
    Type = 0x01,
    Import = 0x02,
    Function = 0x03,
    Table = 0x04,
    Memory = 0x05,
    Global = 0x06,
    Export = 0x07,
    Start = 0x08,
    Element = 0x09,
    Code = 0x0a,
    Data = 0x0b,
}

/// A framed section whose entries have not been decoded yet.
#[derive(Debug, Clone)]
pub struct RawSection<'a> {
    pub id: SectionID,
    /// declared size of everything after the size field
    pub size: u32,
    /// declared entry count; the function index for the start section
    pub count: u32,
    pub payload: SectionReader<'a>,
}

// https://webassembly.github.io/spec/core/binary/modules.html#import-section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportKind {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    pub module_name: String,
    pub field_name: String,
    pub kind: ImportKind,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExportDesc {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Global {
    pub global_type: GlobalType,
    pub init_expr: InitExpr,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub table_index: u32,
    pub offset: InitExpr,
    pub init: Vec<u32>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Data {
    pub memory_index: u32,
    pub offset: InitExpr,
    pub init: Vec<u8>,
    pub size: usize,
}

// https://webassembly.github.io/spec/core/binary/modules.html#binary-codesec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionLocal {
    pub type_count: u32,
    pub value_type: ValueType,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionBody {
    /// size declared in front of the body
    pub body_size: u32,
    pub locals: Vec<FunctionLocal>,
    pub code: Vec<Instruction>,
    pub size: usize,
}

/// A module-defined function: a code body paired with its declared signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub index: u32,
    pub type_index: u32,
    pub func_type: FuncType,
    pub body: FunctionBody,
}

impl_byte_size!(Import, Export, Global, Element, Data, FunctionBody);

// https://webassembly.github.io/spec/core/binary/modules.html#sections
#[derive(Debug)]
pub enum Section {
    Type(Vec<FuncType>),
    Import(Vec<Import>),
    Function(Vec<u32>),
    Table(Vec<TableType>),
    Memory(Vec<MemoryType>),
    Global(Vec<Global>),
    Export(Vec<Export>),
    Start(u32),
    Element(Vec<Element>),
    Code(Vec<Function>),
    Data(Vec<Data>),
}

/// Decodes one framed section. `module` holds every section that precedes it
/// in binary order and is consulted for cross references.
pub fn decode(section: &RawSection, module: &Module) -> Result<Section> {
    let mut reader = section.payload.clone();
    let count = section.count;
    debug!("decode {:?} section with {} entries", section.id, count);
    let decoded = match section.id {
        SectionID::Type => Section::Type(decode_entries(&mut reader, count, decode_func_type)?),
        SectionID::Import => decode_import_section(&mut reader, count, module)?,
        SectionID::Function => decode_function_section(&mut reader, count, module)?,
        SectionID::Table => Section::Table(decode_entries(&mut reader, count, decode_table_type)?),
        SectionID::Memory => {
            Section::Memory(decode_entries(&mut reader, count, decode_memory_type)?)
        }
        SectionID::Global => decode_global_section(&mut reader, count, module)?,
        SectionID::Export => decode_export_section(&mut reader, count, module)?,
        SectionID::Start => decode_start_section(count, module)?,
        SectionID::Element => decode_element_section(&mut reader, count, module)?,
        SectionID::Code => decode_code_section(&mut reader, count, module)?,
        SectionID::Data => decode_data_section(&mut reader, count, module)?,
        SectionID::Custom => bail!("custom sections carry no entries"),
    };
    reader.finish()?;
    Ok(decoded)
}

fn decode_entries<'a, T>(
    reader: &mut SectionReader<'a>,
    count: u32,
    mut f: impl FnMut(&mut SectionReader<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut entries = vec![];
    for i in 0..count {
        let entry = f(reader).with_context(|| format!("failed to decode entry {}", i))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn decode_import_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    let imports = decode_entries(reader, count, |reader| decode_import(reader, module))?;
    Ok(Section::Import(imports))
}

fn decode_import(reader: &mut SectionReader, module: &Module) -> Result<Import> {
    let start = reader.position();

    // module name
    let size = reader.u32()? as usize;
    let module_name = reader.string(size)?;

    // field name
    let size = reader.u32()? as usize;
    let field_name = reader.string(size)?;

    let import_kind = reader.byte()?;
    let kind = match import_kind {
        0x00 => {
            let types = module.type_section.as_ref().ok_or(MissingTypeSection)?;
            let type_index = reader.u32()?;
            if type_index as usize >= types.len() {
                bail!(InvalidTypeIndex(type_index));
            }
            ImportKind::Func(type_index)
        }
        0x01 => ImportKind::Table(decode_table_type(reader)?),
        0x02 => ImportKind::Memory(decode_memory_type(reader)?),
        0x03 => ImportKind::Global(decode_global_type(reader)?),
        _ => bail!(UnknownExternalKind(import_kind)),
    };

    Ok(Import {
        module_name,
        field_name,
        kind,
        size: reader.position() - start,
    })
}

fn decode_function_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    let num_types = module.num_types();
    let func_idx = decode_entries(reader, count, |reader| {
        if module.type_section.is_none() {
            bail!(MissingTypeSection);
        }
        let index = reader.u32()?;
        if index >= num_types {
            bail!(InvalidTypeIndex(index));
        }
        Ok(index)
    })?;
    Ok(Section::Function(func_idx))
}

fn decode_global_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    // init exprs may only read imported globals
    let imported = module.imported_globals();
    let globals = decode_entries(reader, count, |reader| {
        let start = reader.position();
        let global_type = decode_global_type(reader)?;
        let init_expr = decode_init_expr(reader, imported)?;
        Ok(Global {
            global_type,
            init_expr,
            size: reader.position() - start,
        })
    })?;
    Ok(Section::Global(globals))
}

fn decode_export_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    let exports = decode_entries(reader, count, |reader| {
        let start = reader.position();
        let size = reader.u32()? as usize;
        let name = reader.string(size)?;
        let export_kind = reader.byte()?;
        let idx = reader.u32()?;
        let desc = match export_kind {
            0x00 => {
                if module.type_section.is_none() {
                    bail!(MissingTypeSection);
                }
                if idx >= module.num_functions() {
                    bail!(InvalidFunctionIndex(idx));
                }
                ExportDesc::Func(idx)
            }
            0x01 => {
                if idx >= module.num_tables() {
                    bail!(InvalidTableIndex(idx));
                }
                ExportDesc::Table(idx)
            }
            0x02 => {
                if idx >= module.num_memories() {
                    bail!(InvalidMemoryIndex(idx));
                }
                ExportDesc::Memory(idx)
            }
            0x03 => {
                if idx >= module.num_globals() {
                    bail!(InvalidGlobalIndex(idx));
                }
                ExportDesc::Global(idx)
            }
            _ => bail!(UnknownExternalKind(export_kind)),
        };
        Ok(Export {
            name,
            desc,
            size: reader.position() - start,
        })
    })?;
    Ok(Section::Export(exports))
}

// The start section has no entry list: its count field is the function index.
fn decode_start_section(index: u32, module: &Module) -> Result<Section> {
    if index >= module.num_functions() {
        bail!(InvalidFunctionIndex(index));
    }
    Ok(Section::Start(index))
}

fn decode_element_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    let imported = module.imported_globals();
    let num_functions = module.num_functions();
    let elements = decode_entries(reader, count, |reader| {
        let start = reader.position();
        // MVP has a single table, which the text form leaves implicit
        let table_index = reader.u32()?;
        if table_index != 0 {
            bail!(InvalidTableIndex(table_index));
        }
        let offset = decode_init_expr(reader, imported)?;
        let count = reader.u32()?;
        let mut init = vec![];
        for _ in 0..count {
            let index = reader.u32()?;
            if index >= num_functions {
                bail!(InvalidFunctionIndex(index));
            }
            init.push(index);
        }
        Ok(Element {
            table_index,
            offset,
            init,
            size: reader.position() - start,
        })
    })?;
    Ok(Section::Element(elements))
}

fn decode_data_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    let imported = module.imported_globals();
    let data = decode_entries(reader, count, |reader| {
        let start = reader.position();
        let memory_index = reader.u32()?;
        if memory_index != 0 {
            bail!(InvalidMemoryIndex(memory_index));
        }
        let offset = decode_init_expr(reader, imported)?;
        let size = reader.u32()? as usize;
        let init = reader.bytes(size)?.to_vec();
        Ok(Data {
            memory_index,
            offset,
            init,
            size: reader.position() - start,
        })
    })?;
    Ok(Section::Data(data))
}

fn decode_code_section(
    reader: &mut SectionReader,
    count: u32,
    module: &Module,
) -> Result<Section> {
    let types = module.type_section.as_ref().ok_or(MissingTypeSection)?;
    let func_idx = module.function_section.as_ref().ok_or(MissingFunctionSection)?;
    if func_idx.len() != count as usize {
        bail!(FunctionCountMismatch(func_idx.len(), count as usize));
    }

    let mut space = IndexSpace {
        types: module.num_types(),
        functions: module.num_functions(),
        globals: module.num_globals(),
        locals: 0,
    };
    let imported = module.imported_functions();

    let mut functions = vec![];
    for (i, &type_index) in func_idx.iter().enumerate() {
        let index = imported + i as u32;
        let func_type = types
            .get(type_index as usize)
            .ok_or(InvalidTypeIndex(type_index))?
            .clone();
        let body = decode_function_body(reader, &func_type, &mut space)
            .with_context(|| format!("failed to decode body of function {}", index))?;
        functions.push(Function {
            index,
            type_index,
            func_type,
            body,
        });
    }
    Ok(Section::Code(functions))
}

fn decode_function_body(
    reader: &mut SectionReader,
    func_type: &FuncType,
    space: &mut IndexSpace,
) -> Result<FunctionBody> {
    let start = reader.position();
    let body_size = reader.u32()?;
    let mut body = reader.sub_reader(body_size as usize)?;

    // count of local variable declarations
    let mut locals = vec![];
    let mut total = func_type.params.len() as u64;
    let count = body.u32()?;
    for _ in 0..count {
        let (type_count, value_type) = decode_local(&mut body)?;
        total += type_count as u64;
        if total > MAX_LOCALS {
            bail!(TooManyLocals(total));
        }
        locals.push(FunctionLocal {
            type_count,
            value_type,
        });
    }

    space.locals = total as u32;
    let code = decode_instructions(&mut body, space)?;
    body.finish()?;

    Ok(FunctionBody {
        body_size,
        locals,
        code,
        size: reader.position() - start,
    })
}
