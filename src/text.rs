//! Renders a decoded [`Module`] as WebAssembly text.
//!
//! Sections are printed in a fixed order that differs from the binary one:
//! types, imports, globals, functions, memories, tables, data, exports,
//! elements and the start function. Names are synthesized from positional
//! indices: `$t{n}` for types, `$f{n}` for functions, `$g{n}` for globals,
//! `$p{n}` for parameters and `$l{n}` for the remaining locals.

use crate::binary::instruction::{BlockType, Immediate, InitExpr, Instruction, Opcode};
use crate::binary::module::Module;
use crate::binary::section::*;
use crate::binary::types::*;
use anyhow::Result;
use std::fmt::{self, Display, Write};

const PAGE_SIZE: usize = 65536;
const MAX_NESTING_TO_PRINT: u32 = 50;

pub fn print_module(module: &Module) -> Result<String> {
    Printer::new().print(module)
}

#[derive(Debug, Default)]
pub struct Printer {
    result: String,
    nesting: u32,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(mut self, module: &Module) -> Result<String> {
        self.result.push_str("(module");
        let start = self.result.len();
        self.nesting += 1;

        self.print_types(module)?;
        self.print_imports(module)?;
        self.print_globals(module)?;
        self.print_functions(module)?;
        let folded = folded_data(module);
        self.print_memories(module, folded)?;
        self.print_tables(module)?;
        self.print_data(module, folded)?;
        self.print_exports(module)?;
        self.print_elements(module)?;
        self.print_start(module)?;

        self.nesting -= 1;
        if self.result.len() > start {
            self.newline();
        }
        self.result.push_str(")\n");
        Ok(self.result)
    }

    fn newline(&mut self) {
        self.result.push('\n');
        for _ in 0..self.nesting.min(MAX_NESTING_TO_PRINT) {
            self.result.push_str("  ");
        }
    }

    fn print_types(&mut self, module: &Module) -> Result<()> {
        for (i, ty) in module.type_section.iter().flatten().enumerate() {
            self.newline();
            write!(self.result, "(type $t{} (func", i)?;
            for param in ty.params.iter() {
                write!(self.result, " (param {})", param)?;
            }
            for result in ty.results.iter() {
                write!(self.result, " (result {})", result)?;
            }
            self.result.push_str("))");
        }
        Ok(())
    }

    fn print_imports(&mut self, module: &Module) -> Result<()> {
        let mut funcs = 0;
        let mut globals = 0;
        for import in module.imports() {
            self.newline();
            write!(
                self.result,
                "(import {} {} ",
                Name(&import.module_name),
                Name(&import.field_name)
            )?;
            match &import.kind {
                ImportKind::Func(type_index) => {
                    write!(self.result, "(func $f{} (type $t{}))", funcs, type_index)?;
                    funcs += 1;
                }
                ImportKind::Table(table) => write!(self.result, "(table {})", table)?,
                ImportKind::Memory(memory) => write!(self.result, "(memory {})", memory.limits)?,
                ImportKind::Global(global_type) => {
                    write!(self.result, "(global $g{} {})", globals, global_type)?;
                    globals += 1;
                }
            }
            self.result.push(')');
        }
        Ok(())
    }

    fn print_globals(&mut self, module: &Module) -> Result<()> {
        let imported = module.imported_globals();
        for (i, global) in module.global_section.iter().flatten().enumerate() {
            self.newline();
            write!(
                self.result,
                "(global $g{} {} {})",
                imported as usize + i,
                global.global_type,
                global.init_expr
            )?;
        }
        Ok(())
    }

    fn print_functions(&mut self, module: &Module) -> Result<()> {
        for func in module.code_section.iter().flatten() {
            self.print_function(func)?;
        }
        Ok(())
    }

    fn print_function(&mut self, func: &Function) -> Result<()> {
        self.newline();
        write!(self.result, "(func $f{} (type $t{})", func.index, func.type_index)?;
        let params = func.func_type.params.len();
        for (i, param) in func.func_type.params.iter().enumerate() {
            write!(self.result, " (param $p{} {})", i, param)?;
        }
        for result in func.func_type.results.iter() {
            write!(self.result, " (result {})", result)?;
        }

        self.nesting += 1;
        let mut local_idx = params;
        for local in func.body.locals.iter() {
            for _ in 0..local.type_count {
                self.newline();
                write!(self.result, "(local $l{} {})", local_idx, local.value_type)?;
                local_idx += 1;
            }
        }

        let nesting_start = self.nesting;
        for inst in func.body.code.iter() {
            match inst.opcode {
                // `else` sits at the depth of its `if` without leaving the scope.
                Opcode::Else => {
                    self.nesting -= 1;
                    self.newline();
                    self.print_instruction(inst, params)?;
                    self.nesting += 1;
                }
                Opcode::End if self.nesting > nesting_start => {
                    self.nesting -= 1;
                    self.newline();
                    self.print_instruction(inst, params)?;
                }
                _ => {
                    self.newline();
                    self.print_instruction(inst, params)?;
                    if inst.opens_block() {
                        self.nesting += 1;
                    }
                }
            }
        }
        self.nesting = nesting_start - 1;

        self.newline();
        self.result.push(')');
        Ok(())
    }

    fn print_instruction(&mut self, inst: &Instruction, params: usize) -> Result<()> {
        self.result.push_str(inst.name());
        match &inst.immediate {
            Immediate::None => {}
            Immediate::Block(BlockType::Empty) => {}
            Immediate::Block(BlockType::Value(ty)) => write!(self.result, " (result {})", ty)?,
            Immediate::Depth(depth) => write!(self.result, " {}", depth)?,
            Immediate::BrTable { targets, default } => {
                for target in targets.iter() {
                    write!(self.result, " {}", target)?;
                }
                write!(self.result, " {}", default)?;
            }
            Immediate::Function(index) => write!(self.result, " $f{}", index)?,
            Immediate::CallIndirect { type_index } => {
                write!(self.result, " (type $t{})", type_index)?
            }
            Immediate::Local(index) if (*index as usize) < params => {
                write!(self.result, " $p{}", index)?
            }
            Immediate::Local(index) => write!(self.result, " $l{}", index)?,
            Immediate::Global(index) => write!(self.result, " $g{}", index)?,
            Immediate::Memory(arg) => {
                if arg.offset != 0 {
                    write!(self.result, " offset={}", arg.offset)?;
                }
                if arg.align != inst.opcode.natural_alignment() {
                    write!(self.result, " align={}", 1u64 << arg.align.min(63))?;
                }
            }
            Immediate::I32(value) => write!(self.result, " {}", value)?,
            Immediate::I64(value) => write!(self.result, " {}", value)?,
            Immediate::F32(bits) => write!(self.result, " {}", F32Bits(*bits))?,
            Immediate::F64(bits) => write!(self.result, " {}", F64Bits(*bits))?,
        }
        Ok(())
    }

    fn print_memories(&mut self, module: &Module, folded: Option<&Data>) -> Result<()> {
        if let Some(data) = folded {
            self.newline();
            write!(self.result, "(memory (data {}))", DataString(&data.init))?;
            return Ok(());
        }
        for memory in module.memory_section.iter().flatten() {
            self.newline();
            write!(self.result, "(memory {})", memory.limits)?;
        }
        Ok(())
    }

    fn print_tables(&mut self, module: &Module) -> Result<()> {
        for table in module.table_section.iter().flatten() {
            self.newline();
            write!(self.result, "(table {})", table)?;
        }
        Ok(())
    }

    fn print_data(&mut self, module: &Module, folded: Option<&Data>) -> Result<()> {
        if folded.is_some() {
            return Ok(());
        }
        for data in module.data_section.iter().flatten() {
            self.newline();
            write!(self.result, "{}", data)?;
        }
        Ok(())
    }

    fn print_exports(&mut self, module: &Module) -> Result<()> {
        for export in module.export_section.iter().flatten() {
            self.newline();
            write!(self.result, "{}", export)?;
        }
        Ok(())
    }

    fn print_elements(&mut self, module: &Module) -> Result<()> {
        for element in module.element_section.iter().flatten() {
            self.newline();
            write!(self.result, "{}", element)?;
        }
        Ok(())
    }

    fn print_start(&mut self, module: &Module) -> Result<()> {
        if let Some(index) = module.start_section {
            self.newline();
            write!(self.result, "(start $f{})", index)?;
        }
        Ok(())
    }
}

/// The single data segment that can be written inline as
/// `(memory (data "..."))`, if the module's memory allows it.
///
/// That form declares a memory of exactly as many pages as the data needs, at
/// offset zero, so it only applies when no other memory layout is declared.
fn folded_data(module: &Module) -> Option<&Data> {
    let [data] = module.data_section.as_deref()? else {
        return None;
    };
    let at_zero = data.offset.instruction == Instruction::new(Opcode::I32Const, Immediate::I32(0));
    if data.memory_index != 0 || !at_zero || module.imported_memories() > 0 {
        return None;
    }
    let pages = ((data.init.len() + PAGE_SIZE - 1) / PAGE_SIZE) as u32;
    match module.memory_section.as_deref() {
        None | Some([]) => Some(data),
        Some([memory]) if memory.limits.min == pages && memory.limits.max == Some(pages) => {
            Some(data)
        }
        _ => None,
    }
}

struct Name<'a>(&'a str);

impl Display for Name<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        for c in self.0.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                c if (c as u32) < 0x20 || c as u32 == 0x7F => write!(f, "\\{:02x}", c as u32)?,
                c => f.write_char(c)?,
            }
        }
        f.write_char('"')
    }
}

struct DataString<'a>(&'a [u8]);

impl Display for DataString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        for &byte in self.0 {
            match byte {
                b'"' => f.write_str("\\\"")?,
                b'\\' => f.write_str("\\\\")?,
                0x20..=0x7E => f.write_char(byte as char)?,
                _ => write!(f, "\\{:02x}", byte)?,
            }
        }
        f.write_char('"')
    }
}

struct F32Bits(u32);

impl Display for F32Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = f32::from_bits(self.0);
        let sign = if self.0 >> 31 != 0 { "-" } else { "" };
        if value.is_nan() {
            write!(f, "{}nan:{:#x}", sign, self.0 & 0x007F_FFFF)
        } else if value.is_infinite() {
            write!(f, "{}inf", sign)
        } else {
            write!(f, "{:e}", value)
        }
    }
}

struct F64Bits(u64);

impl Display for F64Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = f64::from_bits(self.0);
        let sign = if self.0 >> 63 != 0 { "-" } else { "" };
        if value.is_nan() {
            write!(f, "{}nan:{:#x}", sign, self.0 & 0x000F_FFFF_FFFF_FFFF)
        } else if value.is_infinite() {
            write!(f, "{}inf", sign)
        } else {
            write!(f, "{:e}", value)
        }
    }
}

impl Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.min)?;
        if let Some(max) = self.max {
            write!(f, " {}", max)?;
        }
        Ok(())
    }
}

impl Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.elem_type {
            ElemType::FuncRef => write!(f, "{} funcref", self.limits),
        }
    }
}

impl Display for GlobalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mutability {
            Mutability::Const => write!(f, "{}", self.content_type),
            Mutability::Var => write!(f, "(mut {})", self.content_type),
        }
    }
}

impl Display for InitExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inst = &self.instruction;
        match inst.immediate {
            Immediate::I32(value) => write!(f, "({} {})", inst.name(), value),
            Immediate::I64(value) => write!(f, "({} {})", inst.name(), value),
            Immediate::F32(bits) => write!(f, "({} {})", inst.name(), F32Bits(bits)),
            Immediate::F64(bits) => write!(f, "({} {})", inst.name(), F64Bits(bits)),
            Immediate::Global(index) => write!(f, "({} $g{})", inst.name(), index),
            _ => write!(f, "({})", inst.name()),
        }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(elem {}", self.offset)?;
        for index in self.init.iter() {
            write!(f, " $f{}", index)?;
        }
        f.write_char(')')
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(data {} {})", self.offset, DataString(&self.init))
    }
}

impl Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(export {} ", Name(&self.name))?;
        match self.desc {
            ExportDesc::Func(index) => write!(f, "(func $f{}))", index),
            ExportDesc::Table(index) => write!(f, "(table {}))", index),
            ExportDesc::Memory(index) => write!(f, "(memory {}))", index),
            ExportDesc::Global(index) => write!(f, "(global $g{}))", index),
        }
    }
}
