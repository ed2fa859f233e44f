use super::error::Error::*;
use super::reader::SectionReader;
use super::section::{self, *};
use super::types::*;
use anyhow::{bail, Context, Result};
use log::debug;
use num_traits::FromPrimitive;
use serde::Serialize;

pub const MAGIC: &[u8; 4] = b"\0asm";
pub const VERSION: u32 = 1;

/// Ids 1..=11 index the table directly; slot 0 stays empty.
pub const SECTION_SLOTS: usize = 12;

/// Encoding of the size and count fields of a section header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// One raw byte each, limiting sizes and counts to 0..=255.
    #[default]
    Compact,
    /// varuint32 each, as in the full binary format.
    Leb128,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct Module {
    pub magic: String,
    pub version: u32,
    pub type_section: Option<Vec<FuncType>>,
    pub import_section: Option<Vec<Import>>,
    pub function_section: Option<Vec<u32>>,
    pub table_section: Option<Vec<TableType>>,
    pub memory_section: Option<Vec<MemoryType>>,
    pub global_section: Option<Vec<Global>>,
    pub export_section: Option<Vec<Export>>,
    pub start_section: Option<u32>,
    pub element_section: Option<Vec<Element>>,
    pub code_section: Option<Vec<Function>>,
    pub data_section: Option<Vec<Data>>,
}

impl Module {
    pub fn add_section(&mut self, section: Section) {
        match section {
            Section::Type(section) => self.type_section = Some(section),
            Section::Import(section) => self.import_section = Some(section),
            Section::Function(section) => self.function_section = Some(section),
            Section::Table(section) => self.table_section = Some(section),
            Section::Memory(section) => self.memory_section = Some(section),
            Section::Global(section) => self.global_section = Some(section),
            Section::Export(section) => self.export_section = Some(section),
            Section::Start(section) => self.start_section = Some(section),
            Section::Element(section) => self.element_section = Some(section),
            Section::Code(section) => self.code_section = Some(section),
            Section::Data(section) => self.data_section = Some(section),
        };
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.import_section.iter().flatten()
    }

    pub fn num_types(&self) -> u32 {
        self.type_section.as_ref().map_or(0, |s| s.len() as u32)
    }

    pub fn imported_functions(&self) -> u32 {
        self.imports()
            .filter(|i| matches!(i.kind, ImportKind::Func(_)))
            .count() as u32
    }

    pub fn imported_globals(&self) -> u32 {
        self.imports()
            .filter(|i| matches!(i.kind, ImportKind::Global(_)))
            .count() as u32
    }

    pub fn imported_tables(&self) -> u32 {
        self.imports()
            .filter(|i| matches!(i.kind, ImportKind::Table(_)))
            .count() as u32
    }

    pub fn imported_memories(&self) -> u32 {
        self.imports()
            .filter(|i| matches!(i.kind, ImportKind::Memory(_)))
            .count() as u32
    }

    /// Size of the function index space: imports first, then definitions.
    pub fn num_functions(&self) -> u32 {
        self.imported_functions() + self.function_section.as_ref().map_or(0, |s| s.len() as u32)
    }

    pub fn num_globals(&self) -> u32 {
        self.imported_globals() + self.global_section.as_ref().map_or(0, |s| s.len() as u32)
    }

    pub fn num_tables(&self) -> u32 {
        self.imported_tables() + self.table_section.as_ref().map_or(0, |s| s.len() as u32)
    }

    pub fn num_memories(&self) -> u32 {
        self.imported_memories() + self.memory_section.as_ref().map_or(0, |s| s.len() as u32)
    }
}

/// Framed sections indexed by section id.
pub type SectionTable<'a> = [Option<RawSection<'a>>; SECTION_SLOTS];

pub struct Decoder<'a> {
    bytes: &'a [u8],
    header_format: HeaderFormat,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            header_format: HeaderFormat::default(),
        }
    }

    pub fn header_format(mut self, header_format: HeaderFormat) -> Self {
        self.header_format = header_format;
        self
    }

    fn header_field(&self, reader: &mut SectionReader) -> Result<u32> {
        match self.header_format {
            HeaderFormat::Compact => Ok(reader.byte()? as u32),
            HeaderFormat::Leb128 => reader.u32(),
        }
    }

    pub fn decode_header(&self, reader: &mut SectionReader) -> Result<(String, u32)> {
        let (Ok(magic), Ok(version)) = (reader.bytes(4), reader.bytes(4)) else {
            bail!(InvalidMagicOrVersion);
        };
        if magic != MAGIC {
            bail!(InvalidMagicOrVersion);
        }
        let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
        if version != VERSION {
            bail!(InvalidMagicOrVersion);
        }
        Ok((String::from_utf8_lossy(magic).to_string(), version))
    }

    /// Reads one section header and splits off its content.
    ///
    /// Layout: `id`, `size`, then `size` bytes of content whose first field is
    /// the entry count. Custom sections are returned with a zero count and
    /// their whole content as payload.
    pub fn decode_section(&self, reader: &mut SectionReader<'a>) -> Result<RawSection<'a>> {
        let byte = reader.byte()?;
        let Some(id) = SectionID::from_u8(byte) else {
            bail!(UnknownSection(byte));
        };
        let size = self.header_field(reader)?;
        let mut content = reader.sub_reader(size as usize)?;
        let count = match id {
            SectionID::Custom => 0,
            _ => self.header_field(&mut content)?,
        };
        Ok(RawSection {
            id,
            size,
            count,
            payload: content,
        })
    }

    /// Splits the input into a table of framed sections, one per id.
    pub fn frame(&self) -> Result<((String, u32), SectionTable<'a>)> {
        let mut reader = SectionReader::from_slice(self.bytes);
        let header = self.decode_header(&mut reader)?;

        let mut table: SectionTable<'a> = Default::default();
        let mut last_id = 0;
        while !reader.is_end() {
            let offset = reader.position();
            let section = self
                .decode_section(&mut reader)
                .with_context(|| format!("failed to frame section at offset {:#x}", offset))?;
            debug!(
                "framed {:?} section at {:#x}: size={}, count={}",
                section.id, offset, section.size, section.count
            );
            if section.id == SectionID::Custom {
                continue;
            }
            let slot = &mut table[section.id as usize];
            if slot.is_some() {
                bail!(DuplicateSection(section.id as u8));
            }
            // non-custom sections must appear in increasing id order
            if (section.id as u8) < last_id {
                bail!(SectionOutOfOrder(section.id as u8));
            }
            last_id = section.id as u8;
            *slot = Some(section);
        }
        Ok((header, table))
    }

    pub fn decode(&self) -> Result<Module> {
        let ((magic, version), table) = self.frame()?;
        let mut module = Module {
            magic,
            version,
            ..Module::default()
        };

        // framing enforces id order, so every cross reference is already decoded
        for raw in table.iter().flatten() {
            let section = section::decode(raw, &module)
                .with_context(|| format!("failed to decode {:?} section", raw.id))?;
            module.add_section(section);
        }

        if module.function_section.as_ref().is_some_and(|f| !f.is_empty())
            && module.code_section.is_none()
        {
            bail!(MissingCodeSection);
        }
        Ok(module)
    }
}
