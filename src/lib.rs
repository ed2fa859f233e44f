pub mod binary;
pub mod text;

use anyhow::Result;
use binary::{Decoder, HeaderFormat};

/// Decodes a binary module and renders it as text in one step.
pub fn disassemble(bytes: &[u8], header_format: HeaderFormat) -> Result<String> {
    let module = Decoder::new(bytes).header_format(header_format).decode()?;
    text::print_module(&module)
}
