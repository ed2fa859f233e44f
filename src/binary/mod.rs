pub mod error;
pub mod instruction;
pub mod leb;
pub mod module;
pub mod reader;
pub mod section;
pub mod types;

pub use module::{Decoder, HeaderFormat, Module};
