use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use log::debug;
use std::fs;
use std::path::PathBuf;
use wasmdis::binary::{Decoder, HeaderFormat};
use wasmdis::text;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Wat,
    Json,
}

#[derive(Debug, Parser)]
#[clap(author, about, version)]
struct Args {
    file: PathBuf,

    /// read section sizes and counts as LEB128 instead of single bytes
    #[clap(long)]
    leb128_headers: bool,

    #[clap(long, value_enum, default_value = "wat")]
    format: Format,

    /// write to this file instead of stdout
    #[clap(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    debug!("read {} bytes from {}", bytes.len(), args.file.display());

    let header_format = if args.leb128_headers {
        HeaderFormat::Leb128
    } else {
        HeaderFormat::Compact
    };
    let module = Decoder::new(&bytes).header_format(header_format).decode()?;

    let out = match args.format {
        Format::Wat => text::print_module(&module)?,
        Format::Json => serde_json::to_string_pretty(&module)? + "\n",
    };

    match args.output {
        Some(path) => fs::write(&path, out)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", out),
    }
    Ok(())
}
