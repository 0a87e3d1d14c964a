//! `as` assembles a single source file against a `.arch`-declared
//! architecture description into a relocatable ELF32 object (or, with
//! `-r`, raw concatenated segment bytes).

use std::path::PathBuf;

use argh::FromArgs;
use weld_asm::Assembler;
use weld_bin::{cli, error::Error};
use weld_errors::{Error as WeldError, Result};

/// Assemble a source file into a relocatable object.
#[derive(Debug, FromArgs)]
struct Args {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// specify the name and location of the output file. Defaults to the
    /// input file's name with `.o` appended.
    #[argh(option, short = 'o')]
    output_file: Option<PathBuf>,

    /// also write a `.sym` dump of the resolved symbol table.
    #[argh(switch, short = 's')]
    symbols: bool,

    /// emit raw concatenated segment bytes instead of an ELF object; every
    /// label reference must resolve within this single unit.
    #[argh(switch, short = 'r')]
    raw: bool,

    /// source file to assemble.
    #[argh(positional)]
    input_file: PathBuf,
}

fn main() -> Result<()> {
    Error::install_and_configure()?;

    let args: Args = cli::parse()?;

    if let Some(error_code) = args.explain {
        println!("{}", Error::explain(&error_code)?);
        return Ok(());
    }

    let output_file = args
        .output_file
        .unwrap_or_else(|| PathBuf::from(format!("{}.o", args.input_file.display())));

    let mut assembler = Assembler::new(output_file.display().to_string());
    assembler.assemble("", &args.input_file.display().to_string()).map_err(WeldError::from)?;
    assembler.link(args.symbols, args.raw).map_err(WeldError::from)?;
    assembler.write(args.raw).map_err(WeldError::from)?;

    Ok(())
}
