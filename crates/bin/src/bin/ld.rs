//! `ld` merges one or more relocatable ELF32 objects into a single
//! loadable executable (or, with `-r`, raw concatenated segment bytes).

use std::path::PathBuf;

use argh::FromArgs;
use weld_bin::{cli, error::Error};
use weld_errors::{Error as WeldError, Result};
use weld_linker::Configuration;

fn default_output_file() -> PathBuf {
    PathBuf::from("a.out")
}

/// Link one or more relocatable objects into an executable.
#[derive(Debug, FromArgs)]
struct Args {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// specify the name and location of the output file. If not specified,
    /// `a.out` is used.
    #[argh(option, short = 'o', default = "default_output_file()")]
    output_file: PathBuf,

    /// also write a `.sym` dump of the final symbol table.
    #[argh(switch, short = 's')]
    symbols: bool,

    /// emit raw concatenated segment bytes instead of an ELF executable.
    #[argh(switch, short = 'r')]
    raw: bool,

    /// input object files.
    #[argh(positional)]
    input_files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    Error::install_and_configure()?;

    let args: Args = cli::parse()?;

    if let Some(error_code) = args.explain {
        println!("{}", Error::explain(&error_code)?);
        return Ok(());
    }

    let linker = Configuration::new(args.input_files, args.output_file)
        .with_symbols(args.symbols)
        .with_raw_output(args.raw)
        .linker();

    linker.link().map_err(WeldError::from)?;

    Ok(())
}
