use std::path::PathBuf;

use crate::Linker;

/// Everything `ld` needs to know before it starts linking.
#[derive(Debug)]
pub struct Configuration {
    pub(crate) input_files: Vec<PathBuf>,
    pub(crate) output_file: PathBuf,
    /// Write a `.sym` dump of the final symbol table next to the output.
    pub(crate) write_symbols: bool,
    /// Emit raw concatenated segment bytes instead of an ELF executable.
    pub(crate) raw_output: bool,
}

impl Configuration {
    /// Build a configuration out of the input object files and the desired
    /// output path.
    pub fn new(input_files: Vec<PathBuf>, output_file: PathBuf) -> Self {
        Self { input_files, output_file, write_symbols: false, raw_output: false }
    }

    /// Also write a `.sym` dump of the final symbol table.
    pub fn with_symbols(mut self, write_symbols: bool) -> Self {
        self.write_symbols = write_symbols;
        self
    }

    /// Emit raw concatenated segment bytes instead of an ELF executable.
    pub fn with_raw_output(mut self, raw_output: bool) -> Self {
        self.raw_output = raw_output;
        self
    }

    /// Build the [`Linker`] that will carry out this configuration.
    pub fn linker(self) -> Linker {
        Linker::with_configuration(self)
    }
}
