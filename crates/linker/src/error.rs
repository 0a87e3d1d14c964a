//! Internal error representation for the linker core.
//!
//! Unlike the assembler's [`weld_errors::Error`] conversion, which is
//! per-line, the linker's [`Error::MultipleDefinition`] and
//! [`Error::Undefined`] variants each carry an already-aggregated,
//! newline-joined report: the symbol table pass collects every duplicate and
//! every undefined reference across every input object before reporting
//! failure, so the user sees the complete list in one pass rather than
//! one-error-at-a-time.

use std::path::PathBuf;

/// A linker-level error, ready to become a [`weld_errors::Error`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No object files were named on the command line.
    #[error("no input files were given to link")]
    NoInputFile,
    /// An input object could not be opened or fully read.
    #[error("could not read object file '{0}': {1}")]
    Io(PathBuf, String),
    /// An input object's bytes did not parse as a well-formed ELF32 object.
    #[error("'{0}' is not a well-formed object file")]
    ParsingObject(PathBuf),
    /// The aggregated report of every symbol defined in more than one input
    /// object.
    #[error("{0}")]
    MultipleDefinition(String),
    /// The aggregated report of every symbol referenced but defined in no
    /// input object (including a missing `__main`).
    #[error("{0}")]
    Undefined(String),
    /// The final executable could not be written.
    #[error("could not write output file '{0}': {1}")]
    Output(PathBuf, String),
}

impl From<Error> for weld_errors::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::NoInputFile => weld_errors::Error::Config(error.to_string()),
            Error::Io(..) => weld_errors::Error::Io(error.to_string()),
            Error::ParsingObject(..) => weld_errors::Error::Config(error.to_string()),
            Error::MultipleDefinition(message) => weld_errors::Error::MultipleDefinition(message),
            Error::Undefined(message) => weld_errors::Error::Undefined(message),
            Error::Output(..) => weld_errors::Error::Io(error.to_string()),
        }
    }
}
