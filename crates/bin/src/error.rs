#[cfg(feature = "fancy-errors")]
use miette::{set_hook, MietteHandlerOpts};
use miette::{Diagnostic, InstallError, Result};
use thiserror::Error;
use weld_errors::Error as WeldError;

/// An error raised while parsing the command-line itself, before any
/// assembling or linking starts.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// An argument contained bytes that are not valid Unicode.
    #[error("The argument `{0}` contains invalid Unicode data.")]
    InvalidArgumentEncoding(String),

    /// `argv[0]` was empty.
    #[error("The program name is missing from the command-line.")]
    ProgramNameIsMissing,

    /// `argh` rejected the command-line (unknown flag, missing value, …).
    #[error("I was not able to read the command-line properly:\n{0}")]
    #[diagnostic(code(E001), help("See the command-line usage with `--help`."))]
    CommandLine(String),
}

impl Error {
    /// Install the fancy diagnostic renderer (when the `fancy-errors`
    /// feature is enabled) as the process-wide panic/error hook.
    pub fn install_and_configure() -> Result<(), InstallError> {
        #[cfg(feature = "fancy-errors")]
        set_hook(Box::new(|_| {
            Box::new(
                MietteHandlerOpts::new()
                    .with_cause_chain()
                    .footer(
                        "For more information about an error, try \
                        `--explain <error>` where `<error>` \
                        has the `E[0-9]{{3}} pattern."
                            .to_string(),
                    )
                    .width(85)
                    .terminal_links(false)
                    .build(),
            )
        }))?;

        Ok(())
    }

    /// Look up the long-form help text for a diagnostic code (`--explain`).
    pub fn explain(error_code: &str) -> Result<&'static str, WeldError> {
        WeldError::explain(error_code)
    }
}
