//! Shared `argv` parsing: extracting the program name `argh` wants as
//! `command`, and turning an early exit (`--help`, a bad flag) into either
//! a clean process exit or an [`Error::CommandLine`].

use std::{env, ffi::OsString, path::Path, process};

use argh::FromArgs;

use crate::error::Error;

/// Parse the current process's command-line into `T`.
///
/// On `--help` (or any other early exit that already produced output),
/// prints that output and exits the process directly, the way `argh`
/// itself expects a top-level caller to.
pub fn parse<T: FromArgs>() -> Result<T, Error> {
    let arguments = env::args_os()
        .map(OsString::into_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|argument| Error::InvalidArgumentEncoding(argument.to_string_lossy().to_string()))?;

    if arguments.is_empty() {
        return Err(Error::ProgramNameIsMissing);
    }

    let command = Path::new(&arguments[0])
        .file_name()
        .and_then(|file_name| file_name.to_str())
        .unwrap_or(&arguments[0]);

    let rest = arguments.iter().skip(1).map(String::as_str).collect::<Vec<_>>();

    match T::from_args(&[command], &rest) {
        Ok(value) => Ok(value),
        Err(early_exit) => match early_exit.status {
            Ok(()) => {
                println!("{}", early_exit.output);
                process::exit(0);
            }
            Err(()) => Err(Error::CommandLine(early_exit.output.trim().to_string())),
        },
    }
}
