//! Shared command-line scaffolding for the `as` and `ld` executables:
//! argument-parsing error handling and the `--explain`/fancy-diagnostics
//! hookup both binaries install identically.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

pub mod cli;
pub mod error;
