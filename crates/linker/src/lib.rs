//! `weld-linker` merges the sections of one or more relocatable ELF32
//! objects into a single loadable executable: it builds the global symbol
//! table, classifies and lays out sections into `exec`/`rodata`/`data`/`bss`
//! segments, applies relocation fixups, and writes the result with
//! `weld-object`.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod configuration;
mod emit;
mod error;
mod layout;
mod linker;
mod loading;
mod relocate;
mod symbols;

pub use configuration::*;
pub use error::Error;
pub use linker::*;
