//! `weld-arch` describes a target architecture: the immutable tables of
//! fragments, formats, instructions, segments, and relocations that the
//! assembler core (`weld-asm`) is parameterized by.
//!
//! An [`Architecture`] is constructed once per assembly unit, by [loading](
//! Architecture::load) a YAML document named `<arch>.arch.yaml`, and is
//! never mutated afterwards: every table it exposes is already fully
//! resolved (defaults applied, `defaults` entries parsed, instruction
//! formats checked against the `formats` table) so the assembler never has
//! to second-guess what it's holding.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod loader;
mod types;

pub use loader::Error;
pub use types::*;

use std::collections::HashMap;

/// The immutable, fully-resolved description of a target architecture.
///
/// Built once per assembly unit by [`Architecture::load`] and shared
/// read-only for the rest of the assembly (segments are created from
/// [`Architecture::segments`] but own their own runtime state from then on).
#[derive(Debug, Clone)]
pub struct Architecture {
    /// Name the architecture was loaded under (without the `.arch.yaml`
    /// suffix), kept around for diagnostics.
    pub name: String,
    /// Natural width, in bits, of a data word on this architecture.
    pub data_width: u32,
    /// Width, in bits, of an address on this architecture.
    pub address_width: u32,
    /// Width, in bits, of the smallest addressable unit.
    pub addressable_width: u32,
    /// Page size used to align loadable segments in the linker; `0` if the
    /// architecture doesn't declare one.
    pub page_size: u32,
    /// One description per declared segment, in declaration order.
    pub segments: Vec<SegmentDescription>,
    /// Fragments, keyed by name.
    pub fragments: HashMap<String, Fragment>,
    /// Formats, keyed by name. The `"composite"` sentinel never appears
    /// here — it has no format row, only components.
    pub formats: HashMap<String, Format>,
    /// Every registered instruction variant, keyed by mnemonic.
    pub instructions: HashMap<String, Vec<Instruction>>,
    /// Instructions that declared a non-zero `id`, keyed by that id, so
    /// composite components can find the real instruction they expand to.
    pub indexed_instructions: HashMap<u32, Instruction>,
    /// Relocation kinds, keyed by name.
    pub relocations: HashMap<String, Relocation>,
}

impl Architecture {
    /// Load an architecture description named `<name>.arch.yaml`, resolved
    /// relative to the current working directory — the same convention
    /// `.include` uses for assembly source files.
    pub fn load(name: &str) -> Result<Self, Error> {
        loader::load(name)
    }

    /// Find a segment description by name.
    pub fn segment(&self, name: &str) -> Option<&SegmentDescription> {
        self.segments.iter().find(|segment| segment.name == name)
    }
}
