//! Classification and address layout.
//!
//! Classification groups every input section into one of four output
//! kinds by its flags, with the section containing `__main` pulled to the
//! front of `exec` ahead of every other executable section. Layout then
//! walks the four groups in a fixed order — `exec`, `rodata`, `data`,
//! `bss` — assigning each section a final virtual address, rounding up to
//! the section's own alignment before every section and additionally to
//! the page size at every boundary between kinds.

use std::collections::HashMap;

use weld_object::elf32::{File, Program, Section, SectionFlag, SectionType};

use crate::{loading::LoadedObject, symbols::Definition};

/// Which of the four output segments an input section joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Exec,
    Rodata,
    Data,
    Bss,
}

/// One input section, tracked through classification, layout, and
/// relocation.
#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    pub(crate) object_index: usize,
    pub(crate) section_index: u16,
    pub(crate) kind: SegmentKind,
    /// The section's own declared `sh_addr`, before relayout. Only
    /// `exec`'s first chunk's value is actually used (as the image base),
    /// but every chunk carries it for uniformity.
    pub(crate) original_address: u32,
    /// Final virtual address, assigned by [`build`].
    pub(crate) address: u32,
    pub(crate) size: u32,
    pub(crate) align: u32,
    /// Section bytes; empty for a `bss` chunk (it occupies no file bytes).
    pub(crate) data: Vec<u8>,
}

/// The result of classification and layout: every chunk with its final
/// address assigned, plus the image base address layout started from.
pub(crate) struct Layout {
    pub(crate) chunks: Vec<Chunk>,
    pub(crate) base: u32,
    pub(crate) page_size: u32,
    index: HashMap<(usize, u16), usize>,
}

impl Layout {
    /// The final address of the section at `(object_index, section_index)`,
    /// if classification placed one there.
    pub(crate) fn address_of(&self, object_index: usize, section_index: u16) -> Option<u32> {
        self.index.get(&(object_index, section_index)).map(|&i| self.chunks[i].address)
    }

    /// Index into [`Self::chunks`] of the section at
    /// `(object_index, section_index)`, if classification placed one there.
    pub(crate) fn index_of(&self, object_index: usize, section_index: u16) -> Option<usize> {
        self.index.get(&(object_index, section_index)).copied()
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` of `0` or `1` means "no constraint" and is a no-op.
/// Otherwise this applies the same bitmask arithmetic the architecture
/// description loader and the object writer both use
/// (`(value + alignment - 1) & !(alignment - 1)`), which only computes a
/// true multiple of `alignment` when `alignment` is a power of two. This
/// crate does not special-case or "fix" a non-power-of-two alignment —
/// callers must supply a power-of-two value; anything else silently
/// produces a result that is not a multiple of it.
fn ensure_alignment(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }

    if value & (alignment - 1) != 0 {
        (value + alignment - 1) & !(alignment - 1)
    } else {
        value
    }
}

fn chunk_from_section(
    object_index: usize,
    section_index: u16,
    section: &Section<'_>,
    kind: SegmentKind,
) -> Chunk {
    Chunk {
        object_index,
        section_index,
        kind,
        original_address: section.address.0,
        address: 0,
        size: section.size.0,
        align: section.alignment,
        data: if kind == SegmentKind::Bss { Vec::new() } else { section.data.to_vec() },
    }
}

fn classify(objects: &[LoadedObject<'_>], main: Definition) -> Vec<Chunk> {
    let mut exec = Vec::new();
    let mut rodata = Vec::new();
    let mut data = Vec::new();
    let mut bss = Vec::new();

    let main_section = &objects[main.object_index].file.sections[main.section_index as usize];
    exec.push(chunk_from_section(main.object_index, main.section_index, main_section, SegmentKind::Exec));

    for (object_index, object) in objects.iter().enumerate() {
        for (section_index, section) in object.file.sections.iter().enumerate() {
            let section_index = section_index as u16;

            if object_index == main.object_index && section_index == main.section_index {
                continue;
            }

            match section.r#type {
                SectionType::ProgramData if section.flags.contains(SectionFlag::Executable) => {
                    exec.push(chunk_from_section(object_index, section_index, section, SegmentKind::Exec));
                }
                SectionType::ProgramData if section.flags.contains(SectionFlag::Writable) => {
                    data.push(chunk_from_section(object_index, section_index, section, SegmentKind::Data));
                }
                SectionType::ProgramData => {
                    rodata.push(chunk_from_section(object_index, section_index, section, SegmentKind::Rodata));
                }
                SectionType::NoBits => {
                    bss.push(chunk_from_section(object_index, section_index, section, SegmentKind::Bss));
                }
                _ => {}
            }
        }
    }

    exec.into_iter().chain(rodata).chain(data).chain(bss).collect()
}

/// Classify every input section and assign it a final address.
pub(crate) fn build(objects: &[LoadedObject<'_>], main: Definition, page_size: u32) -> Layout {
    let mut chunks = classify(objects, main);

    let base = chunks.first().map(|chunk| chunk.original_address).unwrap_or(0);
    let header_size = File::SIZE as u32 + 3 * Program::SIZE;
    let mut memory_offset = base + header_size;

    let mut previous_kind = None;
    for chunk in &mut chunks {
        if previous_kind.is_some() && previous_kind != Some(chunk.kind) {
            memory_offset = ensure_alignment(memory_offset, page_size.max(1));
        }
        previous_kind = Some(chunk.kind);

        memory_offset = ensure_alignment(memory_offset, chunk.align);
        chunk.address = memory_offset;
        memory_offset += chunk.size;
    }

    let index =
        chunks.iter().enumerate().map(|(i, chunk)| ((chunk.object_index, chunk.section_index), i)).collect();

    Layout { chunks, base, page_size, index }
}
