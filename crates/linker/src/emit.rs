//! Building the final executable.
//!
//! Every output group (`exec`, `rodata`, `data`, `bss`) is flattened into
//! one contiguous buffer, filling the gaps [`crate::layout::build`] left
//! for alignment with zero bytes, and one `PT_LOAD` segment is produced per
//! group — except `data` and `bss`, which share a single read/write
//! segment the way a conventional linker co-locates initialized and
//! uninitialized globals.

use std::borrow::Cow;

use weld_object::elf32::{
    Address, Endianness, File, FileType, OsAbi, Program, ProgramFlag, ProgramType, Section,
    SectionFlag, SectionFlags, SectionType, Version,
};

use crate::layout::{Layout, SegmentKind};

/// One kind's chunks, flattened into a single buffer with internal
/// alignment gaps zero-filled, plus the address range it spans.
struct Group {
    start: u32,
    end: u32,
    data: Vec<u8>,
}

fn merge_group(layout: &Layout, kind: SegmentKind) -> Option<Group> {
    let chunks: Vec<_> = layout.chunks.iter().filter(|chunk| chunk.kind == kind).collect();
    let first = chunks.first()?;
    let last = chunks.last()?;

    let start = first.address;
    let end = last.address + last.size;

    let mut data = Vec::with_capacity((end - start) as usize);
    for chunk in &chunks {
        let gap = chunk.address - start - data.len() as u32;
        data.extend(std::iter::repeat(0u8).take(gap as usize));
        data.extend_from_slice(&chunk.data);
    }

    Some(Group { start, end, data })
}

fn section(
    name_offset: u32,
    r#type: SectionType,
    flags: SectionFlags,
    group: &Group,
    base: u32,
    alignment: u32,
) -> Section<'static> {
    let writable_data = if r#type == SectionType::NoBits { Vec::new() } else { group.data.clone() };

    Section {
        name: None,
        name_offset: Address(name_offset),
        r#type,
        flags,
        address: Address(group.start),
        offset: Address(group.start - base),
        size: Address(group.end - group.start),
        link: 0,
        information: 0,
        alignment,
        entity_size: 0,
        data: Cow::Owned(writable_data),
    }
}

fn program(
    r#type: ProgramType,
    flags: weld_object::elf32::ProgramFlags,
    group: &Group,
    base: u32,
    size_in_file: u32,
    alignment: u32,
) -> Program<'static> {
    Program {
        r#type,
        offset: Address(group.start - base),
        virtual_address: Address(group.start),
        physical_address: Address(group.start),
        size_in_file,
        size_in_memory: group.end - group.start,
        flags,
        alignment,
        data: Cow::Owned(Vec::new()),
    }
}

fn null_section() -> Section<'static> {
    Section {
        name: None,
        name_offset: Address(0),
        r#type: SectionType::Null,
        flags: weld_object::elf32::SectionFlags::EMPTY,
        address: Address(0),
        offset: Address(0),
        size: Address(0),
        link: 0,
        information: 0,
        alignment: 0,
        entity_size: 0,
        data: Cow::Borrowed(&[]),
    }
}

/// Build the linked executable's `File`, laying every section out at the
/// file offset equal to its address delta from the image base — the same
/// alignment gaps [`crate::layout::build`] introduced in memory are
/// reproduced, byte for byte, in the file.
pub(crate) fn build(layout: &Layout, entry_point: u32) -> File<'static> {
    let exec = merge_group(layout, SegmentKind::Exec);
    let rodata = merge_group(layout, SegmentKind::Rodata);
    let data = merge_group(layout, SegmentKind::Data);
    let bss = merge_group(layout, SegmentKind::Bss);

    let mut sections = vec![null_section()];
    let mut programs = Vec::new();
    let mut strings = vec![0u8];
    let base = layout.base;

    let mut push_name = |strings: &mut Vec<u8>, name: &str| -> u32 {
        let offset = strings.len() as u32;
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
        offset
    };

    if let Some(group) = &exec {
        let name_offset = push_name(&mut strings, ".text");
        sections.push(section(
            name_offset,
            SectionType::ProgramData,
            SectionFlag::Allocable | SectionFlag::Executable,
            group,
            base,
            4,
        ));
        programs.push(program(
            ProgramType::Load,
            ProgramFlag::Execute | ProgramFlag::Read,
            group,
            base,
            group.data.len() as u32,
            layout.page_size.max(1),
        ));
    }

    if let Some(group) = &rodata {
        let name_offset = push_name(&mut strings, ".rodata");
        sections.push(section(
            name_offset,
            SectionType::ProgramData,
            SectionFlag::Allocable.into(),
            group,
            base,
            4,
        ));
        programs.push(program(
            ProgramType::Load,
            ProgramFlag::Read.into(),
            group,
            base,
            group.data.len() as u32,
            layout.page_size.max(1),
        ));
    }

    let data_write_segment = match (&data, &bss) {
        (Some(data_group), Some(bss_group)) => {
            let name_offset = push_name(&mut strings, ".data");
            sections.push(section(
                name_offset,
                SectionType::ProgramData,
                SectionFlag::Allocable | SectionFlag::Writable,
                data_group,
                base,
                4,
            ));

            let bss_name_offset = push_name(&mut strings, ".bss");
            sections.push(section(
                bss_name_offset,
                SectionType::NoBits,
                SectionFlag::Allocable | SectionFlag::Writable,
                bss_group,
                base,
                4,
            ));

            let mut combined = program(
                ProgramType::Load,
                ProgramFlag::Write | ProgramFlag::Read,
                data_group,
                base,
                data_group.data.len() as u32,
                layout.page_size.max(1),
            );
            combined.size_in_memory = bss_group.end - data_group.start;
            Some(combined)
        }
        (Some(data_group), None) => {
            let name_offset = push_name(&mut strings, ".data");
            sections.push(section(
                name_offset,
                SectionType::ProgramData,
                SectionFlag::Allocable | SectionFlag::Writable,
                data_group,
                base,
                4,
            ));

            Some(program(
                ProgramType::Load,
                ProgramFlag::Write | ProgramFlag::Read,
                data_group,
                base,
                data_group.data.len() as u32,
                layout.page_size.max(1),
            ))
        }
        (None, Some(bss_group)) => {
            let name_offset = push_name(&mut strings, ".bss");
            sections.push(section(
                name_offset,
                SectionType::NoBits,
                SectionFlag::Allocable | SectionFlag::Writable,
                bss_group,
                base,
                4,
            ));

            Some(program(
                ProgramType::Load,
                ProgramFlag::Write | ProgramFlag::Read,
                bss_group,
                base,
                0,
                layout.page_size.max(1),
            ))
        }
        (None, None) => None,
    };

    if let Some(combined) = data_write_segment {
        programs.push(combined);
    }

    // Packed tightly right after the last section carrying real file bytes
    // (`.bss`, if present, occupies no file bytes and is skipped) — the
    // same convention `weld-asm`'s object writer uses for its own trailing
    // string table.
    let shstrtab_offset = sections
        .iter()
        .filter(|section| section.r#type != SectionType::NoBits && section.r#type != SectionType::Null)
        .map(|section| section.offset.0 + section.size.0)
        .max()
        .unwrap_or(File::SIZE as u32 + programs.len() as u32 * Program::SIZE);

    let shstrtab_index = sections.len() as u16;
    let shstrtab_name_offset = push_name(&mut strings, ".shstrtab");
    sections.push(Section {
        name: None,
        name_offset: Address(shstrtab_name_offset),
        r#type: SectionType::StringTable,
        flags: weld_object::elf32::SectionFlags::EMPTY,
        address: Address(0),
        offset: Address(shstrtab_offset),
        size: Address(strings.len() as u32),
        link: 0,
        information: 0,
        alignment: 1,
        entity_size: 0,
        data: Cow::Owned(strings),
    });

    File {
        endianness: Endianness::Little,
        version: Version::Current,
        os_abi: OsAbi::Standalone,
        r#type: FileType::ExecutableFile,
        processor_flags: 0,
        entry_point: Some(Address(entry_point)),
        programs,
        sections,
        section_index_for_section_names: shstrtab_index,
    }
}

#[cfg(test)]
mod tests {
    use weld_object::elf32::{ProgramFlag, SectionFlag, SectionFlags, SectionType};

    use super::build;
    use crate::loading::test_support::ObjectBuilder;

    /// `exec`/`rodata`/`data`/`bss` each produce one section, `data` and
    /// `bss` share one merged `PT_LOAD` program header, and the entry point
    /// names the image's `__main` address.
    #[test]
    fn builds_one_section_per_group_and_merges_data_bss_into_one_program() {
        let mut builder = ObjectBuilder::new();
        let main_section =
            builder.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0x1000, vec![0x90; 4], 4);
        builder.add_symbol("__main", Some(main_section), 0);
        builder.add_section(SectionType::ProgramData, SectionFlags::EMPTY, 0, vec![1, 2, 3, 4], 4);
        builder.add_section(
            SectionType::ProgramData,
            SectionFlag::Allocable | SectionFlag::Writable,
            0,
            vec![5, 6, 7, 8],
            4,
        );
        builder.add_section(
            SectionType::NoBits,
            SectionFlag::Allocable | SectionFlag::Writable,
            0,
            vec![0; 16],
            4,
        );
        let objects = vec![builder.build("a.o")];

        let (global, _) = crate::symbols::build(&objects).unwrap();
        let layout = crate::layout::build(&objects, global.main, 0x1000);
        let entry_point = layout.address_of(0, main_section).unwrap();

        let file = build(&layout, entry_point);

        assert_eq!(file.entry_point, Some(Address(entry_point)));

        let section_names: Vec<SectionType> = file.sections.iter().map(|section| section.r#type).collect();
        // NULL, .text, .rodata, .data, .bss, .shstrtab
        assert_eq!(section_names.len(), 6);
        assert_eq!(section_names[3], SectionType::ProgramData);
        assert_eq!(section_names[4], SectionType::NoBits);

        // exec, rodata, and one merged data+bss program header.
        assert_eq!(file.programs.len(), 3);
        let data_program = &file.programs[2];
        assert!(data_program.flags.contains(ProgramFlag::Write));
        assert!(data_program.flags.contains(ProgramFlag::Read));
        // `p_filesz` stops at the end of `.data`; `p_memsz` extends through `.bss`.
        assert_eq!(data_program.size_in_file, 4);
        assert_eq!(data_program.size_in_memory, 4 + 16);
    }
}
