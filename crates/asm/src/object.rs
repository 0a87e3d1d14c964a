//! ELF32 relocatable object emission.
//!
//! Builds a single [`weld_object::elf32::File`] out of every used segment's
//! accumulated bytes, labels, and still-pending references, the way
//! `Assembler::write` does: a `.symtab`/`.strtab` pair, one
//! `PROGBITS`/`NOBITS` section per used segment, a `REL` section per segment
//! that still has pending references, and an optional `.pagesize` section
//! when the architecture declares one.

use std::{borrow::Cow, collections::HashMap};

use weld_arch::Architecture;
use weld_object::{
    elf32::{
        Address, Endianness, File, FileType, OsAbi, Relocation, RelocationType, Section,
        SectionFlag, SectionFlags, SectionType, Symbol, SymbolBinding, SymbolType, Version,
    },
    LittleEndian, Write as ObjectWrite,
};

use crate::segment::Segment;

/// Build a relocatable object file out of every segment the assembly unit
/// actually used, in declaration order.
pub(crate) fn build_object<'a>(
    architecture: &Architecture,
    segments: &'a HashMap<String, Segment>,
    used_segments: &[String],
) -> File<'a> {
    let mut sections = vec![null_section()];
    let mut strings = vec![0u8];
    let mut symbol_records: Vec<Symbol<'a>> = vec![undefined_symbol()];
    let mut symbol_index: HashMap<String, u32> = HashMap::new();

    // Placeholder; patched in once section indices are final.
    let symtab_index = sections.len() as u16;
    sections.push(Section {
        name: None,
        name_offset: Address(0),
        r#type: SectionType::SymbolTable,
        flags: SectionFlags::EMPTY,
        address: Address(0),
        offset: Address(0),
        size: Address(0),
        link: 0,
        information: 0,
        alignment: 4,
        entity_size: 16,
        data: Cow::Borrowed(&[]),
    });

    let mut relocation_sections = Vec::new();

    for name in used_segments {
        let Some(segment) = segments.get(name) else { continue };

        let section_type = if segment.ephemeral { SectionType::NoBits } else { SectionType::ProgramData };

        let mut flags = SectionFlag::Allocable.into();
        if !segment.read_only {
            flags |= SectionFlag::Writable;
        }
        if segment.executable {
            flags |= SectionFlag::Executable;
        }

        let section_name = format!(".{name}");
        let name_offset = strings.len() as u32;
        strings.extend_from_slice(section_name.as_bytes());
        strings.push(0);

        let size = if segment.ephemeral { segment.offset() } else { segment.data().len() as u32 };

        let section_index = sections.len() as u32;
        sections.push(Section {
            name: Some(Cow::Owned(section_name.into_bytes().into())),
            name_offset: Address(name_offset),
            r#type: section_type,
            flags,
            address: Address(segment.start_address()),
            offset: Address(0),
            size: Address(size),
            link: 0,
            information: 0,
            alignment: segment.align,
            entity_size: 0,
            data: if segment.ephemeral { Cow::Borrowed(&[]) } else { Cow::Owned(segment.data().to_vec()) },
        });

        let mut labels: Vec<_> = segment.labels().iter().collect();
        labels.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (label, offset) in labels {
            let name_offset = strings.len() as u32;
            strings.extend_from_slice(label.as_bytes());
            strings.push(0);

            let index = symbol_records.len() as u32;
            symbol_records.push(Symbol {
                name: None,
                name_offset: Address(name_offset),
                value: Address(*offset),
                size: 0,
                r#type: SymbolType::NoType,
                binding: SymbolBinding::Global,
                section_index: Some(section_index as u16),
            });
            symbol_index.insert(label.clone(), index);
        }

        if segment.references().is_empty() {
            continue;
        }

        let mut relocation_data = Vec::new();

        for reference in segment.references() {
            let symbol = *symbol_index.entry(reference.label.clone()).or_insert_with(|| {
                let name_offset = strings.len() as u32;
                strings.extend_from_slice(reference.label.as_bytes());
                strings.push(0);

                let index = symbol_records.len() as u32;
                symbol_records.push(Symbol {
                    name: None,
                    name_offset: Address(name_offset),
                    value: Address(0),
                    size: 0,
                    r#type: SymbolType::NoType,
                    binding: SymbolBinding::Global,
                    section_index: None,
                });

                index
            });

            let relocation = Relocation {
                offset: Address(reference.offset),
                symbol_index: symbol,
                r#type: relocation_type(reference.relocation_type),
            };
            relocation.write::<LittleEndian, _>(&mut relocation_data).expect("write to Vec never fails");
        }

        relocation_sections.push((section_index, relocation_data));
    }

    for (target_section, data) in relocation_sections {
        sections.push(Section {
            name: None,
            name_offset: Address(0),
            r#type: SectionType::Relocation,
            flags: SectionFlags::EMPTY,
            address: Address(0),
            offset: Address(0),
            size: Address(data.len() as u32),
            link: symtab_index as u32,
            information: target_section,
            alignment: 4,
            entity_size: 8,
            data: Cow::Owned(data),
        });
    }

    if architecture.page_size > 0 {
        sections.push(Section {
            name: None,
            name_offset: Address(0),
            r#type: SectionType::LowProcessorSpecific,
            flags: SectionFlags::EMPTY,
            address: Address(architecture.page_size),
            offset: Address(0),
            size: Address(0),
            link: 0,
            information: 0,
            alignment: 0,
            entity_size: 0,
            data: Cow::Borrowed(&[]),
        });
    }

    let mut symtab_data = Vec::new();
    for symbol in &symbol_records {
        symbol.write::<LittleEndian, _>(&mut symtab_data).expect("write to Vec never fails");
    }

    sections[symtab_index as usize].size = Address(symtab_data.len() as u32);
    sections[symtab_index as usize].link = sections.len() as u32;
    sections[symtab_index as usize].data = Cow::Owned(symtab_data);

    sections.push(Section {
        name: None,
        name_offset: Address(0),
        r#type: SectionType::StringTable,
        flags: SectionFlags::EMPTY,
        address: Address(0),
        offset: Address(0),
        size: Address(strings.len() as u32),
        link: 0,
        information: 0,
        alignment: 1,
        entity_size: 0,
        data: Cow::Owned(strings),
    });

    // Give every non-null, non-strtab section its name, so .shstrtab (added
    // below) can own its own independent string table.
    let (section_index_for_section_names, mut sections) = finalize_section_names(sections);

    // `File::write` lays section data out at the file offset each section
    // already names; a relocatable object has no program headers, so
    // sections pack tightly, back to back, right after the file header.
    assign_sequential_offsets(&mut sections);

    File {
        endianness: Endianness::Little,
        version: Version::Current,
        os_abi: OsAbi::Standalone,
        r#type: FileType::RelocatableFile,
        processor_flags: 0,
        entry_point: None,
        programs: Vec::new(),
        sections,
        section_index_for_section_names,
    }
}

fn null_section<'a>() -> Section<'a> {
    Section {
        name: None,
        name_offset: Address(0),
        r#type: SectionType::Null,
        flags: SectionFlags::EMPTY,
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

fn undefined_symbol<'a>() -> Symbol<'a> {
    Symbol {
        name: None,
        name_offset: Address(0),
        value: Address(0),
        size: 0,
        r#type: SymbolType::NoType,
        binding: SymbolBinding::Local,
        section_index: None,
    }
}

fn relocation_type(raw: u8) -> RelocationType {
    match raw {
        1 => RelocationType::Jump,
        4..=7 => RelocationType::Byte(raw - 4),
        _ => RelocationType::Byte(0),
    }
}

/// Append a `.shstrtab` section and point every section's name at it.
fn finalize_section_names<'a>(mut sections: Vec<Section<'a>>) -> (u16, Vec<Section<'a>>) {
    let mut shstrtab = vec![0u8];
    let section_names: Vec<String> = sections
        .iter()
        .map(|section| section.name.as_ref().map(|name| name.to_string()).unwrap_or_default())
        .collect();

    // Sections without an assigned human-readable name get one here, based
    // on their type (`.symtab`, `.strtab`, `.rel<segment>`, `.pagesize`).
    let mut rel_counter = 0usize;
    for (index, section) in sections.iter_mut().enumerate() {
        if section.r#type == SectionType::Null {
            continue;
        }

        let resolved = if !section_names[index].is_empty() {
            section_names[index].clone()
        } else {
            match section.r#type {
                SectionType::SymbolTable => ".symtab".to_string(),
                SectionType::StringTable => ".strtab".to_string(),
                SectionType::Relocation => {
                    rel_counter += 1;
                    format!(".rel{rel_counter}")
                }
                SectionType::LowProcessorSpecific => ".pagesize".to_string(),
                _ => String::new(),
            }
        };

        let offset = shstrtab.len() as u32;
        shstrtab.extend_from_slice(resolved.as_bytes());
        shstrtab.push(0);
        section.name_offset = Address(offset);
    }

    let shstrtab_index = sections.len() as u16;
    sections.push(Section {
        name: None,
        name_offset: Address(0),
        r#type: SectionType::StringTable,
        flags: SectionFlags::EMPTY,
        address: Address(0),
        offset: Address(0),
        size: Address(shstrtab.len() as u32),
        link: 0,
        information: 0,
        alignment: 1,
        entity_size: 0,
        data: Cow::Owned(shstrtab),
    });

    (shstrtab_index, sections)
}

/// Assign each section carrying real file bytes its final offset, packed
/// tightly in declaration order right after the file header — mirroring
/// exactly what [`weld_object::Write`]'s `File::write` does when laying
/// section data out, so the headers this crate writes describe where the
/// bytes actually land.
fn assign_sequential_offsets(sections: &mut [Section<'_>]) {
    let mut position = weld_object::elf32::File::SIZE as u32;

    for section in sections.iter_mut() {
        if section.r#type == SectionType::Null
            || section.r#type == SectionType::NoBits
            || section.size.0 == 0
        {
            continue;
        }

        section.offset = Address(position);
        position += section.data.len() as u32;
    }
}

/// Concatenate every non-ephemeral used segment's bytes, in declaration
/// order: the `-r` raw-output mode.
pub(crate) fn build_raw_output(segments: &HashMap<String, Segment>, used_segments: &[String]) -> Vec<u8> {
    let mut output = Vec::new();

    for name in used_segments {
        let Some(segment) = segments.get(name) else { continue };

        if segment.ephemeral {
            continue;
        }

        output.extend_from_slice(segment.data());
    }

    output
}

#[cfg(test)]
mod tests {
    use weld_arch::SegmentDescription;

    use super::*;
    use crate::segment::{PackTarget, Reference};

    fn architecture(page_size: u32) -> Architecture {
        Architecture {
            name: "demo".to_string(),
            data_width: 16,
            address_width: 16,
            addressable_width: 8,
            page_size,
            segments: Vec::new(),
            fragments: HashMap::new(),
            formats: HashMap::new(),
            instructions: HashMap::new(),
            indexed_instructions: HashMap::new(),
            relocations: HashMap::new(),
        }
    }

    fn text_description() -> SegmentDescription {
        SegmentDescription {
            name: "text".to_string(),
            start: 0,
            size: 0,
            align: 1,
            fill: false,
            ephemeral: false,
            read_only: false,
            executable: true,
            relocatable: true,
        }
    }

    fn bss_description() -> SegmentDescription {
        SegmentDescription {
            name: "bss".to_string(),
            start: 0x1000,
            size: 0,
            align: 1,
            fill: false,
            ephemeral: true,
            read_only: false,
            executable: false,
            relocatable: true,
        }
    }

    /// Every section a built object carries (`.text`, a `.rel` section, and
    /// both `.symtab`/`.strtab`) must read back with exactly the bytes,
    /// symbols, and relocations that went in — this is only true if every
    /// section's header actually names the offset its data was written at.
    #[test]
    fn build_object_round_trips_through_write_and_read() {
        let mut text = Segment::new(text_description());
        text.push_byte(0xde).unwrap();
        text.push_byte(0xad).unwrap();
        text.add_label("start");
        let mut bit = 0u8;
        text.pack(0, 16, PackTarget::Cursor, &mut bit).unwrap();
        text.add_reference(Reference {
            label: "external".to_string(),
            offset: 2,
            bit: 0,
            width: 16,
            shift: 0,
            relative: 0,
            relocation_type: 4,
        });

        let mut bss = Segment::new(bss_description());
        bss.set_offset(0x1010).unwrap();

        let mut segments = HashMap::new();
        segments.insert("text".to_string(), text);
        segments.insert("bss".to_string(), bss);

        let used_segments = vec!["text".to_string(), "bss".to_string()];
        let architecture = architecture(4096);

        let file = build_object(&architecture, &segments, &used_segments);

        let mut buffer = Vec::new();
        file.write(&mut buffer).unwrap();

        let (remaining, mut parsed) = File::read::<()>(&buffer).unwrap();
        assert!(remaining.is_empty());

        parsed.fetch_section_names();

        let text_section =
            parsed.sections.iter().find(|section| section.name.as_deref() == Some(bstr::BStr::new(".text"))).unwrap();
        assert_eq!(text_section.data.as_ref(), &[0xde, 0xad, 0x00, 0x00]);

        let bss_section =
            parsed.sections.iter().find(|section| section.name.as_deref() == Some(bstr::BStr::new(".bss"))).unwrap();
        assert_eq!(bss_section.r#type, SectionType::NoBits);
        assert_eq!(bss_section.size, Address(0x10));

        let symtab = parsed.sections.iter().find(|section| section.r#type == SectionType::SymbolTable).unwrap();
        let endianness = parsed.endianness.into();
        let symbols: Vec<_> = symtab.symbols::<()>(endianness).map(Result::unwrap).collect();
        // The null entry, `start` (defined, in `.text`), and `external`
        // (undefined, carried only because a relocation names it).
        assert_eq!(symbols.len(), 3);
        assert!(symbols.iter().any(|symbol| symbol.section_index.is_none()));

        let relocation_section =
            parsed.sections.iter().find(|section| section.r#type == SectionType::Relocation).unwrap();
        let relocations: Vec<_> = relocation_section.relocations::<()>(endianness).map(Result::unwrap).collect();
        assert_eq!(relocations.len(), 1);
        assert_eq!(relocations[0].offset, Address(2));
        assert_eq!(relocations[0].r#type, RelocationType::Byte(0));

        let pagesize_section =
            parsed.sections.iter().find(|section| section.r#type == SectionType::LowProcessorSpecific).unwrap();
        assert_eq!(pagesize_section.address, Address(4096));
    }
}
