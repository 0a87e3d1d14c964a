//! Reading every input object into memory.
//!
//! Every object's bytes are read synchronously and completely before any of
//! them are parsed, then kept alive for the rest of the link: every
//! [`weld_object::elf32::File`] below borrows its section/symbol/relocation
//! bytes straight out of its own entry in `buffers`, so the caller must keep
//! that vector alive for as long as the returned [`LoadedObject`]s are used.

use std::path::PathBuf;

use weld_file::{FileReader, Picker};
use weld_object::elf32::File;

use crate::error::Error;

/// One input object, parsed and with its section names already resolved.
pub(crate) struct LoadedObject<'a> {
    pub(crate) path: PathBuf,
    pub(crate) file: File<'a>,
}

/// Read every input file's bytes into `buffers`, then parse each one,
/// borrowing from its entry.
pub(crate) fn read_all(input_files: &[PathBuf]) -> Result<Vec<(PathBuf, Vec<u8>)>, Error> {
    input_files
        .iter()
        .map(|path| {
            let reader =
                Picker::open(path).map_err(|error| Error::Io(path.clone(), error.to_string()))?;
            let bytes = reader.read_as_bytes().map_err(|error| Error::Io(path.clone(), error.to_string()))?;

            Ok((path.clone(), bytes))
        })
        .collect()
}

/// Parse every buffer read by [`read_all`] into a [`LoadedObject`].
pub(crate) fn parse_all<'a>(buffers: &'a [(PathBuf, Vec<u8>)]) -> Result<Vec<LoadedObject<'a>>, Error> {
    buffers
        .iter()
        .map(|(path, bytes)| {
            let (_, mut file) =
                File::read::<()>(bytes).map_err(|_| Error::ParsingObject(path.clone()))?;
            file.fetch_section_names();

            Ok(LoadedObject { path: path.clone(), file })
        })
        .collect()
}

/// In-memory [`LoadedObject`] construction, shared by every linker test
/// module that needs a relocatable object without going through the
/// assembler or the filesystem.
#[cfg(test)]
pub(crate) mod test_support {
    use std::borrow::Cow;

    use weld_object::{
        elf32::{
            Address, Endianness, FileType, OsAbi, Relocation, RelocationType, Section,
            SectionFlags, SectionType, Symbol, SymbolBinding, SymbolType, Version,
        },
        LittleEndian, Write as ObjectWrite,
    };

    use super::{File, LoadedObject};

    fn null_section() -> Section<'static> {
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

    /// Builds a minimal relocatable object one section/symbol/relocation at
    /// a time, the way [`crate::symbols::build`] expects to read one.
    pub(crate) struct ObjectBuilder {
        sections: Vec<Section<'static>>,
        symbols: Vec<Symbol<'static>>,
        strings: Vec<u8>,
    }

    impl ObjectBuilder {
        pub(crate) fn new() -> Self {
            Self {
                sections: vec![null_section()],
                symbols: vec![Symbol {
                    name: None,
                    name_offset: Address(0),
                    value: Address(0),
                    size: 0,
                    r#type: SymbolType::NoType,
                    binding: SymbolBinding::Local,
                    section_index: None,
                }],
                strings: vec![0u8],
            }
        }

        /// Add a `PROGBITS`/`NOBITS` section, returning its index.
        pub(crate) fn add_section(
            &mut self,
            r#type: SectionType,
            flags: SectionFlags,
            address: u32,
            data: Vec<u8>,
            alignment: u32,
        ) -> u16 {
            let size = data.len() as u32;
            let index = self.sections.len() as u16;
            self.sections.push(Section {
                name: None,
                name_offset: Address(0),
                r#type,
                flags,
                address: Address(address),
                offset: Address(0),
                size: Address(size),
                link: 0,
                information: 0,
                alignment,
                entity_size: 0,
                data: Cow::Owned(data),
            });
            index
        }

        /// Add a global symbol (defined, if `section_index` is `Some`, else
        /// undefined), returning its `.symtab` index for use as a
        /// relocation's `symbol_index`.
        pub(crate) fn add_symbol(&mut self, name: &str, section_index: Option<u16>, value: u32) -> u32 {
            let name_offset = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);

            let index = self.symbols.len() as u32;
            self.symbols.push(Symbol {
                name: None,
                name_offset: Address(name_offset),
                value: Address(value),
                size: 0,
                r#type: SymbolType::NoType,
                binding: SymbolBinding::Global,
                section_index,
            });
            index
        }

        /// Add a `REL` section applying to `target_section`, returning its
        /// index.
        pub(crate) fn add_relocations(
            &mut self,
            target_section: u16,
            relocations: &[(u32, u32, RelocationType)],
        ) -> u16 {
            let mut data = Vec::new();
            for &(offset, symbol_index, r#type) in relocations {
                Relocation { offset: Address(offset), symbol_index, r#type }
                    .write::<LittleEndian, _>(&mut data)
                    .expect("write to Vec never fails");
            }

            let index = self.sections.len() as u16;
            self.sections.push(Section {
                name: None,
                name_offset: Address(0),
                r#type: SectionType::Relocation,
                flags: SectionFlags::EMPTY,
                address: Address(0),
                offset: Address(0),
                size: Address(data.len() as u32),
                link: 0,
                information: target_section as u32,
                alignment: 4,
                entity_size: 8,
                data: Cow::Owned(data),
            });
            index
        }

        /// Finish building: append the `.symtab`/`.strtab` pair and hand
        /// back a [`LoadedObject`] with the given path.
        pub(crate) fn build(mut self, path: &str) -> LoadedObject<'static> {
            let mut symtab_data = Vec::new();
            for symbol in &self.symbols {
                symbol.write::<LittleEndian, _>(&mut symtab_data).expect("write to Vec never fails");
            }

            let strtab_index = self.sections.len() as u16 + 1;
            self.sections.push(Section {
                name: None,
                name_offset: Address(0),
                r#type: SectionType::SymbolTable,
                flags: SectionFlags::EMPTY,
                address: Address(0),
                offset: Address(0),
                size: Address(symtab_data.len() as u32),
                link: strtab_index as u32,
                information: 0,
                alignment: 4,
                entity_size: 16,
                data: Cow::Owned(symtab_data),
            });

            self.sections.push(Section {
                name: None,
                name_offset: Address(0),
                r#type: SectionType::StringTable,
                flags: SectionFlags::EMPTY,
                address: Address(0),
                offset: Address(0),
                size: Address(self.strings.len() as u32),
                link: 0,
                information: 0,
                alignment: 1,
                entity_size: 0,
                data: Cow::Owned(self.strings),
            });

            LoadedObject {
                path: path.into(),
                file: File {
                    endianness: Endianness::Little,
                    version: Version::Current,
                    os_abi: OsAbi::Standalone,
                    r#type: FileType::RelocatableFile,
                    processor_flags: 0,
                    entry_point: None,
                    programs: Vec::new(),
                    sections: self.sections,
                    section_index_for_section_names: 0,
                },
            }
        }
    }
}

