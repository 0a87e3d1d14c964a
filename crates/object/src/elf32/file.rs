use std::io;

use weld_object_macros::ReadWrite;

use super::{Address, Program, Section, SectionType};
use crate::{combinators::*, BigEndian, Input, LittleEndian, Number, Read, Result, Write};

/// An ELF32 object or executable file: the assembler's output and the
/// linker's input and output.
#[derive(Debug)]
pub struct File<'a> {
    /// Byte order the rest of the file is encoded in.
    pub endianness: Endianness,
    /// Format version; always [`Version::Current`] once written.
    pub version: Version,
    /// OS ABI; always [`OsAbi::Standalone`] for this toolchain.
    pub os_abi: OsAbi,
    /// Whether this is a relocatable object or a linked executable.
    pub r#type: FileType,
    /// Processor-specific flags; unused by this toolchain, always `0`.
    pub processor_flags: u32,
    /// Entry point virtual address; `None` in a relocatable object.
    pub entry_point: Option<Address>,
    /// Program (segment) headers; empty in a relocatable object.
    pub programs: Vec<Program<'a>>,
    /// Section headers.
    pub sections: Vec<Section<'a>>,
    /// Index, into [`Self::sections`], of the `.shstrtab` section.
    pub section_index_for_section_names: u16,
}

impl<'a> File<'a> {
    /// Magic number every Elf file starts with.
    pub const MAGIC: &'static [u8; 4] = &[0x7f, b'E', b'L', b'F'];

    /// `EI_CLASS` for 32-bit objects.
    pub const CLASS: &'static [u8; 1] = &[0x01];

    /// Size, in bytes, of the file header.
    pub const SIZE: u16 = 52;

    /// Parse an object or executable file.
    pub fn read<E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        E: ParseError<Input<'a>>,
    {
        let file = input;

        let (input, (_magic, _class, endianness)) =
            tuple((tag(Self::MAGIC), tag(Self::CLASS), Endianness::read::<LittleEndian, _>))(
                input,
            )?;

        match endianness {
            Endianness::Big => Self::read_with_endianness::<BigEndian, _>(file, input, endianness),
            Endianness::Little => {
                Self::read_with_endianness::<LittleEndian, _>(file, input, endianness)
            }
        }
    }

    fn read_with_endianness<N, E>(
        file: Input<'a>,
        input: Input<'a>,
        endianness: Endianness,
    ) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (
            _input,
            (
                version,
                os_abi,
                _e_ident_tail,
                r#type,
                _machine,
                _version_bis,
                entry_point,
                ph_offset,
                sh_offset,
                processor_flags,
                _eh_size,
                ph_entry_size,
                ph_number,
                sh_entry_size,
                sh_number,
                section_index_for_section_names,
            ),
        ) = tuple((
            Version::read::<N, _>,
            OsAbi::read::<N, _>,
            skip(8usize),
            FileType::read::<N, _>,
            Machine::read::<N, _>,
            N::read_u32,
            <Option<Address> as Read>::read::<N, _>,
            Address::read::<N, _>,
            Address::read::<N, _>,
            N::read_u32,
            skip(2usize),
            N::read_u16,
            N::read_u16,
            N::read_u16,
            N::read_u16,
            N::read_u16,
        ))(input)?;

        let mut programs = Vec::with_capacity(ph_number as usize);

        if ph_entry_size > 0 {
            for ph_slice in
                file[ph_offset.into()..].chunks_exact(ph_entry_size as usize).take(ph_number as usize)
            {
                let (_, ph) = Program::read::<N, _>(file, ph_slice)?;
                programs.push(ph);
            }
        }

        let mut sections = Vec::with_capacity(sh_number as usize);

        if sh_entry_size > 0 {
            for sh_slice in
                file[sh_offset.into()..].chunks_exact(sh_entry_size as usize).take(sh_number as usize)
            {
                let (_, sh) = Section::read::<N, _>(sh_slice, file)?;
                sections.push(sh);
            }
        }

        let file = Self {
            endianness,
            version,
            os_abi,
            r#type,
            processor_flags,
            entry_point,
            programs,
            sections,
            section_index_for_section_names,
        };

        Ok((&[], file))
    }

    /// Fetch every section's name out of the `.shstrtab` section.
    pub fn fetch_section_names(&mut self) {
        let index = self.section_index_for_section_names as usize;

        if self.sections.is_empty()
            || index >= self.sections.len()
            || self.sections[index].r#type != SectionType::StringTable
        {
            return;
        }

        let (left, right) = self.sections.split_at_mut(index);
        let (names, right) = right.split_first_mut().expect("section names section must be present");

        for section in left.iter_mut().chain(right.iter_mut()) {
            section.name = names.string_at_offset(section.name_offset.into()).map(Into::into);
        }
    }

    /// Find the page size the architecture declared, if the object carries
    /// the processor-specific `.pagesize` section.
    pub fn page_size(&self) -> Option<u32> {
        self.sections
            .iter()
            .find(|section| section.r#type == SectionType::LowProcessorSpecific)
            .map(|section| section.address.0)
    }

    /// Serialize the file: Ehdr, Phdrs, section data (each placed at the
    /// offset its [`Section::offset`] already names), then the section
    /// header table.
    ///
    /// Every address/offset decision beyond raw file layout (where a
    /// section ends up in memory, which sections exist) is the linker's —
    /// this only lays bytes out in the order ELF requires and computes the
    /// two offsets ELF serialization itself is responsible for:
    /// `e_phoff`/`e_shoff` and the padding needed to reach each section's
    /// stored file offset.
    pub fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        match self.endianness {
            crate::Endianness::Big => self.write_with_endianness::<BigEndian, _>(buffer),
            crate::Endianness::Little => self.write_with_endianness::<LittleEndian, _>(buffer),
        }
    }

    fn write_with_endianness<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        let ph_offset: u32 = if self.programs.is_empty() { 0 } else { Self::SIZE as u32 };
        let ph_end = Self::SIZE as u32 + self.programs.len() as u32 * Program::SIZE;

        let data_end = self.sections.iter().fold(ph_end, |end, section| {
            if section.r#type == SectionType::NoBits {
                end
            } else {
                end.max(section.offset.0 + section.size.0)
            }
        });
        let sh_offset = round_up(data_end, 4);

        buffer.write_all(Self::MAGIC)?;
        buffer.write_all(Self::CLASS)?;

        let endianness: Endianness = self.endianness.into();
        endianness.write::<N, _>(buffer)?;
        self.version.write::<N, _>(buffer)?;
        self.os_abi.write::<N, _>(buffer)?;
        buffer.write_all(&[0u8; 8])?;
        self.r#type.write::<N, _>(buffer)?;
        Machine::None.write::<N, _>(buffer)?;
        buffer.write_all(&N::write_u32(1))?;
        self.entry_point.write::<N, _>(buffer)?;
        Address(ph_offset).write::<N, _>(buffer)?;
        Address(sh_offset).write::<N, _>(buffer)?;
        buffer.write_all(&N::write_u32(self.processor_flags))?;
        buffer.write_all(&N::write_u16(Self::SIZE))?;
        buffer.write_all(&N::write_u16(if self.programs.is_empty() { 0 } else { Program::SIZE as u16 }))?;
        buffer.write_all(&N::write_u16(self.programs.len() as u16))?;
        buffer.write_all(&N::write_u16(Section::SIZE as u16))?;
        buffer.write_all(&N::write_u16(self.sections.len() as u16))?;
        buffer.write_all(&N::write_u16(self.section_index_for_section_names))?;

        for program in &self.programs {
            program.write::<N, _>(buffer)?;
        }

        let mut position = ph_end;
        for section in &self.sections {
            if section.r#type == SectionType::NoBits || section.size.0 == 0 {
                continue;
            }

            if section.offset.0 > position {
                buffer.write_all(&vec![0u8; (section.offset.0 - position) as usize])?;
                position = section.offset.0;
            }

            buffer.write_all(&section.data)?;
            position += section.data.len() as u32;
        }

        if sh_offset > position {
            buffer.write_all(&vec![0u8; (sh_offset - position) as usize])?;
        }

        for section in &self.sections {
            section.write::<N, _>(buffer)?;
        }

        Ok(())
    }
}

/// Round `value` up to the next multiple of `alignment`. `alignment` must
/// be a power of two.
fn round_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Byte order of the file, read from `e_ident[EI_DATA]`.
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Endianness {
    /// Little endian.
    Little = 0x01,
    /// Big endian.
    Big = 0x02,
}

impl From<Endianness> for crate::Endianness {
    fn from(value: Endianness) -> Self {
        match value {
            Endianness::Little => crate::Endianness::Little,
            Endianness::Big => crate::Endianness::Big,
        }
    }
}

/// Object file format version.
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Version {
    /// Invalid version.
    None = 0x00,
    /// The only version this toolchain emits or reads.
    Current = 0x01,
}

/// OS/ABI this toolchain's object files declare.
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsAbi {
    /// Standalone (no host OS) application — always what this toolchain
    /// writes.
    Standalone = 0xff,
}

/// Type of the file.
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FileType {
    /// Relocatable object, as produced by the assembler.
    RelocatableFile = 0x01,
    /// Linked, loadable executable, as produced by the linker.
    ExecutableFile = 0x02,
}

/// Target machine. This toolchain is retargetable at the architecture-table
/// level, not at the ELF `e_machine` level, so it always writes
/// [`Machine::None`].
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Machine {
    /// No specific instruction set named in the object file itself.
    None = 0x00,
}
