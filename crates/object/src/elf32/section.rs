use std::{borrow::Cow, io};

use bstr::BStr;
use enumflags2::{bitflags, BitFlags};
use weld_object_macros::ReadWrite;

use super::{Address, RelocationIterator, SymbolIterator};
use crate::{combinators::*, Input, Number, Read, Result, Write};

/// Section header, plus the bytes it describes.
#[derive(Debug, PartialEq)]
pub struct Section<'a> {
    /// Name of the section, once [`super::File::fetch_section_names`] has
    /// run; `None` beforehand.
    pub name: Option<Cow<'a, BStr>>,
    /// Offset into `.shstrtab` of this section's name.
    pub(super) name_offset: Address,
    /// Type of the section.
    pub r#type: SectionType,
    /// Flags.
    pub flags: SectionFlags,
    /// Virtual address of the section in memory, for loaded sections.
    pub address: Address,
    /// Offset of the section's bytes in the file image.
    pub offset: Address,
    /// Size in bytes of the section. `NoBits` sections occupy no file bytes
    /// even though this is non-zero.
    pub size: Address,
    /// Associated section index (`.symtab`'s `link` points at `.strtab`,
    /// `.rel*`'s `link` points at `.symtab`).
    pub link: u32,
    /// Extra, section-type-dependent information (`.rel*`'s `info` names
    /// the section the relocations apply to).
    pub information: u32,
    /// Required alignment, or `0`/`1` for none. For the processor-specific
    /// `.pagesize` section, this crate instead stores the page size in
    /// `address` per the object format's convention.
    pub alignment: u32,
    /// Size, in bytes, of each entry, for sections holding fixed-size
    /// records (symbols, relocations).
    pub entity_size: u32,
    /// Raw bytes. Empty for `NoBits` sections.
    pub data: Cow<'a, [u8]>,
}

impl<'a> Section<'a> {
    /// Size, in bytes, of one section header table entry.
    pub const SIZE: u32 = 40;

    pub(crate) fn read<N, E>(input: Input<'a>, file: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (
            input,
            (name_offset, r#type, flags, address, offset, size, link, information, alignment, entity_size),
        ) = tuple((
            Address::read::<N, _>,
            SectionType::read::<N, _>,
            SectionFlags::read::<N, _>,
            Address::read::<N, _>,
            Address::read::<N, _>,
            Address::read::<N, _>,
            N::read_u32,
            N::read_u32,
            N::read_u32,
            N::read_u32,
        ))(input)?;

        let data = if r#type == SectionType::NoBits || size.0 == 0 {
            Cow::Borrowed(&[][..])
        } else {
            Cow::Borrowed(&file[offset.into()..][..size.into()])
        };

        let section = Self {
            name: None,
            name_offset,
            r#type,
            flags,
            address,
            offset,
            size,
            link,
            information,
            alignment,
            entity_size,
            data,
        };

        Ok((input, section))
    }

    /// Iterate over this section's bytes as an array of symbols. Only
    /// meaningful for [`SectionType::SymbolTable`] sections.
    pub fn symbols<'r, E>(&'r self, endianness: crate::Endianness) -> SymbolIterator<'r, E>
    where
        E: ParseError<Input<'r>>,
    {
        SymbolIterator::new(&self.data, endianness, self.entity_size)
    }

    /// Iterate over this section's bytes as an array of relocations. Only
    /// meaningful for [`SectionType::Relocation`] sections.
    pub fn relocations<'r, E>(&'r self, endianness: crate::Endianness) -> RelocationIterator<'r, E>
    where
        E: ParseError<Input<'r>>,
    {
        RelocationIterator::new(&self.data, endianness, self.entity_size)
    }

    /// Read a null-terminated string at `offset` into this section's bytes.
    /// Only meaningful for [`SectionType::StringTable`] sections.
    pub fn string_at_offset(&self, offset: usize) -> Option<Cow<'_, BStr>> {
        let bytes = self.data.get(offset..)?;
        let end = bytes.iter().position(|byte| *byte == 0)?;

        Some(Cow::Borrowed(BStr::new(&bytes[..end])))
    }
}

impl<'a> Write for Section<'a> {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        self.name_offset.write::<N, _>(buffer)?;
        self.r#type.write::<N, _>(buffer)?;
        self.flags.write::<N, _>(buffer)?;
        self.address.write::<N, _>(buffer)?;
        self.offset.write::<N, _>(buffer)?;
        self.size.write::<N, _>(buffer)?;
        buffer.write_all(&N::write_u32(self.link))?;
        buffer.write_all(&N::write_u32(self.information))?;
        buffer.write_all(&N::write_u32(self.alignment))?;
        buffer.write_all(&N::write_u32(self.entity_size))
    }
}

/// Section type.
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SectionType {
    /// Unused section header.
    Null = 0x00,
    /// Program-defined content (code or initialized data).
    ProgramData = 0x01,
    /// A linker symbol table.
    SymbolTable = 0x02,
    /// A string table.
    StringTable = 0x03,
    /// Uninitialized space (BSS); occupies no file bytes.
    NoBits = 0x08,
    /// `Rel`-style relocation entries (no addends).
    Relocation = 0x09,
    /// Processor-specific use — this toolchain's only use is the
    /// `.pagesize` section.
    LowProcessorSpecific = 0x7000_0000,
}

/// Section flag.
#[bitflags]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SectionFlag {
    /// The section contains writable data at runtime.
    Writable = 0x01,
    /// The section is allocated in the process image.
    Allocable = 0x02,
    /// The section contains executable instructions.
    Executable = 0x04,
}

/// Section flags.
pub type SectionFlags = BitFlags<SectionFlag>;

impl Read for SectionFlags {
    fn read<'a, N, E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (input, flags) = N::read_u32(input)?;
        let flags = Self::from_bits(flags)
            .map_err(|_| Err::Error(E::from_error_kind(input, ErrorKind::Alt)))?;

        Ok((input, flags))
    }
}

impl Write for SectionFlags {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u32(self.bits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BigEndian;

    #[test]
    fn test_section_round_trip() {
        let file: &[u8] = &[0x0, 0x61, 0x62, 0x63, 0x0];

        let section = Section {
            name: None,
            name_offset: Address(1),
            r#type: SectionType::StringTable,
            flags: SectionFlags::EMPTY,
            address: Address(0),
            offset: Address(0),
            size: Address(5),
            link: 0,
            information: 0,
            alignment: 1,
            entity_size: 0,
            data: Cow::Borrowed(file),
        };

        let mut buffer = Vec::new();
        section.write::<BigEndian, _>(&mut buffer).unwrap();

        let (remaining, parsed) = Section::read::<BigEndian, ()>(&buffer, file).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(parsed.r#type, SectionType::StringTable);
        assert_eq!(parsed.size, Address(5));
    }

    #[test]
    fn test_string_at_offset() {
        let section = Section {
            name: None,
            name_offset: Address(0),
            r#type: SectionType::StringTable,
            flags: SectionFlags::EMPTY,
            address: Address(0),
            offset: Address(0),
            size: Address(5),
            link: 0,
            information: 0,
            alignment: 1,
            entity_size: 0,
            data: Cow::Borrowed(&[0x0, b'a', b'b', b'c', 0x0]),
        };

        assert_eq!(section.string_at_offset(1).as_deref(), Some(BStr::new("abc")));
        assert_eq!(section.string_at_offset(0).as_deref(), Some(BStr::new("")));
    }
}
