use std::borrow::Cow;

use enumflags2::{bitflags, BitFlags};
use weld_object_macros::ReadWrite;

use super::Address;
use crate::{combinators::*, Input, Number, Read, Result, Write};

/// Program (segment) header, plus the bytes it describes.
#[derive(Debug)]
pub struct Program<'a> {
    /// Kind of segment.
    pub r#type: ProgramType,
    /// Offset of the segment in the file image.
    pub offset: Address,
    /// Virtual address the segment is loaded at.
    pub virtual_address: Address,
    /// Physical address; equal to `virtual_address` on this toolchain,
    /// which never targets a system where the two differ.
    pub physical_address: Address,
    /// Size in bytes of the segment in the file image. Excludes any
    /// `NoBits` section the segment covers.
    pub size_in_file: u32,
    /// Size in bytes of the segment once loaded into memory. Includes
    /// `NoBits` sections.
    pub size_in_memory: u32,
    /// Runtime permissions.
    pub flags: ProgramFlags,
    /// Required alignment; `0`/`1` mean none.
    pub alignment: u32,
    /// Bytes of the segment's file image (empty past `size_in_file`).
    pub data: Cow<'a, [u8]>,
}

impl<'a> Program<'a> {
    /// Size, in bytes, of one program header table entry.
    pub const SIZE: u32 = 32;

    pub(crate) fn read<N, E>(file: Input<'a>, input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (
            input,
            (r#type, offset, virtual_address, physical_address, size_in_file, size_in_memory, flags, alignment),
        ) = tuple((
            ProgramType::read::<N, _>,
            Address::read::<N, _>,
            Address::read::<N, _>,
            Address::read::<N, _>,
            N::read_u32,
            N::read_u32,
            ProgramFlag::read_bits::<N, _>,
            N::read_u32,
        ))(input)?;

        let program = Self {
            r#type,
            offset,
            virtual_address,
            physical_address,
            size_in_file,
            size_in_memory,
            flags,
            alignment,
            data: Cow::Borrowed(&file[offset.into()..][..size_in_file as usize]),
        };

        Ok((input, program))
    }
}

impl<'a> Write for Program<'a> {
    fn write<N, B>(&self, buffer: &mut B) -> std::io::Result<()>
    where
        N: Number,
        B: std::io::Write,
    {
        self.r#type.write::<N, _>(buffer)?;
        self.offset.write::<N, _>(buffer)?;
        self.virtual_address.write::<N, _>(buffer)?;
        self.physical_address.write::<N, _>(buffer)?;
        buffer.write_all(&N::write_u32(self.size_in_file))?;
        buffer.write_all(&N::write_u32(self.size_in_memory))?;
        buffer.write_all(&N::write_u32(self.flags.bits()))?;
        buffer.write_all(&N::write_u32(self.alignment))
    }
}

/// Segment type.
#[derive(ReadWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramType {
    /// Unused program header table entry.
    Null = 0x00,
    /// Loadable segment.
    Load = 0x01,
}

/// Segment runtime permission flag.
#[bitflags]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramFlag {
    /// Executable.
    Execute = 0x1,
    /// Writable.
    Write = 0x2,
    /// Readable.
    Read = 0x4,
}

/// Segment runtime permissions.
pub type ProgramFlags = BitFlags<ProgramFlag>;

impl ProgramFlag {
    pub(crate) fn read_bits<'a, N, E>(input: Input<'a>) -> Result<'a, ProgramFlags, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (input, flags) = N::read_u32(input)?;
        let flags = ProgramFlags::from_bits(flags)
            .map_err(|_| Err::Error(E::from_error_kind(input, ErrorKind::Alt)))?;

        Ok((input, flags))
    }
}
