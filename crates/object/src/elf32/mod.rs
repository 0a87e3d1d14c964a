//! Elf32 support.
//!
//! This is a deliberately small dialect: OSABI `Standalone`, machine
//! `None`, no dynamic linking, no `Rela` relocations — everything this
//! toolchain's linker needs to merge relocatable objects into one loadable
//! executable, and nothing else.

use std::{fmt, io, ops::Add};

use crate::{combinators::*, Input, Number, Read, Result, Write};

mod file;
mod program;
mod relocation;
mod section;
mod symbol;

pub use file::*;
pub use program::*;
pub use relocation::*;
pub use section::*;
pub use symbol::*;

/// An address within a 32-bit file: a virtual address, a file offset, or a
/// section-relative offset, depending on context.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Address(pub u32);

impl Read for Address {
    fn read<'a, N, E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (input, address) = N::read_u32(input)?;

        Ok((input, Address(address)))
    }
}

impl Write for Address {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u32(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "0x{:08x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, formatter)
    }
}

impl From<Address> for usize {
    fn from(value: Address) -> Self {
        value.0 as usize
    }
}

impl From<Address> for u32 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Read for Option<Address> {
    fn read<'a, N, E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (input, address) = Address::read::<N, E>(input)?;

        Ok((input, if address.0 == 0 { None } else { Some(address) }))
    }
}

impl Write for Option<Address> {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        match self {
            Some(address) => address.write::<N, _>(buffer),
            None => buffer.write_all(&N::write_u32(0)),
        }
    }
}

impl Add for Address {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0.checked_add(other.0).unwrap_or_else(|| {
            panic!("`{self} + {other}` has overflowed")
        }))
    }
}
