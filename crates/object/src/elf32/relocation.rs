use std::{marker::PhantomData, result::Result as StdResult};

use nom::Offset;

use super::Address;
use crate::{combinators::*, BigEndian, Endianness, Input, LittleEndian, Number, Read, Result, Write};

/// A `Rel`-style relocation record: no addend, the addend already lives in
/// the bytes at `offset` (this toolchain always writes relocatable fields
/// with their assembly-time value, even when that value will be
/// overwritten).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Offset, relative to the start of the section the relocation applies
    /// to, of the field to patch.
    pub offset: Address,
    /// Index into the linked `.symtab` of the symbol this relocation
    /// resolves against.
    pub symbol_index: u32,
    /// How to patch the field.
    pub r#type: RelocationType,
}

impl Read for Relocation {
    fn read<'a, N, E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (input, (offset, info)) = tuple((Address::read::<N, _>, N::read_u32))(input)?;

        let symbol_index = info >> 8;
        let r#type = RelocationType::from_raw(info as u8)
            .ok_or_else(|| Err::Error(E::from_error_kind(input, ErrorKind::Alt)))?;

        Ok((input, Self { offset, symbol_index, r#type }))
    }
}

impl Write for Relocation {
    fn write<N, B>(&self, buffer: &mut B) -> std::io::Result<()>
    where
        N: Number,
        B: std::io::Write,
    {
        self.offset.write::<N, _>(buffer)?;

        let info = (self.symbol_index << 8) | (self.r#type.as_raw() as u32);
        buffer.write_all(&N::write_u32(info))
    }
}

/// The kind of fixup a [`Relocation`] describes.
///
/// Named and numbered after the toolchain's own processor-specific
/// convention, not a generic ELF machine's relocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationType {
    /// Patch a 28-bit absolute address, right-shifted by 1, across 4 bytes
    /// starting at `offset`; the top nibble of the shifted value is merged
    /// into the low nibble of `data[offset]`.
    Jump,
    /// Patch byte `n` (`n` in `0..=3`) of a little-endian 32-bit value at
    /// `data[offset]`.
    Byte(u8),
}

impl RelocationType {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Jump),
            4..=7 => Some(Self::Byte(raw - 4)),
            _ => None,
        }
    }

    fn as_raw(self) -> u8 {
        match self {
            Self::Jump => 1,
            Self::Byte(n) => 4 + n,
        }
    }
}

/// An iterator producing [`Relocation`]s out of a `.rel*` section's bytes.
pub struct RelocationIterator<'a, E>
where
    E: ParseError<Input<'a>>,
{
    input: Input<'a>,
    endianness: Endianness,
    entity_size: u32,
    _phantom: PhantomData<E>,
}

impl<'a, E> RelocationIterator<'a, E>
where
    E: ParseError<Input<'a>>,
{
    pub(super) fn new(input: Input<'a>, endianness: Endianness, entity_size: u32) -> Self {
        Self { input, endianness, entity_size, _phantom: PhantomData }
    }
}

impl<'a, E> Iterator for RelocationIterator<'a, E>
where
    E: ParseError<Input<'a>>,
{
    type Item = StdResult<Relocation, Err<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }

        let read = match self.endianness {
            Endianness::Big => Relocation::read::<BigEndian, E>(self.input),
            Endianness::Little => Relocation::read::<LittleEndian, E>(self.input),
        };

        match read {
            Ok((next_input, relocation)) => {
                if self.entity_size > 0 {
                    let consumed = self.input.offset(next_input);
                    if consumed != self.entity_size as usize {
                        return Some(Err(Err::Error(E::from_error_kind(
                            self.input,
                            ErrorKind::LengthValue,
                        ))));
                    }
                }

                self.input = next_input;

                Some(Ok(relocation))
            }

            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BigEndian;

    #[test]
    fn test_relocation_round_trip() {
        let relocation = Relocation { offset: Address(4), symbol_index: 3, r#type: RelocationType::Jump };

        let mut buffer = Vec::new();
        relocation.write::<BigEndian, _>(&mut buffer).unwrap();

        assert_eq!(Relocation::read::<BigEndian, ()>(&buffer), Ok((&[] as &[u8], relocation)));
    }

    #[test]
    fn test_relocation_byte_variants() {
        for n in 0..4u8 {
            let relocation =
                Relocation { offset: Address(0), symbol_index: 1, r#type: RelocationType::Byte(n) };

            let mut buffer = Vec::new();
            relocation.write::<BigEndian, _>(&mut buffer).unwrap();

            assert_eq!(Relocation::read::<BigEndian, ()>(&buffer), Ok((&[] as &[u8], relocation)));
        }
    }
}
