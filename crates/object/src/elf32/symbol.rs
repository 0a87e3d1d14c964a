use std::{borrow::Cow, marker::PhantomData, result::Result as StdResult};

use bstr::BStr;
use nom::Offset;

use super::Address;
use crate::{combinators::*, BigEndian, Endianness, Input, LittleEndian, Number, Read, Result, Write};

/// A symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol<'a> {
    /// Name of the symbol, once resolved against a `.strtab` section.
    pub name: Option<Cow<'a, BStr>>,
    /// Offset, in bytes, into the linked `.strtab`. Zero means unnamed.
    pub name_offset: Address,
    /// Value: a section-relative offset in a relocatable object, or a
    /// virtual address in an executable.
    pub value: Address,
    /// Size of the object this symbol refers to, or `0` if unknown.
    pub size: u32,
    /// Kind of entity this symbol names.
    pub r#type: SymbolType,
    /// Visibility/scope of the symbol.
    pub binding: SymbolBinding,
    /// Index of the section this symbol is defined in, or `None` if the
    /// symbol is undefined (the linker must resolve it against another
    /// object's global symbol table).
    pub section_index: Option<u16>,
}

impl<'a> Read for Symbol<'a> {
    fn read<'r, N, E>(input: Input<'r>) -> Result<'r, Self, E>
    where
        N: Number,
        E: ParseError<Input<'r>>,
    {
        let (input, (name_offset, value, size, binding, r#type, _other, section_index)) =
            tuple((
                Address::read::<N, _>,
                Address::read::<N, _>,
                N::read_u32,
                SymbolBinding::read::<N, _>,
                SymbolType::read::<N, _>,
                N::read_u8,
                N::read_u16,
            ))(input)?;

        let section_index = if section_index == 0 { None } else { Some(section_index) };

        Ok((
            input,
            Self { name: None, name_offset, value, size, r#type, binding, section_index },
        ))
    }
}

impl<'a> Write for Symbol<'a> {
    fn write<N, B>(&self, buffer: &mut B) -> std::io::Result<()>
    where
        N: Number,
        B: std::io::Write,
    {
        self.name_offset.write::<N, _>(buffer)?;
        self.value.write::<N, _>(buffer)?;
        buffer.write_all(&N::write_u32(self.size))?;

        let binding: u8 = self.binding.into();
        let r#type: u8 = self.r#type.into();
        buffer.write_all(&N::write_u8((binding << 4) | (r#type & 0x0f)))?;
        buffer.write_all(&N::write_u8(0))?;
        buffer.write_all(&N::write_u16(self.section_index.unwrap_or(0)))
    }
}

/// Symbol binding (scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    /// Not visible outside the object file.
    Local = 0x00,
    /// Visible to every object file the linker merges.
    Global = 0x01,
    /// Global scope, but with lower precedence than [`SymbolBinding::Global`].
    Weak = 0x02,
}

impl From<SymbolBinding> for u8 {
    fn from(value: SymbolBinding) -> Self {
        match value {
            SymbolBinding::Local => 0x00,
            SymbolBinding::Global => 0x01,
            SymbolBinding::Weak => 0x02,
        }
    }
}

impl Read for SymbolBinding {
    fn read<'a, N, E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        let (input, binding) = N::read_u8(input)?;

        Ok((
            input,
            match binding >> 4 {
                0x00 => Self::Local,
                0x01 => Self::Global,
                _ => Self::Weak,
            },
        ))
    }
}

/// Symbol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    /// No type specified.
    NoType = 0x00,
    /// Data object.
    Object = 0x01,
    /// Function entry point.
    Function = 0x02,
    /// Associated with a section.
    Section = 0x03,
    /// Source file that produced the object.
    File = 0x04,
}

impl From<SymbolType> for u8 {
    fn from(value: SymbolType) -> Self {
        match value {
            SymbolType::NoType => 0x00,
            SymbolType::Object => 0x01,
            SymbolType::Function => 0x02,
            SymbolType::Section => 0x03,
            SymbolType::File => 0x04,
        }
    }
}

impl Read for SymbolType {
    fn read<'a, N, E>(input: Input<'a>) -> Result<'a, Self, E>
    where
        N: Number,
        E: ParseError<Input<'a>>,
    {
        // `SymbolBinding::read` doesn't consume input: binding and type
        // share the same byte.
        let (input, r#type) = N::read_u8(input)?;

        Ok((
            input,
            match r#type & 0x0f {
                0x01 => Self::Object,
                0x02 => Self::Function,
                0x03 => Self::Section,
                0x04 => Self::File,
                _ => Self::NoType,
            },
        ))
    }
}

/// An iterator producing [`Symbol`]s out of a `.symtab` section's bytes.
pub struct SymbolIterator<'a, E>
where
    E: ParseError<Input<'a>>,
{
    input: Input<'a>,
    endianness: Endianness,
    entity_size: u32,
    _phantom: PhantomData<E>,
}

impl<'a, E> SymbolIterator<'a, E>
where
    E: ParseError<Input<'a>>,
{
    pub(super) fn new(input: Input<'a>, endianness: Endianness, entity_size: u32) -> Self {
        Self { input, endianness, entity_size, _phantom: PhantomData }
    }
}

impl<'a, E> Iterator for SymbolIterator<'a, E>
where
    E: ParseError<Input<'a>>,
{
    type Item = StdResult<Symbol<'a>, Err<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }

        let read = match self.endianness {
            Endianness::Big => Symbol::read::<BigEndian, E>(self.input),
            Endianness::Little => Symbol::read::<LittleEndian, E>(self.input),
        };

        match read {
            Ok((next_input, symbol)) => {
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

                Some(Ok(symbol))
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
    fn test_symbol_round_trip() {
        let symbol = Symbol {
            name: None,
            name_offset: Address(1),
            value: Address(7),
            size: 4,
            r#type: SymbolType::Function,
            binding: SymbolBinding::Global,
            section_index: Some(2),
        };

        let mut buffer = Vec::new();
        symbol.write::<BigEndian, _>(&mut buffer).unwrap();

        assert_eq!(Symbol::read::<BigEndian, ()>(&buffer), Ok((&[] as &[u8], symbol)));
    }

    #[test]
    fn test_undefined_symbol_round_trip() {
        let symbol = Symbol {
            name: None,
            name_offset: Address(3),
            value: Address(0),
            size: 0,
            r#type: SymbolType::NoType,
            binding: SymbolBinding::Global,
            section_index: None,
        };

        let mut buffer = Vec::new();
        symbol.write::<BigEndian, _>(&mut buffer).unwrap();

        let (_, parsed) = Symbol::read::<BigEndian, ()>(&buffer).unwrap();
        assert_eq!(parsed.section_index, None);
    }
}
