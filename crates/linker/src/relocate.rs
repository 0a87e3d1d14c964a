//! Applying relocations against the final layout.
//!
//! Every chunk's bytes were copied into [`crate::layout::Chunk::data`]
//! verbatim from its source object. This pass walks each input object's
//! `.rel*` sections a second time and patches the corresponding bytes in
//! place, now that every symbol's final address is known from the layout.

use weld_object::elf32::{RelocationType, SectionType};

use crate::{
    error::Error,
    layout::Layout,
    loading::LoadedObject,
    symbols::{GlobalSymbolTable, ResolvedSymbol},
};

/// Patch `data[offset..]` per `kind`, against the already-relocated
/// `target` address.
fn patch(data: &mut [u8], offset: usize, kind: RelocationType, target: u32) {
    match kind {
        RelocationType::Jump => {
            let shifted = target >> 1;
            data[offset] = (data[offset] & 0xf0) | ((shifted >> 24) as u8 & 0x0f);
            data[offset + 1] = (shifted >> 16) as u8;
            data[offset + 2] = (shifted >> 8) as u8;
            data[offset + 3] = shifted as u8;
        }
        RelocationType::Byte(n) => {
            let bytes = target.to_le_bytes();
            data[offset] = bytes[n as usize];
        }
    }
}

/// Apply every input object's relocations to the corresponding chunk's
/// bytes in `layout`.
pub(crate) fn apply(
    objects: &[LoadedObject<'_>],
    per_object_symbols: &[Vec<ResolvedSymbol>],
    global: &GlobalSymbolTable,
    layout: &mut Layout,
) -> Result<(), Error> {
    for (object_index, object) in objects.iter().enumerate() {
        let endianness = object.file.endianness.into();

        for section in &object.file.sections {
            if section.r#type != SectionType::Relocation {
                continue;
            }

            // `information` names the section the relocations apply to.
            let target_section_index = section.information as u16;
            let Some(chunk_index) = layout.index_of(object_index, target_section_index) else {
                continue;
            };

            for relocation in section.relocations::<()>(endianness) {
                let relocation = relocation.map_err(|_| Error::ParsingObject(object.path.clone()))?;

                let symbol = &per_object_symbols[object_index][relocation.symbol_index as usize];
                let target = resolve(object_index, symbol, global, layout);

                let data = &mut layout.chunks[chunk_index].data;
                patch(data, relocation.offset.0 as usize, relocation.r#type, target);
            }
        }
    }

    Ok(())
}

/// The final address a relocation's referenced symbol resolves to: either
/// the global symbol table's definition, or, for a symbol local to its own
/// object (one absent from the global table but still defined in some
/// section of this object), that section's own address plus the symbol's
/// offset within it.
fn resolve(
    object_index: usize,
    symbol: &ResolvedSymbol,
    global: &GlobalSymbolTable,
    layout: &Layout,
) -> u32 {
    if let Some(definition) = global.definitions.get(&symbol.name) {
        let base = layout.address_of(definition.object_index, definition.section_index).unwrap_or(0);
        return base + definition.value;
    }

    if let Some(section_index) = symbol.section_index {
        if let Some(base) = layout.address_of(object_index, section_index) {
            return base;
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use weld_object::elf32::{RelocationType, SectionFlag, SectionType};

    use super::{apply, patch};
    use crate::{layout, loading::test_support::ObjectBuilder, symbols};

    #[test]
    fn patch_jump_preserves_the_high_nibble_and_shifts_right_by_one() {
        let mut data = [0xf0u8, 0xff, 0xff, 0xff];
        patch(&mut data, 0, RelocationType::Jump, 0x0000_0002);
        assert_eq!(data, [0xf0, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn patch_byte_writes_a_single_little_endian_byte() {
        let mut data = [0xffu8, 0xff, 0xff, 0xff];
        patch(&mut data, 1, RelocationType::Byte(2), 0x1234_5678);
        assert_eq!(data[1], 0x34);
    }

    #[test]
    fn apply_patches_a_self_referential_jump_to_the_final_address() {
        let mut builder = ObjectBuilder::new();
        let text = builder.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0, vec![0u8; 4], 4);
        let main_symbol = builder.add_symbol("__main", Some(text), 0);
        builder.add_relocations(text, &[(0, main_symbol, RelocationType::Jump)]);
        let objects = vec![builder.build("a.o")];

        let (global, per_object_symbols) = symbols::build(&objects).unwrap();
        let mut laid_out = layout::build(&objects, global.main, 0x1000);

        apply(&objects, &per_object_symbols, &global, &mut laid_out).unwrap();

        let main_address = laid_out.address_of(0, text).unwrap();
        let shifted = main_address >> 1;
        let patched = &laid_out.chunks[0].data;

        assert_eq!(patched[0] & 0x0f, ((shifted >> 24) & 0x0f) as u8);
        assert_eq!(patched[1], (shifted >> 16) as u8);
        assert_eq!(patched[2], (shifted >> 8) as u8);
        assert_eq!(patched[3], shifted as u8);
    }
}
