//! Global symbol table construction.
//!
//! Walks every input object's `.symtab` once, building one map from symbol
//! name to its defining object/section/offset. A second definition of the
//! same name is collected as a `MultipleDefinition` report rather than
//! raised immediately, so every duplicate across every object surfaces in
//! one failure. A second pass over every `.rel*` section then checks that
//! every referenced name is defined somewhere, de-duplicating a repeatedly
//! undefined name to one report per file, and finally checks that `__main`
//! itself was defined.

use std::collections::{HashMap, HashSet};

use weld_object::elf32::SectionType;

use crate::{error::Error, loading::LoadedObject};

/// Where a global symbol is defined: which input object, which of its
/// sections, and its offset within that section.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Definition {
    pub(crate) object_index: usize,
    pub(crate) section_index: u16,
    pub(crate) value: u32,
}

/// A symbol as read out of one object's `.symtab`, name already resolved
/// against that object's `.strtab`. Kept around after the symbol-table pass
/// so relocation resolution doesn't have to re-parse the section.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSymbol {
    pub(crate) name: String,
    pub(crate) section_index: Option<u16>,
}

/// Every symbol defined across every input object.
pub(crate) struct GlobalSymbolTable {
    pub(crate) definitions: HashMap<String, Definition>,
    /// The entry symbol's definition; always present when construction
    /// succeeds.
    pub(crate) main: Definition,
}

/// Build the global symbol table and, as a side effect, every object's own
/// resolved symbol list (indexed the same way its `.symtab` is, for
/// relocation resolution to index into directly).
pub(crate) fn build(
    objects: &[LoadedObject<'_>],
) -> Result<(GlobalSymbolTable, Vec<Vec<ResolvedSymbol>>), Error> {
    let mut definitions: HashMap<String, Definition> = HashMap::new();
    let mut duplicates = Vec::new();
    let mut per_object_symbols = Vec::with_capacity(objects.len());

    for (object_index, object) in objects.iter().enumerate() {
        let endianness = object.file.endianness.into();
        let mut resolved = Vec::new();

        for section in &object.file.sections {
            if section.r#type != SectionType::SymbolTable {
                continue;
            }

            let strings = &object.file.sections[section.link as usize];

            for symbol in section.symbols::<()>(endianness) {
                let symbol = symbol.map_err(|_| Error::ParsingObject(object.path.clone()))?;
                let name = strings
                    .string_at_offset(symbol.name_offset.into())
                    .map(|name| name.to_string())
                    .unwrap_or_default();

                if let Some(section_index) = symbol.section_index {
                    if !name.is_empty() {
                        if let Some(existing) = definitions.get(&name) {
                            duplicates.push(format!(
                                "{}: multiple definition of symbol '{name}' (first defined in {})",
                                object.path.display(),
                                objects[existing.object_index].path.display(),
                            ));
                        } else {
                            definitions.insert(
                                name.clone(),
                                Definition { object_index, section_index, value: symbol.value.0 },
                            );
                        }
                    }
                }

                resolved.push(ResolvedSymbol { name, section_index: symbol.section_index });
            }
        }

        per_object_symbols.push(resolved);
    }

    if !duplicates.is_empty() {
        return Err(Error::MultipleDefinition(duplicates.join("\n")));
    }

    let mut undefined = Vec::new();

    for (object_index, object) in objects.iter().enumerate() {
        let endianness = object.file.endianness.into();
        let mut already_reported: HashSet<&str> = HashSet::new();

        for section in &object.file.sections {
            if section.r#type != SectionType::Relocation {
                continue;
            }

            for relocation in section.relocations::<()>(endianness) {
                let relocation = relocation.map_err(|_| Error::ParsingObject(object.path.clone()))?;
                let Some(symbol) = per_object_symbols[object_index].get(relocation.symbol_index as usize)
                else {
                    continue;
                };

                if definitions.contains_key(&symbol.name) || already_reported.contains(symbol.name.as_str()) {
                    continue;
                }

                already_reported.insert(&symbol.name);
                undefined.push(format!(
                    "{}:({}+{:#x}): undefined reference to '{}'",
                    object.path.display(),
                    section.information,
                    relocation.offset.0,
                    symbol.name,
                ));
            }
        }
    }

    let main = definitions.get("__main").copied();
    if main.is_none() {
        undefined.push("undefined symbol '__main'".to_string());
    }

    if !undefined.is_empty() {
        return Err(Error::Undefined(undefined.join("\n")));
    }

    Ok((GlobalSymbolTable { definitions, main: main.expect("checked above") }, per_object_symbols))
}

#[cfg(test)]
mod tests {
    use weld_object::elf32::{RelocationType, SectionFlag, SectionType};

    use super::build;
    use crate::loading::test_support::ObjectBuilder;

    #[test]
    fn resolves_a_single_definition_and_its_reference() {
        let mut object = ObjectBuilder::new();
        let text = object.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0, vec![0; 8], 4);
        object.add_symbol("__main", Some(text), 0);
        let callee = object.add_symbol("helper", Some(text), 4);
        object.add_relocations(text, &[(0, callee, RelocationType::Jump)]);
        let object = object.build("a.o");

        let (global, per_object) = build(&[object]).expect("link should succeed");

        assert_eq!(global.main.value, 0);
        assert_eq!(global.definitions["helper"].value, 4);
        assert_eq!(per_object[0].len(), 3); // undefined slot + __main + helper
    }

    #[test]
    fn rejects_a_symbol_defined_in_two_objects() {
        let mut first = ObjectBuilder::new();
        let first_text =
            first.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0, vec![0; 4], 4);
        first.add_symbol("__main", Some(first_text), 0);
        first.add_symbol("shared", Some(first_text), 0);
        let first = first.build("first.o");

        let mut second = ObjectBuilder::new();
        let second_text =
            second.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0, vec![0; 4], 4);
        second.add_symbol("shared", Some(second_text), 0);
        let second = second.build("second.o");

        let error = build(&[first, second]).unwrap_err().to_string();

        assert!(error.contains("shared"), "error should name the duplicated symbol: {error}");
    }

    #[test]
    fn rejects_a_reference_to_an_undefined_symbol() {
        let mut object = ObjectBuilder::new();
        let text = object.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0, vec![0; 8], 4);
        object.add_symbol("__main", Some(text), 0);
        let missing = object.add_symbol("never_defined", None, 0);
        object.add_relocations(text, &[(0, missing, RelocationType::Jump)]);
        let object = object.build("a.o");

        let error = build(&[object]).unwrap_err().to_string();

        assert!(error.contains("never_defined"), "error should name the undefined symbol: {error}");
    }

    #[test]
    fn rejects_a_missing_entry_point() {
        let mut object = ObjectBuilder::new();
        let text = object.add_section(SectionType::ProgramData, SectionFlag::Executable.into(), 0, vec![0; 4], 4);
        object.add_symbol("not_main", Some(text), 0);
        let object = object.build("a.o");

        let error = build(&[object]).unwrap_err().to_string();

        assert!(error.contains("__main"), "error should name the missing entry point: {error}");
    }
}
