use std::fs;

use crate::{
    error::Error, layout::SegmentKind, loading, relocate, symbols, Configuration,
};

/// Drives one link: load every input object, resolve symbols, lay out
/// sections, patch relocations, and write the result.
#[derive(Debug)]
pub struct Linker {
    configuration: Configuration,
}

impl Linker {
    pub(crate) fn with_configuration(configuration: Configuration) -> Self {
        Self { configuration }
    }

    /// Run the link described by this linker's [`Configuration`].
    pub fn link(self) -> Result<(), Error> {
        if self.configuration.input_files.is_empty() {
            return Err(Error::NoInputFile);
        }

        let buffers = loading::read_all(&self.configuration.input_files)?;
        let objects = loading::parse_all(&buffers)?;

        let (global, per_object_symbols) = symbols::build(&objects)?;

        let page_size = objects.iter().find_map(|object| object.file.page_size()).unwrap_or(1);

        let mut layout = crate::layout::build(&objects, global.main, page_size);
        relocate::apply(&objects, &per_object_symbols, &global, &mut layout)?;

        let entry_point = layout
            .address_of(global.main.object_index, global.main.section_index)
            .unwrap_or(layout.base)
            + global.main.value;

        if self.configuration.raw_output {
            self.write_raw(&layout)?;
        } else {
            let file = crate::emit::build(&layout, entry_point);
            self.write_elf(&file)?;
        }

        if self.configuration.write_symbols {
            self.write_symbol_dump(&global, &layout)?;
        }

        Ok(())
    }

    fn write_raw(&self, layout: &crate::layout::Layout) -> Result<(), Error> {
        let mut bytes = Vec::new();

        for kind in [SegmentKind::Exec, SegmentKind::Rodata, SegmentKind::Data, SegmentKind::Bss] {
            for chunk in layout.chunks.iter().filter(|chunk| chunk.kind == kind) {
                if chunk.kind == SegmentKind::Bss {
                    bytes.extend(std::iter::repeat(0u8).take(chunk.size as usize));
                } else {
                    bytes.extend_from_slice(&chunk.data);
                }
            }
        }

        fs::write(&self.configuration.output_file, bytes)
            .map_err(|error| Error::Output(self.configuration.output_file.clone(), error.to_string()))
    }

    fn write_elf(&self, file: &weld_object::elf32::File<'_>) -> Result<(), Error> {
        let mut bytes = Vec::new();
        file.write(&mut bytes).expect("write to Vec never fails");

        fs::write(&self.configuration.output_file, bytes)
            .map_err(|error| Error::Output(self.configuration.output_file.clone(), error.to_string()))
    }

    fn write_symbol_dump(
        &self,
        global: &symbols::GlobalSymbolTable,
        layout: &crate::layout::Layout,
    ) -> Result<(), Error> {
        let mut names: Vec<_> = global.definitions.keys().collect();
        names.sort();

        let mut dump = String::new();
        for name in names {
            let definition = &global.definitions[name];
            let address =
                layout.address_of(definition.object_index, definition.section_index).unwrap_or(0)
                    + definition.value;
            dump.push_str(&format!("0x{address:08x} {name}\n"));
        }

        let path = format!("{}.sym", self.configuration.output_file.display());
        fs::write(&path, dump).map_err(|error| Error::Output(path.into(), error.to_string()))
    }
}
