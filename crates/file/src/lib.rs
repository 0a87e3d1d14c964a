//! `weld_file` is a thin crate to manipulate files.
//!
//! The assembler and the linker both need exactly one capability from the
//! filesystem: open a path and get its entire content as bytes, synchronously
//! and deterministically. Assembly is line-oriented and `.include` needs the
//! current file fully buffered before line indices make sense again; object
//! parsing needs random access across header/body offsets. Neither core
//! streams, memory-maps, or reads asynchronously, so this crate doesn't
//! either — see [`FileReader`].

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

pub mod fs;

use std::{io::Result, ops::Deref, path::Path};

/// Define what a file reader should look like.
///
/// A small abstraction purely so the core components can be exercised
/// against in-memory byte slices in tests without touching a filesystem.
pub trait FileReader: Sized {
    /// The reader outputs bytes that implement `Deref<[u8]>`.
    type Bytes: Deref<Target = [u8]>;

    /// Open a file.
    fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>;

    /// Read the entire file content, synchronously and completely.
    fn read_as_bytes(self) -> Result<Self::Bytes>;
}

/// File picker.
///
/// This type opens a file path with the default [`fs::File`] reader.
pub struct Picker;

impl Picker {
    /// Open a file by using [`fs::File`].
    pub fn open<P>(path: P) -> Result<fs::File>
    where
        P: AsRef<Path>,
    {
        fs::File::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picker() -> Result<()> {
        let file = Picker::open("tests/hello.txt")?;
        let content = file.read_as_bytes()?;

        assert_eq!(*content, b"abcdef"[..]);

        Ok(())
    }
}
