//! Binds an `<arch>.arch.yaml` document to the [`crate::Architecture`]
//! tables.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    Architecture, Component, DefaultValue, Format, Fragment, FragmentType, Instruction,
    Relocation, Replacement, SegmentDescription, COMPOSITE_FORMAT,
};

/// Architecture-description loading errors.
///
/// These are folded into [`weld_errors::Error::Config`] (`E002`) as soon as
/// they cross the crate boundary — this type only exists to carry a precise
/// [`std::fmt::Display`] message up to that point.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `<name>.arch.yaml` file could not be opened.
    #[error("I could not open the architecture description `{0}`: {1}")]
    Io(String, std::io::Error),

    /// The YAML document was malformed.
    #[error("I could not parse the architecture description `{0}`: {1}")]
    Yaml(String, serde_yaml::Error),

    /// An instruction named a format that isn't declared.
    #[error("instruction `{mnemonic}` names the unrecognized format `{format}`")]
    UnrecognizedFormat {
        /// Offending instruction's mnemonic.
        mnemonic: String,
        /// The format name that couldn't be found.
        format: String,
    },

    /// A `defaults`-position field held something other than `%next%` or a
    /// decimal integer.
    #[error("instruction `{mnemonic}`'s default for fragment `{fragment}` (`{value}`) is neither `%next%` nor a decimal integer")]
    MalformedDefault {
        /// Offending instruction's mnemonic.
        mnemonic: String,
        /// Fragment the default was declared for.
        fragment: String,
        /// The raw value that failed to parse.
        value: String,
    },
}

impl From<Error> for weld_errors::Error {
    fn from(error: Error) -> Self {
        weld_errors::Error::Config(error.to_string())
    }
}

pub(crate) fn load(name: &str) -> Result<Architecture, Error> {
    let path = format!("{name}.arch.yaml");
    let content = std::fs::read_to_string(&path).map_err(|error| Error::Io(path.clone(), error))?;
    let document: Document =
        serde_yaml::from_str(&content).map_err(|error| Error::Yaml(path, error))?;

    document.try_into_architecture(name)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    data_width: u32,
    address_width: u32,
    addressable_width: u32,
    #[serde(default)]
    page_size: u32,
    #[serde(default)]
    segments: Vec<DocumentSegment>,
    #[serde(default)]
    fragments: Vec<DocumentFragment>,
    #[serde(default)]
    formats: Vec<DocumentFormat>,
    #[serde(default)]
    instructions: Vec<DocumentInstruction>,
    #[serde(default)]
    relocations: Vec<DocumentRelocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentSegment {
    name: String,
    #[serde(default)]
    start: u32,
    #[serde(default)]
    size: u32,
    #[serde(default)]
    align: u32,
    #[serde(default = "default_true")]
    relocatable: bool,
    #[serde(default)]
    fill: bool,
    #[serde(default)]
    ephemeral: bool,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    executable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentFragment {
    name: String,
    r#type: String,
    width: u32,
    #[serde(default)]
    owidth: Option<u32>,
    #[serde(default)]
    relocation: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default = "default_alignment")]
    alignment: u32,
    #[serde(default)]
    offset: u32,
    #[serde(default, rename = "right")]
    right_align: bool,
}

fn default_alignment() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentFormat {
    name: String,
    width: u32,
    fragments: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentInstruction {
    mnemonic: String,
    format: String,
    #[serde(default)]
    fragments: Vec<String>,
    #[serde(default)]
    id: u32,
    #[serde(default)]
    components: Vec<DocumentComponent>,
    /// Every other key in the instruction entry is a literal-default for a
    /// fragment the instruction's format lists.
    #[serde(flatten)]
    extra: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentComponent {
    id: u32,
    #[serde(default)]
    replacements: Vec<DocumentReplacement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentReplacement {
    source: String,
    dest: String,
    #[serde(default)]
    shift: u32,
    #[serde(default)]
    relocation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRelocation {
    name: String,
    r#type: u8,
}

impl Document {
    fn try_into_architecture(self, name: &str) -> Result<Architecture, Error> {
        let fragments: HashMap<String, Fragment> = self
            .fragments
            .into_iter()
            .map(|fragment| {
                let r#type = match fragment.r#type.as_str() {
                    "address" => FragmentType::Address,
                    "raddress" => FragmentType::RAddress,
                    "reg" => FragmentType::Reg,
                    "signed" => FragmentType::Signed,
                    _ => FragmentType::Unsigned,
                };
                let owidth = fragment.owidth.unwrap_or(fragment.width);

                (
                    fragment.name.clone(),
                    Fragment {
                        name: fragment.name,
                        r#type,
                        width: fragment.width,
                        owidth,
                        alignment: fragment.alignment,
                        offset: fragment.offset,
                        right_align: fragment.right_align,
                        group: fragment.group.filter(|group| !group.is_empty()),
                        relocation: fragment.relocation.filter(|name| !name.is_empty()),
                    },
                )
            })
            .collect();

        let formats: HashMap<String, Format> = self
            .formats
            .into_iter()
            .map(|format| {
                (
                    format.name.clone(),
                    Format { name: format.name, width: format.width, fragments: format.fragments },
                )
            })
            .collect();

        let relocations: HashMap<String, Relocation> = self
            .relocations
            .into_iter()
            .map(|relocation| {
                (relocation.name.clone(), Relocation { name: relocation.name, r#type: relocation.r#type })
            })
            .collect();

        let segments: Vec<SegmentDescription> = self
            .segments
            .into_iter()
            .map(|segment| SegmentDescription {
                name: segment.name,
                start: segment.start,
                size: segment.size,
                align: segment.align,
                fill: segment.fill,
                ephemeral: segment.ephemeral,
                read_only: segment.read_only,
                executable: segment.executable,
                relocatable: segment.relocatable,
            })
            .collect();

        let mut instructions: HashMap<String, Vec<Instruction>> = HashMap::new();
        let mut indexed_instructions: HashMap<u32, Instruction> = HashMap::new();

        for document_instruction in self.instructions {
            let format_fragments: Option<&Vec<String>> =
                if document_instruction.format == COMPOSITE_FORMAT {
                    None
                } else {
                    Some(
                        &formats
                            .get(&document_instruction.format)
                            .ok_or_else(|| Error::UnrecognizedFormat {
                                mnemonic: document_instruction.mnemonic.clone(),
                                format: document_instruction.format.clone(),
                            })?
                            .fragments,
                    )
                };

            let mut defaults = HashMap::new();
            if let Some(format_fragments) = format_fragments {
                for fragment_name in format_fragments {
                    let Some(raw_value) = document_instruction.extra.get(fragment_name) else {
                        continue;
                    };

                    let text = match raw_value {
                        serde_yaml::Value::String(text) => text.clone(),
                        serde_yaml::Value::Number(number) => number.to_string(),
                        _ => {
                            return Err(Error::MalformedDefault {
                                mnemonic: document_instruction.mnemonic.clone(),
                                fragment: fragment_name.clone(),
                                value: format!("{raw_value:?}"),
                            })
                        }
                    };

                    let default = if text == "%next%" {
                        DefaultValue::Next
                    } else {
                        text.parse::<u32>().map(DefaultValue::Literal).map_err(|_| {
                            Error::MalformedDefault {
                                mnemonic: document_instruction.mnemonic.clone(),
                                fragment: fragment_name.clone(),
                                value: text.clone(),
                            }
                        })?
                    };

                    defaults.insert(fragment_name.clone(), default);
                }
            }

            let components = document_instruction
                .components
                .into_iter()
                .map(|component| Component {
                    id: component.id,
                    replacements: component
                        .replacements
                        .into_iter()
                        .map(|replacement| Replacement {
                            source: replacement.source,
                            dest: replacement.dest,
                            shift: replacement.shift,
                            relocation: replacement.relocation.filter(|name| !name.is_empty()),
                        })
                        .collect(),
                })
                .collect();

            let instruction = Instruction {
                mnemonic: document_instruction.mnemonic.clone(),
                format: document_instruction.format,
                fragments: document_instruction.fragments,
                defaults,
                id: document_instruction.id,
                components,
            };

            if instruction.id > 0 {
                indexed_instructions.insert(instruction.id, instruction.clone());
            }

            instructions.entry(document_instruction.mnemonic).or_default().push(instruction);
        }

        Ok(Architecture {
            name: name.to_owned(),
            data_width: self.data_width,
            address_width: self.address_width,
            addressable_width: self.addressable_width,
            page_size: self.page_size,
            segments,
            fragments,
            formats,
            instructions,
            indexed_instructions,
            relocations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = r#"
dataWidth: 16
addressWidth: 16
addressableWidth: 8
pageSize: 4096
segments:
  - name: text
    start: 0
    executable: true
  - name: data
    start: 4096
fragments:
  - name: address
    type: address
    width: 16
    alignment: 2
formats:
  - name: jmp_format
    width: 16
    fragments: [opcode, address]
  - name: nop_format
    width: 16
    fragments: [opcode]
instructions:
  - mnemonic: nop
    format: nop_format
    fragments: []
    opcode: 0
  - mnemonic: jmp
    format: jmp_format
    fragments: [address]
    opcode: "32768"
"#;

    #[test]
    fn test_load_demo_document() {
        let document: Document = serde_yaml::from_str(DEMO).unwrap();
        let architecture = document.try_into_architecture("demo").unwrap();

        assert_eq!(architecture.page_size, 4096);
        assert_eq!(architecture.segments.len(), 2);
        assert!(architecture.segments[0].executable);

        let jmp = &architecture.instructions["jmp"][0];
        assert_eq!(jmp.defaults["opcode"], DefaultValue::Literal(32768));

        let nop = &architecture.instructions["nop"][0];
        assert_eq!(nop.defaults["opcode"], DefaultValue::Literal(0));
    }

    #[test]
    fn test_unrecognized_format_is_rejected() {
        let document: Document = serde_yaml::from_str(
            r#"
dataWidth: 16
addressWidth: 16
addressableWidth: 8
instructions:
  - mnemonic: nop
    format: ghost
"#,
        )
        .unwrap();

        assert!(matches!(
            document.try_into_architecture("demo"),
            Err(Error::UnrecognizedFormat { .. })
        ));
    }
}
