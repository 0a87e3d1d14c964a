//! Instruction variant resolution and encoding.

use std::collections::HashMap;

use weld_arch::{Architecture, DefaultValue, FragmentType, Instruction, COMPOSITE_FORMAT};

use crate::{
    error::LineError,
    number::{self, NumberSign},
    segment::{PackTarget, Reference, Segment},
    token::{Token, TokenType},
};

/// A label reference left open on a candidate's fragment values, carried
/// through composite expansion until it's finally packed as a
/// [`Reference`] on the segment.
#[derive(Debug, Clone)]
struct PendingReference {
    label: String,
    relocation: Option<String>,
    shift: u32,
}

/// One still-possibly-matching instruction variant, tracked through the
/// column-wise elimination pass.
#[derive(Debug, Clone)]
struct Candidate {
    instruction: Instruction,
    values: HashMap<String, u32>,
    pending_references: HashMap<String, PendingReference>,
    /// `-1` while still alive; otherwise the index of the operand that
    /// eliminated it.
    matched_tokens: i32,
    error: Option<LineError>,
}

impl Candidate {
    fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            values: HashMap::new(),
            pending_references: HashMap::new(),
            matched_tokens: -1,
            error: None,
        }
    }

    fn eliminate(&mut self, at: usize, error: LineError) {
        self.matched_tokens = at as i32;
        self.error = Some(error);
    }
}

/// An expansion target: either the winning instruction itself (for a
/// direct, non-composite match), or one of a composite's components.
struct Expanded {
    instruction: Instruction,
    values: HashMap<String, u32>,
    pending_references: HashMap<String, PendingReference>,
}

/// Resolve `mnemonic`'s variant against `operands`, then pack the winning
/// (possibly composite-expanded) encoding into `segment`.
pub(crate) fn encode_instruction(
    architecture: &Architecture,
    mnemonic: &Token,
    operands: &[Token],
    segment: &mut Segment,
) -> Result<(), LineError> {
    let Some(variants) = architecture.instructions.get(&mnemonic.content) else {
        return Err(LineError::syntax(
            format!("unexpected identifier '{}'", mnemonic.content),
            mnemonic.column,
        ));
    };

    let mut candidates: Vec<Candidate> = variants
        .iter()
        .filter(|instruction| instruction.fragments.len() == operands.len())
        .cloned()
        .map(Candidate::new)
        .collect();

    for (position, token) in operands.iter().enumerate() {
        for candidate in candidates.iter_mut() {
            if candidate.matched_tokens != -1 {
                continue;
            }

            let pattern = candidate.instruction.fragments[position].clone();

            if let Err(error) = validate_operand(architecture, candidate, &pattern, token) {
                candidate.eliminate(position, error);
            }
        }
    }

    let winner_index = candidates.iter().position(|candidate| candidate.matched_tokens == -1);

    let winner = match winner_index {
        Some(index) => candidates.remove(index),
        None => {
            // No candidate fully matched (or there were none with the right
            // operand count at all): report the furthest-matching
            // candidate's error, falling back to a generic diagnostic.
            let default_error = LineError::syntax(
                "unresolved instruction variant".to_string(),
                mnemonic.column,
            );

            let best =
                candidates.into_iter().max_by_key(|candidate| candidate.matched_tokens);

            return Err(best.and_then(|candidate| candidate.error).unwrap_or(default_error));
        }
    };

    let expanded_list = expand(architecture, winner);

    for expanded in expanded_list {
        emit(architecture, &expanded, segment)?;
    }

    Ok(())
}

/// Turn a numeric-literal parse failure into the right [`LineError`] kind: a
/// malformed digit is a parse error, an out-of-range magnitude is a syntax
/// error against the expected fragment.
fn number_error(error: number::NumberError, content: &str, pattern: &str, column: usize) -> LineError {
    match error {
        number::NumberError::Malformed => {
            LineError::parse(format!("malformed number '{content}'"), column)
        }
        number::NumberError::OutOfRange => LineError::syntax(
            format!("unexpected token '{content}'. Expecting '{pattern}'"),
            column,
        ),
    }
}

fn validate_operand(
    architecture: &Architecture,
    candidate: &mut Candidate,
    pattern: &str,
    token: &Token,
) -> Result<(), LineError> {
    if let Some(literal) = pattern.strip_prefix(':') {
        if token.r#type != TokenType::Punctuator {
            return Err(LineError::syntax(
                format!("unexpected token '{}'. Expecting '{literal}'", token.content),
                token.column,
            ));
        }
        if token.content != literal {
            return Err(LineError::syntax(
                format!("unexpected punctuator '{}'. Expecting '{literal}'", token.content),
                token.column,
            ));
        }

        return Ok(());
    }

    let Some(fragment) = architecture.fragments.get(pattern) else {
        return Err(LineError::syntax(
            format!("internal: unknown fragment '{pattern}'"),
            token.column,
        ));
    };

    let mut value = 0u32;
    let mut pending_reference = None;

    match fragment.r#type {
        FragmentType::Address | FragmentType::RAddress => match token.r#type {
            TokenType::Number => {
                let sign = if fragment.r#type == FragmentType::Address {
                    NumberSign::ForceUnsigned
                } else {
                    NumberSign::ForceSigned
                };

                value = number::parse_number(&token.content, 0, fragment.width, 0, sign)
                    .map_err(|error| number_error(error, &token.content, pattern, token.column))?;
            }
            TokenType::Identifier => {
                pending_reference = Some(PendingReference {
                    label: token.content.clone(),
                    relocation: fragment.relocation.clone().filter(|name| !name.is_empty()),
                    shift: fragment.alignment.saturating_sub(1),
                });
            }
            _ => {
                return Err(LineError::syntax(
                    format!("unexpected token '{}'. Expecting '{pattern}'", token.content),
                    token.column,
                ))
            }
        },

        FragmentType::Reg => {
            if token.r#type != TokenType::Identifier || !token.content.starts_with('$') {
                return Err(LineError::syntax(
                    format!("unexpected token '{}'. Expecting '{pattern}'", token.content),
                    token.column,
                ));
            }

            value = number::parse_number(
                &token.content,
                1,
                fragment.width,
                fragment.offset,
                NumberSign::ForceUnsigned,
            )
            .map_err(|error| number_error(error, &token.content, pattern, token.column))?;
        }

        FragmentType::Signed | FragmentType::Unsigned => {
            if token.r#type != TokenType::Number {
                return Err(LineError::syntax(
                    format!("unexpected token '{}'. Expecting '{pattern}'", token.content),
                    token.column,
                ));
            }

            let sign = if fragment.r#type == FragmentType::Signed {
                NumberSign::ForceSigned
            } else {
                NumberSign::ForceUnsigned
            };

            value = number::parse_number(&token.content, 0, fragment.width, fragment.offset, sign)
                .map_err(|error| number_error(error, &token.content, pattern, token.column))?;
        }
    }

    if fragment.alignment > 1 {
        let mask = (1u32 << (fragment.alignment - 1)) - 1;
        if value & mask != 0 {
            return Err(LineError::syntax(
                format!("number must be divisible by {}", 1u32 << (fragment.alignment - 1)),
                token.column,
            ));
        }
    }

    if fragment.owidth < fragment.width {
        value >>= fragment.width - fragment.owidth;
    } else if fragment.owidth > fragment.width && !fragment.right_align {
        value <<= fragment.owidth - fragment.width;
    }

    let key = if let Some(group) = &fragment.group { group.clone() } else { fragment.name.clone() };

    if let Some(pending) = pending_reference {
        candidate.pending_references.insert(key.clone(), pending);
    }
    candidate.values.insert(key, value);

    Ok(())
}

fn expand(architecture: &Architecture, winner: Candidate) -> Vec<Expanded> {
    if winner.instruction.format != COMPOSITE_FORMAT {
        return vec![Expanded {
            instruction: winner.instruction,
            values: winner.values,
            pending_references: winner.pending_references,
        }];
    }

    let mut expanded_list = Vec::with_capacity(winner.instruction.components.len());

    for component in &winner.instruction.components {
        let Some(base_instruction) = architecture.indexed_instructions.get(&component.id) else {
            continue;
        };

        let mut values = winner.values.clone();
        let mut pending_references = winner.pending_references.clone();

        for replacement in &component.replacements {
            if let Some(pending) = winner.pending_references.get(&replacement.source) {
                let source_value = winner.values.get(&replacement.source).copied().unwrap_or(0);
                values.insert(replacement.dest.clone(), source_value);

                let mut forwarded = pending.clone();
                forwarded.shift = replacement.shift;
                if let Some(relocation) = &replacement.relocation {
                    if !relocation.is_empty() {
                        forwarded.relocation = Some(relocation.clone());
                    }
                }

                pending_references.insert(replacement.dest.clone(), forwarded);
            } else if let Some(value) = winner.values.get(&replacement.source) {
                values.insert(replacement.dest.clone(), value >> replacement.shift);
            }
        }

        expanded_list.push(Expanded {
            instruction: base_instruction.clone(),
            values,
            pending_references,
        });
    }

    expanded_list
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weld_arch::{Component, Relocation, Replacement, SegmentDescription};

    fn text_description() -> SegmentDescription {
        SegmentDescription {
            name: "text".to_string(),
            start: 0,
            size: 0,
            align: 1,
            fill: false,
            ephemeral: false,
            read_only: false,
            executable: true,
            relocatable: true,
        }
    }

    fn fragment(name: &str, r#type: FragmentType, width: u32) -> weld_arch::Fragment {
        weld_arch::Fragment {
            name: name.to_string(),
            r#type,
            width,
            owidth: width,
            alignment: 1,
            offset: 0,
            right_align: false,
            group: None,
            relocation: None,
        }
    }

    fn token(content: &str, r#type: TokenType) -> Token {
        Token { content: content.to_string(), r#type, column: 0, error: false }
    }

    fn base_architecture() -> Architecture {
        Architecture {
            name: "test".to_string(),
            data_width: 32,
            address_width: 32,
            addressable_width: 8,
            page_size: 0,
            segments: Vec::new(),
            fragments: HashMap::new(),
            formats: HashMap::new(),
            instructions: HashMap::new(),
            indexed_instructions: HashMap::new(),
            relocations: HashMap::new(),
        }
    }

    /// Two `mov` variants sharing a mnemonic, disambiguated purely by the
    /// second operand's token type: a register operand picks the
    /// register-register form, a numeric literal picks the
    /// register-immediate form.
    #[test]
    fn test_variant_disambiguation_by_operand_type() {
        let mut architecture = base_architecture();
        architecture.fragments.insert("imm".to_string(), fragment("imm", FragmentType::Unsigned, 4));

        architecture.formats.insert(
            "rr".to_string(),
            weld_arch::Format {
                name: "rr".to_string(),
                width: 8,
                fragments: vec!["reg_dst".to_string(), "reg_src".to_string()],
            },
        );
        architecture.fragments.insert("reg_dst".to_string(), fragment("reg_dst", FragmentType::Reg, 4));
        architecture.fragments.insert("reg_src".to_string(), fragment("reg_src", FragmentType::Reg, 4));

        architecture.formats.insert(
            "ri".to_string(),
            weld_arch::Format {
                name: "ri".to_string(),
                width: 8,
                fragments: vec!["reg_dst".to_string(), "imm".to_string()],
            },
        );

        let variant_rr = Instruction {
            mnemonic: "mov".to_string(),
            format: "rr".to_string(),
            fragments: vec!["reg_dst".to_string(), ":,".to_string(), "reg_src".to_string()],
            defaults: HashMap::new(),
            id: 0,
            components: Vec::new(),
        };
        let variant_ri = Instruction {
            mnemonic: "mov".to_string(),
            format: "ri".to_string(),
            fragments: vec!["reg_dst".to_string(), ":,".to_string(), "imm".to_string()],
            defaults: HashMap::new(),
            id: 0,
            components: Vec::new(),
        };
        architecture.instructions.insert("mov".to_string(), vec![variant_rr, variant_ri]);

        let mnemonic = token("mov", TokenType::Identifier);

        // Register-register form wins when both operands are `$`-registers.
        let operands = vec![
            token("$1", TokenType::Identifier),
            token(",", TokenType::Punctuator),
            token("$2", TokenType::Identifier),
        ];
        let mut segment = Segment::new(text_description());
        encode_instruction(&architecture, &mnemonic, &operands, &mut segment).unwrap();
        assert_eq!(segment.data(), &[0x12]);

        // Register-immediate form wins when the second operand is a number.
        let operands = vec![
            token("$1", TokenType::Identifier),
            token(",", TokenType::Punctuator),
            token("5", TokenType::Number),
        ];
        let mut segment = Segment::new(text_description());
        encode_instruction(&architecture, &mnemonic, &operands, &mut segment).unwrap();
        assert_eq!(segment.data(), &[0x15]);
    }

    /// When every candidate is eliminated, the best-match diagnostic (the
    /// one that matched the most leading tokens) is surfaced rather than a
    /// generic one.
    #[test]
    fn test_unresolved_variant_reports_best_match_error() {
        let mut architecture = base_architecture();
        architecture.fragments.insert("reg".to_string(), fragment("reg", FragmentType::Reg, 4));
        architecture.formats.insert(
            "r".to_string(),
            weld_arch::Format { name: "r".to_string(), width: 8, fragments: vec!["reg".to_string()] },
        );

        let variant = Instruction {
            mnemonic: "inc".to_string(),
            format: "r".to_string(),
            fragments: vec!["reg".to_string()],
            defaults: HashMap::new(),
            id: 0,
            components: Vec::new(),
        };
        architecture.instructions.insert("inc".to_string(), vec![variant]);

        let mnemonic = token("inc", TokenType::Identifier);
        let operands = vec![token("5", TokenType::Number)];
        let mut segment = Segment::new(text_description());

        let error = encode_instruction(&architecture, &mnemonic, &operands, &mut segment).unwrap_err();
        assert!(matches!(error, LineError::Syntax { .. }));
    }

    /// An `address` fragment fed an identifier operand defers to a pending
    /// reference rather than failing, and the reference anchors at the
    /// first byte of its field with the fragment's declared width.
    #[test]
    fn test_address_fragment_with_identifier_defers_to_pending_reference() {
        let mut architecture = base_architecture();
        architecture.fragments.insert("op".to_string(), fragment("op", FragmentType::Unsigned, 8));
        architecture.fragments.insert("addr".to_string(), fragment("addr", FragmentType::Address, 16));

        architecture.formats.insert(
            "jfmt".to_string(),
            weld_arch::Format {
                name: "jfmt".to_string(),
                width: 24,
                fragments: vec!["op".to_string(), "addr".to_string()],
            },
        );

        let mut defaults = HashMap::new();
        defaults.insert("op".to_string(), weld_arch::DefaultValue::Literal(0x80));

        let variant = Instruction {
            mnemonic: "jmp".to_string(),
            format: "jfmt".to_string(),
            fragments: vec!["addr".to_string()],
            defaults,
            id: 0,
            components: Vec::new(),
        };
        architecture.instructions.insert("jmp".to_string(), vec![variant]);

        let mnemonic = token("jmp", TokenType::Identifier);
        let operands = vec![token("L", TokenType::Identifier)];
        let mut segment = Segment::new(text_description());

        encode_instruction(&architecture, &mnemonic, &operands, &mut segment).unwrap();

        assert_eq!(segment.data(), &[0x80, 0x00, 0x00]);
        assert_eq!(segment.references().len(), 1);
        let reference = &segment.references()[0];
        assert_eq!(reference.label, "L");
        assert_eq!(reference.offset, 1);
        assert_eq!(reference.bit, 0);
        assert_eq!(reference.width, 16);
        assert_eq!(reference.shift, 0);
        assert_eq!(reference.relative, 0);
    }

    /// A composite instruction expands into its component instructions in
    /// order, forwarding a pending reference from the composite candidate
    /// into each component with its own shift and relocation override.
    #[test]
    fn test_composite_expansion_forwards_pending_reference_with_shift() {
        let mut architecture = base_architecture();

        architecture.fragments.insert("reg".to_string(), fragment("reg", FragmentType::Reg, 8));
        architecture.fragments.insert("addr".to_string(), fragment("addr", FragmentType::Address, 32));
        architecture.fragments.insert("opcode_lui".to_string(), fragment("opcode_lui", FragmentType::Unsigned, 8));
        architecture.fragments.insert("opcode_ori".to_string(), fragment("opcode_ori", FragmentType::Unsigned, 8));
        architecture.fragments.insert("reg_dst".to_string(), fragment("reg_dst", FragmentType::Reg, 8));
        architecture.fragments.insert("reg_src".to_string(), fragment("reg_src", FragmentType::Reg, 8));
        architecture.fragments.insert("imm16".to_string(), fragment("imm16", FragmentType::Unsigned, 16));

        architecture.relocations.insert("hi16".to_string(), Relocation { name: "hi16".to_string(), r#type: 10 });
        architecture.relocations.insert("lo16".to_string(), Relocation { name: "lo16".to_string(), r#type: 11 });

        architecture.formats.insert(
            "lui_fmt".to_string(),
            weld_arch::Format {
                name: "lui_fmt".to_string(),
                width: 32,
                fragments: vec!["opcode_lui".to_string(), "reg".to_string(), "imm16".to_string()],
            },
        );
        architecture.formats.insert(
            "ori_fmt".to_string(),
            weld_arch::Format {
                name: "ori_fmt".to_string(),
                width: 40,
                fragments: vec![
                    "opcode_ori".to_string(),
                    "reg_dst".to_string(),
                    "reg_src".to_string(),
                    "imm16".to_string(),
                ],
            },
        );

        let mut lui_defaults = HashMap::new();
        lui_defaults.insert("opcode_lui".to_string(), weld_arch::DefaultValue::Literal(0x0f));
        let lui = Instruction {
            mnemonic: "lui".to_string(),
            format: "lui_fmt".to_string(),
            fragments: vec!["reg".to_string(), ":,".to_string(), "imm16".to_string()],
            defaults: lui_defaults,
            id: 1,
            components: Vec::new(),
        };

        let mut ori_defaults = HashMap::new();
        ori_defaults.insert("opcode_ori".to_string(), weld_arch::DefaultValue::Literal(0x10));
        let ori = Instruction {
            mnemonic: "ori".to_string(),
            format: "ori_fmt".to_string(),
            fragments: vec![
                "reg_dst".to_string(),
                ":,".to_string(),
                "reg_src".to_string(),
                ":,".to_string(),
                "imm16".to_string(),
            ],
            defaults: ori_defaults,
            id: 2,
            components: Vec::new(),
        };

        architecture.indexed_instructions.insert(1, lui.clone());
        architecture.indexed_instructions.insert(2, ori.clone());
        architecture.instructions.insert("lui".to_string(), vec![lui]);
        architecture.instructions.insert("ori".to_string(), vec![ori]);

        let li = Instruction {
            mnemonic: "li".to_string(),
            format: weld_arch::COMPOSITE_FORMAT.to_string(),
            fragments: vec!["reg".to_string(), ":,".to_string(), "addr".to_string()],
            defaults: HashMap::new(),
            id: 0,
            components: vec![
                Component {
                    id: 1,
                    replacements: vec![
                        Replacement { source: "reg".to_string(), dest: "reg".to_string(), shift: 0, relocation: None },
                        Replacement {
                            source: "addr".to_string(),
                            dest: "imm16".to_string(),
                            shift: 16,
                            relocation: Some("hi16".to_string()),
                        },
                    ],
                },
                Component {
                    id: 2,
                    replacements: vec![
                        Replacement { source: "reg".to_string(), dest: "reg_dst".to_string(), shift: 0, relocation: None },
                        Replacement { source: "reg".to_string(), dest: "reg_src".to_string(), shift: 0, relocation: None },
                        Replacement {
                            source: "addr".to_string(),
                            dest: "imm16".to_string(),
                            shift: 0,
                            relocation: Some("lo16".to_string()),
                        },
                    ],
                },
            ],
        };
        architecture.instructions.insert("li".to_string(), vec![li]);

        let mnemonic = token("li", TokenType::Identifier);
        let operands = vec![
            token("$3", TokenType::Identifier),
            token(",", TokenType::Punctuator),
            token("TARGET", TokenType::Identifier),
        ];
        let mut segment = Segment::new(text_description());

        encode_instruction(&architecture, &mnemonic, &operands, &mut segment).unwrap();

        assert_eq!(segment.data(), &[0x0f, 0x03, 0x00, 0x00, 0x10, 0x03, 0x03, 0x00, 0x00]);

        let references = segment.references();
        assert_eq!(references.len(), 2);

        assert_eq!(references[0].label, "TARGET");
        assert_eq!(references[0].offset, 2);
        assert_eq!(references[0].shift, 16);
        assert_eq!(references[0].relocation_type, 10);

        assert_eq!(references[1].label, "TARGET");
        assert_eq!(references[1].offset, 7);
        assert_eq!(references[1].shift, 0);
        assert_eq!(references[1].relocation_type, 11);
    }

    /// A fragment with non-power-of-two-unaligned value is rejected before
    /// it ever reaches packing.
    #[test]
    fn test_alignment_violation_is_a_syntax_error() {
        let mut architecture = base_architecture();
        let mut addr = fragment("addr", FragmentType::Address, 16);
        addr.alignment = 2; // must be divisible by 2^(2-1) = 2
        architecture.fragments.insert("addr".to_string(), addr);

        architecture.formats.insert(
            "jfmt".to_string(),
            weld_arch::Format { name: "jfmt".to_string(), width: 16, fragments: vec!["addr".to_string()] },
        );

        let variant = Instruction {
            mnemonic: "jmp".to_string(),
            format: "jfmt".to_string(),
            fragments: vec!["addr".to_string()],
            defaults: HashMap::new(),
            id: 0,
            components: Vec::new(),
        };
        architecture.instructions.insert("jmp".to_string(), vec![variant]);

        let mnemonic = token("jmp", TokenType::Identifier);
        let operands = vec![token("3", TokenType::Number)];
        let mut segment = Segment::new(text_description());

        let error = encode_instruction(&architecture, &mnemonic, &operands, &mut segment).unwrap_err();
        assert!(matches!(error, LineError::Syntax { .. }));
    }
}

fn emit(architecture: &Architecture, expanded: &Expanded, segment: &mut Segment) -> Result<(), LineError> {
    let Some(format) = architecture.formats.get(&expanded.instruction.format) else {
        return Err(LineError::segment(format!(
            "internal: instruction '{}' names unrecognized format '{}'",
            expanded.instruction.mnemonic, expanded.instruction.format
        )));
    };

    let width_bytes = format.width / 8;
    if !segment.can_place(width_bytes) {
        return Err(LineError::segment("segment size exceeded".to_string()));
    }

    let starting_offset = segment.offset();
    let mut bit = 0u8;

    for fragment_name in &format.fragments {
        let value = if let Some(value) = expanded.values.get(fragment_name) {
            *value
        } else if let Some(default) = expanded.instruction.defaults.get(fragment_name) {
            match default {
                DefaultValue::Next => segment.get_next(width_bytes),
                DefaultValue::Literal(literal) => *literal,
            }
        } else {
            continue;
        };

        let Some(fragment) = architecture.fragments.get(fragment_name) else {
            continue;
        };

        if let Some(pending) = expanded.pending_references.get(fragment_name) {
            let relocation_type = pending
                .relocation
                .as_ref()
                .and_then(|name| architecture.relocations.get(name))
                .map(|relocation| relocation.r#type)
                .unwrap_or(0);

            let anchor_offset = segment.offset() - u32::from(bit != 0);

            segment.add_reference(Reference {
                label: pending.label.clone(),
                offset: anchor_offset,
                bit,
                width: fragment.owidth,
                shift: pending.shift,
                relative: if fragment.r#type == FragmentType::RAddress { starting_offset } else { 0 },
                relocation_type,
            });
        }

        segment.pack(value, fragment.owidth, PackTarget::Cursor, &mut bit)?;
    }

    Ok(())
}
