//! The assembler proper: the per-line state machine, directive dispatch,
//! label and instruction processing, tying the lexer, number parser,
//! segment runtime, encoder, and resolver together into one assembly unit.

use std::{collections::HashMap, fs, path::Path};

use weld_arch::Architecture;
use weld_file::{FileReader, Picker};

use crate::{
    encoder,
    error::{Error, LineError},
    number::{self, NumberSign},
    object,
    resolver,
    segment::Segment,
    token::{self, Token, TokenType},
};

/// Where, within a source line, the next token is expected to mean
/// something different: right after a label, an instruction's mnemonic may
/// still follow; everywhere else, once one is seen, the rest of the line is
/// done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Label,
    Action,
    Done,
}

/// One assembled source file (and everything `.include`d into it): owns the
/// architecture, every declared segment's runtime state, and the label
/// table shared across segments.
pub struct Assembler {
    output_file: String,
    architecture: Option<Architecture>,
    segments: HashMap<String, Segment>,
    segment_order: Vec<String>,
    current_segment: Option<String>,
    used_segments: Vec<String>,
    labels: HashMap<String, String>,
    include_stack: Vec<usize>,
    current_line: usize,
    current_source: String,
    current_file: String,
}

impl Assembler {
    /// Create an assembler that will eventually write its output to
    /// `output_file`.
    pub fn new(output_file: impl Into<String>) -> Self {
        Self {
            output_file: output_file.into(),
            architecture: None,
            segments: HashMap::new(),
            segment_order: Vec::new(),
            current_segment: None,
            used_segments: Vec::new(),
            labels: HashMap::new(),
            include_stack: Vec::new(),
            current_line: 0,
            current_source: String::new(),
            current_file: String::new(),
        }
    }

    /// Assemble `file` (resolved relative to `directory`, unless it's
    /// already absolute).
    pub fn assemble(&mut self, directory: &str, file: &str) -> Result<(), Error> {
        if file.is_empty() {
            return Err(Error::Config(format!("could not open input file '{file}'. Aborting.")));
        }

        let resolved = if file.starts_with('/') { file.to_string() } else { format!("{directory}{file}") };

        let parent = Path::new(&resolved).parent().map(|parent| parent.to_string_lossy().into_owned());
        let mut nested_directory = parent.unwrap_or_default();
        if !nested_directory.is_empty() && !nested_directory.ends_with('/') {
            nested_directory.push('/');
        }

        let bytes = Picker::open(&resolved)
            .and_then(FileReader::read_as_bytes)
            .map_err(|_| Error::Config(format!("could not open input file '{resolved}'. Aborting.")))?;
        let source = String::from_utf8(bytes)
            .map_err(|_| Error::Config(format!("input file '{resolved}' is not valid UTF-8.")))?;

        let previous_line = self.current_line;
        let previous_source = std::mem::replace(&mut self.current_source, source.clone());
        let previous_file = std::mem::replace(&mut self.current_file, resolved.clone());
        self.current_line = 1;

        let result = self.assemble_lines(&source, &nested_directory);

        self.current_line = previous_line;
        self.current_source = previous_source;
        self.current_file = previous_file;

        result
    }

    fn assemble_lines(&mut self, source: &str, directory: &str) -> Result<(), Error> {
        for (index, line) in source.lines().enumerate() {
            self.current_line = index + 1;

            if let Err(error) = self.assemble_line(line, directory) {
                return Err(self.locate_error(&error, line));
            }
        }

        Ok(())
    }

    fn locate_error(&self, error: &LineError, line: &str) -> Error {
        Error::from_line_error(error, &self.current_file, self.current_line, line)
    }

    fn assemble_line(&mut self, line: &str, directory: &str) -> Result<(), LineError> {
        let mut tokens: Vec<Token> = token::tokenize(line).into_iter().collect();
        let mut state = LineState::Label;

        while !tokens.is_empty() {
            let current = tokens.remove(0);

            match state {
                LineState::Label => {
                    if current.r#type == TokenType::Directive {
                        self.process_directive(&current, &mut tokens, directory)?;
                        state = LineState::Done;
                    } else if self.current_segment.is_none() {
                        return Err(unexpected_token(&current));
                    } else if current.r#type == TokenType::Label {
                        self.process_label(&current)?;
                        state = LineState::Action;
                    } else if current.r#type == TokenType::Identifier {
                        self.process_instruction(&current, &mut tokens)?;
                        state = LineState::Done;
                    } else {
                        return Err(unexpected_token(&current));
                    }
                }
                LineState::Action => {
                    if current.r#type == TokenType::Directive {
                        self.process_directive(&current, &mut tokens, directory)?;
                        state = LineState::Done;
                    } else if self.current_segment.is_none() {
                        return Err(unexpected_token(&current));
                    } else if current.r#type == TokenType::Identifier {
                        self.process_instruction(&current, &mut tokens)?;
                        state = LineState::Done;
                    } else {
                        return Err(unexpected_token(&current));
                    }
                }
                LineState::Done => {
                    if current.content.starts_with('"') {
                        return Err(LineError::syntax(
                            format!("unexpected string {}", current.content),
                            current.column,
                        ));
                    }
                    return Err(unexpected_token(&current));
                }
            }
        }

        Ok(())
    }

    fn process_directive(
        &mut self,
        directive: &Token,
        tokens: &mut Vec<Token>,
        directory: &str,
    ) -> Result<(), LineError> {
        match directive.content.as_str() {
            ".arch" => self.process_arch_directive(directive, tokens),
            _ if self.architecture.is_none() => {
                Err(LineError::syntax("architecture not defined".to_string(), directive.column))
            }
            ".org" | ".origin" => self.process_org_directive(directive, tokens),
            ".segment" | ".data" | ".text" | ".rodata" | ".bss" => {
                self.process_segment_directive(directive, tokens)
            }
            ".byte" | ".word" | ".dword" => self.process_data_directive(directive, tokens),
            ".string" | ".stringz" => self.process_string_directive(directive, tokens),
            ".include" => self.process_include_directive(directive, tokens, directory),
            _ => Err(LineError::syntax(
                format!("unrecognized directive '{}'", directive.content),
                directive.column,
            )),
        }
    }

    fn process_arch_directive(
        &mut self,
        directive: &Token,
        tokens: &mut Vec<Token>,
    ) -> Result<(), LineError> {
        if self.architecture.is_some() {
            return Err(LineError::syntax("cannot redefine architecture".to_string(), directive.column));
        }

        if tokens.is_empty() {
            return Err(LineError::syntax("missing architecture".to_string(), directive.column));
        }

        let name_token = tokens.remove(0);
        let architecture = Architecture::load(&name_token.content)
            .map_err(|error| LineError::syntax(error.to_string(), name_token.column))?;

        for description in &architecture.segments {
            self.segment_order.push(description.name.clone());
            self.segments.insert(description.name.clone(), Segment::new(description.clone()));
        }

        self.architecture = Some(architecture);

        Ok(())
    }

    fn process_org_directive(
        &mut self,
        directive: &Token,
        tokens: &mut Vec<Token>,
    ) -> Result<(), LineError> {
        if tokens.is_empty() {
            return Err(LineError::syntax(
                format!("missing argument for directive '{}'", directive.content),
                directive.column,
            ));
        }

        let argument = tokens.remove(0);
        if argument.r#type != TokenType::Number {
            return Err(LineError::syntax(
                format!("unexpected token '{}'", argument.content),
                argument.column,
            ));
        }

        let address = number::parse_number(&argument.content, 0, 32, 0, NumberSign::ForceUnsigned)
            .map_err(|_| LineError::syntax(format!("unexpected token '{}'", argument.content), argument.column))?;

        let segment = self.current_segment_mut(directive)?;
        segment.set_offset(address)
    }

    fn process_segment_directive(
        &mut self,
        directive: &Token,
        tokens: &mut Vec<Token>,
    ) -> Result<(), LineError> {
        let segment_name = if directive.content == ".segment" {
            let argument = tokens.remove(0);
            if !self.segments.contains_key(&argument.content) {
                return Err(LineError::syntax(
                    format!("unrecognized segment '{}'", argument.content),
                    argument.column,
                ));
            }
            argument.content
        } else {
            directive.content[1..].to_string()
        };

        self.current_segment = Some(segment_name.clone());
        if !self.used_segments.contains(&segment_name) {
            self.used_segments.push(segment_name);
        }

        Ok(())
    }

    fn process_data_directive(
        &mut self,
        directive: &Token,
        tokens: &mut Vec<Token>,
    ) -> Result<(), LineError> {
        let width = match directive.content.as_str() {
            ".byte" => 8,
            ".word" => 16,
            _ => 32,
        };

        let mut value = 0u32;
        if !tokens.is_empty() {
            let argument = tokens.remove(0);
            if argument.r#type != TokenType::Number {
                return Err(LineError::syntax(
                    format!("unexpected token '{}'", argument.content),
                    argument.column,
                ));
            }

            value = number::parse_number(&argument.content, 0, width, 0, NumberSign::AllowSigned)
                .map_err(|_| {
                    LineError::syntax(format!("unexpected token '{}'", argument.content), argument.column)
                })?;
        }

        let segment = self.current_segment_mut(directive)?;
        segment.push_byte((value & 0xff) as u8)?;
        if width > 8 {
            segment.push_byte(((value >> 8) & 0xff) as u8)?;
            if width > 16 {
                segment.push_byte(((value >> 16) & 0xff) as u8)?;
                segment.push_byte(((value >> 24) & 0xff) as u8)?;
            }
        }

        Ok(())
    }

    fn process_string_directive(
        &mut self,
        directive: &Token,
        tokens: &mut Vec<Token>,
    ) -> Result<(), LineError> {
        let argument = tokens.remove(0);
        if argument.r#type != TokenType::String {
            return Err(LineError::syntax(
                format!("unexpected token '{}'", argument.content),
                argument.column,
            ));
        }
        if argument.error {
            return Err(LineError::syntax(
                format!("unterminated string '{}'", argument.content),
                argument.column,
            ));
        }

        let bytes = unescape_string(&argument.content);

        let segment = self.current_segment_mut(directive)?;
        for byte in bytes {
            segment.push_byte(byte)?;
        }
        if directive.content == ".stringz" {
            segment.push_byte(0)?;
        }

        Ok(())
    }

    fn process_include_directive(
        &mut self,
        _directive: &Token,
        tokens: &mut Vec<Token>,
        directory: &str,
    ) -> Result<(), LineError> {
        let argument = tokens.remove(0);
        if argument.r#type != TokenType::String {
            return Err(LineError::syntax(
                format!("unexpected token '{}'", argument.content),
                argument.column,
            ));
        }
        if argument.error {
            return Err(LineError::syntax(
                format!("unterminated string '{}'", argument.content),
                argument.column,
            ));
        }
        if let Some(extra) = tokens.first() {
            return Err(LineError::syntax(
                format!("unexpected token '{}'", extra.content),
                extra.column,
            ));
        }

        let include_path = argument.content.trim_matches('"').to_string();

        self.include_stack.push(self.current_line);
        let result = self.assemble(directory, &include_path);
        let returning_line = self.include_stack.pop().unwrap_or(self.current_line);

        result.map_err(|inner| {
            LineError::nested(format!(
                "error(s) encountered in file included on line {returning_line}: {inner}"
            ))
        })
    }

    fn process_label(&mut self, token: &Token) -> Result<(), LineError> {
        if self.labels.contains_key(&token.content) {
            return Err(LineError::syntax(
                format!("duplicate label '{}'", token.content),
                token.column,
            ));
        }

        let segment_name = self.current_segment.clone().expect("checked by caller");
        self.labels.insert(token.content.clone(), segment_name.clone());

        let segment = self.segments.get_mut(&segment_name).expect("segment exists");
        segment.add_label(&token.content);

        Ok(())
    }

    fn process_instruction(&mut self, mnemonic: &Token, tokens: &mut Vec<Token>) -> Result<(), LineError> {
        let architecture = self.architecture.as_ref().expect("checked by caller");
        let operands: Vec<Token> = tokens.drain(..).collect();

        let segment_name = self.current_segment.clone().expect("checked by caller");
        let segment = self.segments.get_mut(&segment_name).expect("segment exists");

        encoder::encode_instruction(architecture, mnemonic, &operands, segment)
    }

    fn current_segment_mut(&mut self, directive: &Token) -> Result<&mut Segment, LineError> {
        let name = self
            .current_segment
            .clone()
            .ok_or_else(|| LineError::syntax(format!("unexpected token '{}'", directive.content), directive.column))?;

        Ok(self.segments.get_mut(&name).expect("segment exists"))
    }

    /// Resolve every pending reference, either leaving external ones open
    /// for the linker (`forbid_external_symbols == false`) or demanding
    /// every reference resolves locally (`forbid_external_symbols == true`
    /// — raw-output mode, which produces no relocation records to carry
    /// them forward in).
    pub fn link(
        &mut self,
        output_symbols: bool,
        forbid_external_symbols: bool,
    ) -> Result<(), Error> {
        // Link-phase errors (unlike per-line assembly errors) carry no
        // source location in the original toolchain either.
        let symbols = resolver::resolve_references(&mut self.segments, !forbid_external_symbols)
            .map_err(|error| Error::Reference(error.to_string()))?;

        if output_symbols {
            let mut dump = String::new();
            let mut sorted: Vec<_> = symbols.into_iter().collect();
            sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (label, address) in sorted {
                dump.push_str(&format!("0x{address:08x} {label}\n"));
            }
            fs::write(format!("{}.sym", self.output_file), dump)
                .map_err(|error| Error::Config(error.to_string()))?;
        }

        Ok(())
    }

    /// Write the assembled output: a relocatable ELF32 object, or (when
    /// `raw` is set) the bare concatenation of every non-ephemeral used
    /// segment's bytes.
    pub fn write(&self, raw: bool) -> Result<(), Error> {
        let architecture = self.architecture.as_ref().expect("`.arch` directive is mandatory");

        if raw {
            let bytes = object::build_raw_output(&self.segments, &self.used_segments);
            fs::write(&self.output_file, bytes).map_err(|error| Error::Config(error.to_string()))?;
        } else {
            let file = object::build_object(architecture, &self.segments, &self.used_segments);
            let mut buffer = Vec::new();
            file.write(&mut buffer).map_err(|error| Error::Config(error.to_string()))?;
            fs::write(&self.output_file, buffer).map_err(|error| Error::Config(error.to_string()))?;
        }

        Ok(())
    }
}

fn unexpected_token(token: &Token) -> LineError {
    LineError::syntax(format!("unexpected token '{}'", token.content), token.column)
}

/// Expand the C-style escapes `.string`/`.stringz` accept, dropping the
/// delimiting quotes.
fn unescape_string(content: &str) -> Vec<u8> {
    let characters: Vec<char> = content.chars().collect();
    let mut bytes = Vec::new();
    let mut index = 1; // skip the opening quote

    while index < characters.len().saturating_sub(1) {
        let character = characters[index];

        if character == '\\' {
            index += 1;
            if index >= characters.len().saturating_sub(1) {
                break;
            }

            let escaped = characters[index];
            let byte = if escaped.is_ascii_digit() {
                escaped as u8 - b'0'
            } else {
                match escaped {
                    'a' => 0x07,
                    'b' => 0x08,
                    'f' => 0x0c,
                    'n' => b'\n',
                    'r' => b'\r',
                    't' => b'\t',
                    'v' => 0x0b,
                    other => other as u8,
                }
            };
            bytes.push(byte);
        } else {
            bytes.push(character as u8);
        }

        index += 1;
    }

    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_simple_string() {
        assert_eq!(unescape_string("\"hi\""), b"hi".to_vec());
    }

    #[test]
    fn test_unescape_newline_and_escaped_quote() {
        assert_eq!(unescape_string("\"a\\nb\\\"c\""), b"a\nb\"c".to_vec());
    }
}
