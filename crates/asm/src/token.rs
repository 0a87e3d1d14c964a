//! Lexer: turns one line of source into a sequence of [`Token`].

/// The kind of a [`Token`], inferred from its first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// An identifier immediately followed by `:`, with the colon stripped.
    Label,
    /// A bare word: starts with a letter, `_`, or `$`.
    Identifier,
    /// Starts with `.`; a directive name.
    Directive,
    /// A double-quoted string, including its delimiting quotes.
    String,
    /// Starts with a digit, or `-` followed by a digit.
    Number,
    /// One of `,`, `(`, `)`.
    Punctuator,
    /// None of the above.
    Unknown,
}

/// A single lexical token, anchored to the column it started at within its
/// source line.
#[derive(Debug, Clone)]
pub struct Token {
    /// The token's text. For [`TokenType::Label`], the trailing `:` has
    /// already been stripped. For [`TokenType::String`], the delimiting
    /// quotes are still present.
    pub content: String,
    /// The token's inferred kind.
    pub r#type: TokenType,
    /// Zero-based column, within its source line, the token started at.
    pub column: usize,
    /// Set when the token is malformed: an unterminated string, or a
    /// trailing `:` on something other than an identifier.
    pub error: bool,
}

impl Token {
    fn new(content: String, column: usize) -> Self {
        let mut error = false;
        let first = content.chars().next().unwrap_or('\0');

        let mut r#type = if first == '.' {
            TokenType::Directive
        } else if first == '"' {
            let chars: Vec<char> = content.chars().collect();
            let last = *chars.last().unwrap_or(&'\0');
            let second_last = if chars.len() >= 2 { chars[chars.len() - 2] } else { '\0' };

            if last != '"' || second_last == '\\' {
                error = true;
            }

            TokenType::String
        } else if first == '-' || first.is_ascii_digit() {
            TokenType::Number
        } else if first == '_' || first == '$' || first.is_ascii_alphabetic() {
            TokenType::Identifier
        } else if first == ',' || first == '(' || first == ')' {
            TokenType::Punctuator
        } else {
            TokenType::Unknown
        };

        let mut final_content = content.clone();
        if content.ends_with(':') {
            if r#type == TokenType::Identifier {
                r#type = TokenType::Label;
                final_content = content[..content.len() - 1].to_string();
            } else {
                error = true;
            }
        }

        Self { content: final_content, r#type, column, error }
    }
}

fn is_word_delimiter(character: char) -> bool {
    character.is_whitespace() || character == ',' || character == ';' || character == '(' ||
        character == ')' ||
        character == '"'
}

fn eat_whitespace(characters: &[char], current: &mut usize) -> bool {
    while *current < characters.len() && characters[*current].is_whitespace() {
        *current += 1;
    }

    *current < characters.len()
}

/// A bare word: an identifier, directive, number, or label, up to (and
/// possibly including, if it promotes the word to a label) the next `:`.
fn read_word(characters: &[char], current: &mut usize) -> String {
    let start = *current;

    loop {
        if *current >= characters.len() || is_word_delimiter(characters[*current]) {
            break;
        }

        *current += 1;

        if *current < characters.len() && characters[*current] == ':' {
            *current += 1;
            break;
        }
    }

    characters[start..*current].iter().collect()
}

/// A double-quoted string, honoring `\`-escaped characters so an escaped
/// quote doesn't end the string early.
fn read_string(characters: &[char], current: &mut usize) -> String {
    let start = *current;
    *current += 1;

    while *current < characters.len() {
        if characters[*current] == '\\' {
            *current += 1;
        } else if characters[*current] == '"' {
            *current += 1;
            break;
        }

        *current += 1;
    }

    let end = (*current).min(characters.len());
    *current = end;

    characters[start..end].iter().collect()
}

fn read_punctuator(characters: &[char], current: &mut usize) -> String {
    let start = *current;
    *current += 1;

    characters[start..*current].iter().collect()
}

/// Tokenize a single line of source, stopping at the first unquoted `;`.
pub fn tokenize(line: &str) -> Vec<Token> {
    let characters: Vec<char> = line.chars().collect();
    let mut current = 0usize;
    let mut tokens = Vec::new();

    if !eat_whitespace(&characters, &mut current) {
        return tokens;
    }

    while current < characters.len() {
        let token_start = current;

        if characters[current] == ';' {
            break;
        }

        let token_string = if characters[current] == '"' {
            read_string(&characters, &mut current)
        } else if matches!(characters[current], ',' | '(' | ')') {
            read_punctuator(&characters, &mut current)
        } else {
            read_word(&characters, &mut current)
        };

        if !token_string.is_empty() {
            tokens.push(Token::new(token_string, token_start));
        }

        if !eat_whitespace(&characters, &mut current) {
            break;
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_instruction_line() {
        let tokens = tokenize("  add $1, $2, 10 ; comment");

        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].content, "add");
        assert_eq!(tokens[0].r#type, TokenType::Identifier);
        assert_eq!(tokens[1].content, "$1");
        assert_eq!(tokens[1].r#type, TokenType::Identifier);
        assert_eq!(tokens[2].content, "$2");
        assert_eq!(tokens[3].content, "10");
        assert_eq!(tokens[3].r#type, TokenType::Number);
    }

    #[test]
    fn test_label_promotion() {
        let tokens = tokenize("loop:");

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].content, "loop");
        assert_eq!(tokens[0].r#type, TokenType::Label);
        assert!(!tokens[0].error);
    }

    #[test]
    fn test_directive_and_string() {
        let tokens = tokenize(r#".string "hi\"there""#);

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].r#type, TokenType::Directive);
        assert_eq!(tokens[1].r#type, TokenType::String);
        assert!(!tokens[1].error);
    }

    #[test]
    fn test_unterminated_string_is_flagged() {
        let tokens = tokenize(r#".string "oops"#);

        assert_eq!(tokens.len(), 2);
        assert!(tokens[1].error);
    }

    #[test]
    fn test_trailing_colon_on_number_is_an_error() {
        let tokens = tokenize("5:");

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].r#type, TokenType::Number);
        assert!(tokens[0].error);
    }

    #[test]
    fn test_empty_line() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("; just a comment").is_empty());
    }
}
