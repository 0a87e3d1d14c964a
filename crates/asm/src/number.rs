//! Numeric literal parsing.

/// How a literal's sign is constrained before it's packed into `max_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberSign {
    /// A leading `-` is rejected; the literal must fit unsigned in
    /// `max_bits`.
    ForceUnsigned,
    /// A leading `-` is accepted; the magnitude must fit in the signed or
    /// unsigned range of `max_bits`, whichever the literal's sign implies.
    AllowSigned,
    /// The literal must fit in the *signed* range of `max_bits`, whatever
    /// its sign.
    ForceSigned,
}

/// Why a literal was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NumberError {
    /// A digit didn't belong to the detected base, or the literal's body
    /// was empty.
    #[error("malformed number")]
    Malformed,
    /// The literal's magnitude doesn't fit in `max_bits` under the
    /// requested sign constraint.
    #[error("number out of range")]
    OutOfRange,
}

/// Parse a numeric literal's text (starting `skip` characters in, to allow
/// a caller to have already consumed a fixed prefix) into its two's
/// complement, `max_bits`-wide encoding, then subtract `subtract` from the
/// result (used by `reg` fragments, where the register number is offset by
/// the fragment's declared `offset`).
///
/// Bases are auto-detected from the prefix: `0x`/`0X` is hexadecimal,
/// `0b`/`0B` is binary, a lone leading `0` is octal, anything else is
/// decimal. `_` may appear between digits as a separator. The literal `"0"`
/// or `"-0"` is special-cased: its magnitude is `0 - subtract`, computed
/// before any base detection.
pub fn parse_number(
    content: &str,
    skip: usize,
    max_bits: u32,
    subtract: u32,
    sign: NumberSign,
) -> Result<u32, NumberError> {
    let text = &content[skip..];

    if text == "0" || text == "-0" {
        let value = 0u32.wrapping_sub(subtract);
        check_range(value, max_bits, false, sign)?;

        return Ok(value);
    }

    let bytes: Vec<char> = text.chars().collect();
    let mut index = 0usize;
    let mut negative = false;

    if bytes.first() == Some(&'-') {
        if sign == NumberSign::ForceUnsigned {
            return Err(NumberError::OutOfRange);
        }

        negative = true;
        index += 1;
    }

    let mut base = 10u32;
    if bytes.get(index) == Some(&'0') {
        index += 1;

        match bytes.get(index) {
            Some('x') | Some('X') => {
                index += 1;
                base = 16;
            }
            Some('b') | Some('B') => {
                index += 1;
                base = 2;
            }
            _ => base = 8,
        }
    }

    let digits: Vec<char> = bytes[index..].iter().copied().filter(|character| *character != '_').collect();
    if digits.is_empty() {
        return Err(NumberError::Malformed);
    }

    let mut value = 0u32;
    let digit_count = digits.len();

    for (position, character) in digits.iter().enumerate() {
        let digit = digit_value(*character, base).ok_or(NumberError::Malformed)?;

        value = match base {
            16 => (value << 4) | digit,
            8 => (value << 3) | digit,
            2 => (value << 1) | digit,
            _ => value.wrapping_mul(10).wrapping_add(digit),
        };

        let bits_count = 32 - value.leading_zeros();
        if bits_count >= 32 && position + 1 < digit_count {
            return Err(NumberError::OutOfRange);
        }
    }

    if sign == NumberSign::ForceUnsigned {
        value = value.wrapping_sub(subtract);
    }

    check_range(value, max_bits, negative, sign)?;

    if negative {
        value = (!value).wrapping_add(1);
    }

    Ok(value)
}

fn digit_value(character: char, base: u32) -> Option<u32> {
    let value = match character {
        '0'..='9' => character as u32 - '0' as u32,
        'a'..='f' => character as u32 - 'a' as u32 + 10,
        'A'..='F' => character as u32 - 'A' as u32 + 10,
        _ => return None,
    };

    if value < base {
        Some(value)
    } else {
        None
    }
}

fn check_range(value: u32, max_bits: u32, negative: bool, sign: NumberSign) -> Result<(), NumberError> {
    let bits_count = 32 - value.leading_zeros();
    if bits_count > max_bits {
        return Err(NumberError::OutOfRange);
    }

    if sign != NumberSign::ForceUnsigned && negative && value > (1u32 << (max_bits - 1)) {
        return Err(NumberError::OutOfRange);
    }

    if sign == NumberSign::ForceSigned && !negative && value > (1u32 << (max_bits - 1)) - 1 {
        return Err(NumberError::OutOfRange);
    }

    Ok(())
}
