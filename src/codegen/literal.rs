use std::num::IntErrorKind;

use super::CompileError;
use crate::bytecode::Constant;

/// Numeric literal text → constant.
///
/// An optional trailing `b`, `s` or `l` (any case) is a width suffix. Only
/// `l` changes anything: it makes the literal a LONG, which must fit in an
/// i64. `b` and `s` are accepted for compatibility and produce a NUMBER.
pub fn numeric(text: &str) -> Result<Constant, CompileError> {
    let (digits, suffix) = match text.char_indices().last() {
        Some((i, c)) if matches!(c.to_ascii_lowercase(), 'b' | 's' | 'l') => {
            (&text[..i], Some(c.to_ascii_lowercase()))
        }
        _ => (text, None),
    };

    if suffix == Some('l') {
        return digits.parse::<i64>().map(Constant::Long).map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                CompileError::LongOutOfRange { text: text.to_string() }
            }
            _ => CompileError::InvalidLiteral { text: text.to_string() },
        });
    }

    digits
        .parse::<f64>()
        .map(Constant::Number)
        .map_err(|_| CompileError::InvalidLiteral { text: text.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers() {
        assert_eq!(numeric("42").unwrap(), Constant::Number(42.0));
        assert_eq!(numeric("2.5").unwrap(), Constant::Number(2.5));
    }

    #[test]
    fn byte_and_short_suffixes_are_numbers() {
        assert_eq!(numeric("7b").unwrap(), Constant::Number(7.0));
        assert_eq!(numeric("7S").unwrap(), Constant::Number(7.0));
    }

    #[test]
    fn long_suffix() {
        assert_eq!(numeric("12l").unwrap(), Constant::Long(12));
        assert_eq!(numeric("9223372036854775807L").unwrap(), Constant::Long(i64::MAX));
    }

    #[test]
    fn long_out_of_range() {
        assert!(matches!(
            numeric("9223372036854775808l"),
            Err(CompileError::LongOutOfRange { .. })
        ));
    }

    #[test]
    fn fractional_long_is_invalid() {
        assert!(matches!(numeric("1.5l"), Err(CompileError::InvalidLiteral { .. })));
    }
}
