//! Input validation for token writes.

use crate::document::{TokenType, TokenValue};
use crate::error::TokenError;

/// Largest number of items accepted in one batch write.
pub const MAX_BATCH_SIZE: usize = 100;

const CSS_UNITS: [&str; 11] = [
    "px", "rem", "em", "%", "vh", "vw", "pt", "pc", "in", "cm", "mm",
];

/// Check that `value` is well-formed for `token_type`.
///
/// Only text values of `color` and `dimension` tokens are inspected; other
/// types accept any value.
///
/// # Errors
///
/// Returns [`TokenError::Validation`] describing what is wrong with the value.
pub fn validate_value(token_type: TokenType, value: &TokenValue) -> Result<(), TokenError> {
    let TokenValue::Text(text) = value else {
        return Ok(());
    };
    match token_type {
        TokenType::Color => validate_color(text),
        TokenType::Dimension => validate_dimension(text),
        _ => Ok(()),
    }
}

/// Check the number of items in a batch write.
///
/// # Errors
///
/// Returns [`TokenError::Validation`] for an empty or oversized batch.
pub fn validate_batch_len(len: usize) -> Result<(), TokenError> {
    if len == 0 {
        return Err(TokenError::Validation("token list cannot be empty".into()));
    }
    if len > MAX_BATCH_SIZE {
        return Err(TokenError::Validation(format!(
            "cannot update more than {MAX_BATCH_SIZE} tokens at once"
        )));
    }
    Ok(())
}

fn validate_color(text: &str) -> Result<(), TokenError> {
    if let Some(hex) = text.strip_prefix('#') {
        if !matches!(hex.len(), 3 | 6 | 8) {
            return Err(TokenError::Validation(
                "hex colors must be 3, 6, or 8 characters after #".into(),
            ));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TokenError::Validation(format!(
                "invalid hex color format: '{text}'"
            )));
        }
        return Ok(());
    }

    if text.starts_with("rgb") || text.starts_with("hsl") || text.starts_with('{') {
        return Ok(());
    }

    Err(TokenError::Validation(format!(
        "color values must be hex (#fff), rgb(), hsl(), or token references, got '{text}'"
    )))
}

fn validate_dimension(text: &str) -> Result<(), TokenError> {
    let has_unit = CSS_UNITS.iter().any(|unit| text.ends_with(unit));
    let is_numeric = {
        let digits: String = text.chars().filter(|c| *c != '.' && *c != '-').collect();
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    };

    if has_unit || is_numeric || text.starts_with('{') {
        Ok(())
    } else {
        Err(TokenError::Validation(format!(
            "dimension values must have a CSS unit or be token references, got '{text}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(token_type: TokenType, value: &str) -> Result<(), TokenError> {
        validate_value(token_type, &TokenValue::from(value))
    }

    #[test]
    fn colors() {
        for ok in ["#fff", "#3b82f6", "#3b82f6cc", "rgb(0, 0, 0)", "hsla(0,0%,0%,1)", "{color.a}"] {
            assert!(check(TokenType::Color, ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["#ff", "#12345", "#ggg", "blue", ""] {
            assert!(check(TokenType::Color, bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn dimensions() {
        for ok in ["16px", "1.5rem", "100%", "-4", "0.25", "{spacing.md}"] {
            assert!(check(TokenType::Dimension, ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["large", "12 apples", "-"] {
            assert!(check(TokenType::Dimension, bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn other_types_are_unchecked() {
        assert!(check(TokenType::FontFamily, "anything goes").is_ok());
        let number = TokenValue::Number(serde_json::Number::from(12));
        assert!(validate_value(TokenType::Color, &number).is_ok());
    }

    #[test]
    fn batch_bounds() {
        assert!(validate_batch_len(0).is_err());
        assert!(validate_batch_len(1).is_ok());
        assert!(validate_batch_len(MAX_BATCH_SIZE).is_ok());
        assert!(validate_batch_len(MAX_BATCH_SIZE + 1).is_err());
    }
}
