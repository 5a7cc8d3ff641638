//! Errors raised by token document operations.

use crate::document::TokenType;

/// Errors that can occur while addressing or editing a token document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// A path segment does not exist
    #[error("token not found at path: {path}")]
    NotFound {
        /// Full dot path that was requested
        path: String,
    },
    /// The token type is not part of the closed taxonomy
    #[error("invalid token type '{given}'; valid types: {}", TokenType::names().join(", "))]
    InvalidType {
        /// The rejected type name
        given: String,
    },
    /// A namespace and a leaf collide on the same segment
    #[error("cannot create token at path '{path}': '{segment}' {reason}")]
    ConflictingPath {
        /// Full dot path that was requested
        path: String,
        /// The offending segment
        segment: String,
        /// Why the segment cannot be used
        reason: &'static str,
    },
    /// A value or path is malformed
    #[error("validation error: {0}")]
    Validation(String),
}

impl TokenError {
    pub(crate) fn not_found(path: impl std::fmt::Display) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }
}
