//! Dot-separated token paths.
//!
//! A path such as `color.primitive.blue.500` addresses a node in the token
//! tree, one segment per nesting level. Segments are restricted to ASCII
//! letters, digits, `-` and `_`; `$` is never valid because `$`-prefixed keys
//! carry token fields and group attributes.

use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Canonical path to a node within a token document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenPath {
    segments: Vec<String>,
}

impl TokenPath {
    /// Parse a dot-separated path.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Validation`] if the path is empty, has an empty
    /// segment, or contains characters outside `[A-Za-z0-9_-]`.
    pub fn parse(path: &str) -> Result<Self, TokenError> {
        if path.is_empty() {
            return Err(TokenError::Validation("token path must not be empty".into()));
        }

        let segments = path
            .split('.')
            .map(|segment| {
                if segment.is_empty() {
                    return Err(TokenError::Validation(format!(
                        "invalid token path format: '{path}'"
                    )));
                }
                if !segment.chars().all(is_segment_char) {
                    return Err(TokenError::Validation(format!(
                        "token path contains invalid characters: '{path}'"
                    )));
                }
                Ok(segment.to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    /// Parse a URL-style path (`color/semantic/primary`) into a token path.
    ///
    /// # Errors
    ///
    /// Same as [`TokenPath::parse`].
    pub fn from_url_path(path: &str) -> Result<Self, TokenError> {
        Self::parse(&path.trim_matches('/').replace('/', "."))
    }

    /// All segments from the document root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments leading to the parent namespace.
    #[must_use]
    pub fn parent_segments(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The final segment.
    #[must_use]
    pub fn last(&self) -> &str {
        // parse() never yields an empty segment list
        &self.segments[self.segments.len() - 1]
    }
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl std::fmt::Display for TokenPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for TokenPath {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TokenPath {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TokenPath> for String {
    fn from(path: TokenPath) -> Self {
        path.to_string()
    }
}
