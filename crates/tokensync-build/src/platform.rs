//! Build target platforms.

use crate::builder::BuildError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// A platform the build tool can emit tokens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// CSS custom properties and JS modules
    Web,
    /// Swift
    Ios,
    /// Android resources
    Android,
    /// Dart
    Flutter,
    /// SCSS variables
    Scss,
    /// Flat JSON
    Json,
}

impl Platform {
    /// Every platform.
    pub const ALL: [Platform; 6] = [
        Platform::Web,
        Platform::Ios,
        Platform::Android,
        Platform::Flutter,
        Platform::Scss,
        Platform::Json,
    ];

    /// Platform name as used in paths and build tool arguments.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Flutter => "flutter",
            Platform::Scss => "scss",
            Platform::Json => "json",
        }
    }

    /// The file served by the download endpoint.
    #[must_use]
    pub fn main_file(self) -> &'static str {
        match self {
            Platform::Web => "tokens.css",
            Platform::Ios => "DesignTokens.swift",
            Platform::Android => "design_tokens.xml",
            Platform::Flutter => "design_tokens.dart",
            Platform::Scss => "tokens.scss",
            Platform::Json => "tokens-flat.json",
        }
    }

    /// File formats the platform produces.
    #[must_use]
    pub fn formats(self) -> &'static [&'static str] {
        match self {
            Platform::Web => &["css", "json", "js"],
            Platform::Ios => &["swift", "h"],
            Platform::Android => &["xml", "java"],
            Platform::Flutter => &["dart"],
            Platform::Scss => &["scss"],
            Platform::Json => &["json"],
        }
    }

    /// Comma-separated list of every platform name.
    #[must_use]
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| BuildError::UnknownPlatform {
                given: s.to_string(),
                available: Self::available(),
            })
    }
}

/// Media type for a build output, chosen by file extension.
#[must_use]
pub fn media_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("css") => "text/css",
        Some("scss") => "text/scss",
        Some("swift") => "text/x-swift",
        Some("xml") => "application/xml",
        Some("dart") => "text/x-dart",
        Some("json") => "application/json",
        Some("js") => "text/javascript",
        _ => "text/plain",
    }
}
