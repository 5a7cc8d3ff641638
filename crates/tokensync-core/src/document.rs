//! Design token document model.
//!
//! The document is a tree of namespaces (groups) and leaf tokens, stored on
//! disk in the DTCG shape:
//!
//! ```json
//! {
//!   "$schema": "https://schemas.designtokens.org/latest",
//!   "$metadata": { "version": 3, "hash": "..." },
//!   "color": {
//!     "primary": { "$value": "#3b82f6", "$type": "color" }
//!   }
//! }
//! ```
//!
//! An object carrying `$value` is a leaf; any other object is a namespace.
//! `$`-prefixed keys on a namespace are kept as [`Namespace::attributes`] and
//! never take part in hashing or diffing. Document-level metadata lives in
//! the explicit [`TokenDocument::metadata`] field.

use crate::error::TokenError;
use crate::path::TokenPath;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Schema URI written into newly created documents.
pub const DTCG_SCHEMA: &str = "https://schemas.designtokens.org/latest";

/// Token format version written into newly created documents.
pub const FORMAT_VERSION: &str = "1.0.0";

/// The closed set of token types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenType {
    /// A color (hex, rgb(), hsl() or reference)
    Color,
    /// A length with a CSS unit
    Dimension,
    /// A font family name or stack
    FontFamily,
    /// A font weight
    FontWeight,
    /// A box shadow
    Shadow,
    /// A unitless number
    Number,
    /// A time duration
    Duration,
    /// A cubic-bezier easing curve
    CubicBezier,
}

impl TokenType {
    /// Every token type, in taxonomy order.
    pub const ALL: [TokenType; 8] = [
        TokenType::Color,
        TokenType::Dimension,
        TokenType::FontFamily,
        TokenType::FontWeight,
        TokenType::Shadow,
        TokenType::Number,
        TokenType::Duration,
        TokenType::CubicBezier,
    ];

    /// The wire name of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Color => "color",
            TokenType::Dimension => "dimension",
            TokenType::FontFamily => "fontFamily",
            TokenType::FontWeight => "fontWeight",
            TokenType::Shadow => "shadow",
            TokenType::Number => "number",
            TokenType::Duration => "duration",
            TokenType::CubicBezier => "cubicBezier",
        }
    }

    /// Wire names of every token type.
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TokenError::InvalidType {
                given: s.to_string(),
            })
    }
}

/// A literal token value.
///
/// Text values of the form `{group.token}` are references to another token.
/// References are carried verbatim; resolving them is the build tool's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenValue {
    /// A string value
    Text(String),
    /// A numeric value
    Number(serde_json::Number),
    /// A short list of strings (e.g. a font stack)
    List(Vec<String>),
}

impl TokenValue {
    /// The referenced path if this value is an alias (`{a.b.c}`).
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            TokenValue::Text(text) => text
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .filter(|inner| !inner.is_empty()),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenValue::Text(text) => f.write_str(text),
            TokenValue::Number(number) => write!(f, "{number}"),
            TokenValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for TokenValue {
    fn from(value: &str) -> Self {
        TokenValue::Text(value.to_string())
    }
}

/// A leaf token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token value
    pub value: TokenValue,
    /// The declared token type
    pub token_type: TokenType,
    /// Optional human-readable description
    pub description: Option<String>,
    /// Additional `$`-prefixed fields (e.g. `$extensions`), carried verbatim
    pub attributes: IndexMap<String, Value>,
}

impl Token {
    /// Create a new token without extra attributes.
    #[must_use]
    pub fn new(value: TokenValue, token_type: TokenType, description: Option<String>) -> Self {
        Self {
            value,
            token_type,
            description,
            attributes: IndexMap::new(),
        }
    }

    /// Whether two tokens carry the same value and type.
    ///
    /// Descriptions and attributes do not count as a change.
    #[must_use]
    pub fn same_content(&self, other: &Token) -> bool {
        self.value == other.value && self.token_type == other.token_type
    }
}

/// A node in the token tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A grouping container
    Namespace(Namespace),
    /// A token
    Leaf(Token),
}

impl Node {
    /// The token if this node is a leaf.
    #[must_use]
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Node::Leaf(token) => Some(token),
            Node::Namespace(_) => None,
        }
    }

    /// Paths of every leaf under this node, depth-first, with `prefix` as the
    /// path of the node itself.
    #[must_use]
    pub fn leaf_paths(&self, prefix: &str) -> Vec<String> {
        match self {
            Node::Leaf(_) => vec![prefix.to_string()],
            Node::Namespace(ns) => ns
                .leaves()
                .into_iter()
                .map(|(path, _)| format!("{prefix}.{path}"))
                .collect(),
        }
    }
}

/// A grouping node holding ordered children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    /// Child nodes in key-insertion order
    pub children: IndexMap<String, Node>,
    /// `$`-prefixed group attributes, excluded from hashing and diffing
    pub attributes: IndexMap<String, Value>,
}

impl Namespace {
    /// Create an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the namespace has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Get the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] if any segment is absent.
    pub fn get(&self, path: &TokenPath) -> Result<&Node, TokenError> {
        self.namespace_at(path.parent_segments())
            .and_then(|parent| parent.children.get(path.last()))
            .ok_or_else(|| TokenError::not_found(path))
    }

    /// Place `token` at `path`, creating intermediate namespaces as needed.
    ///
    /// Returns the node previously stored at `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ConflictingPath`] if an intermediate segment is a
    /// token, or if the final segment is a namespace that still has children.
    pub fn insert_token(
        &mut self,
        path: &TokenPath,
        token: Token,
    ) -> Result<Option<Node>, TokenError> {
        let mut current = self;
        for segment in path.parent_segments() {
            let node = current
                .children
                .entry(segment.clone())
                .or_insert_with(|| Node::Namespace(Namespace::new()));
            current = match node {
                Node::Namespace(ns) => ns,
                Node::Leaf(_) => {
                    return Err(TokenError::ConflictingPath {
                        path: path.to_string(),
                        segment: segment.clone(),
                        reason: "is a token, not a group",
                    })
                }
            };
        }

        if let Some(Node::Namespace(existing)) = current.children.get(path.last()) {
            if !existing.is_empty() {
                return Err(TokenError::ConflictingPath {
                    path: path.to_string(),
                    segment: path.last().to_string(),
                    reason: "is a group that still contains tokens",
                });
            }
        }

        Ok(current
            .children
            .insert(path.last().to_string(), Node::Leaf(token)))
    }

    /// Remove and return the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] if any segment is absent.
    pub fn remove(&mut self, path: &TokenPath) -> Result<Node, TokenError> {
        self.namespace_at_mut(path.parent_segments())
            .and_then(|parent| parent.children.shift_remove(path.last()))
            .ok_or_else(|| TokenError::not_found(path))
    }

    /// Every leaf with its dot path, depth-first in key-insertion order.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, &Token)> {
        let mut out = Vec::new();
        collect_leaves(self, "", &mut out);
        out
    }

    /// Deterministic content hash over the tree.
    ///
    /// Keys are visited in sorted order so the hash does not depend on
    /// insertion order; attributes and descriptions of namespaces are ignored.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hash_namespace(self, &mut hasher);
        hasher.finalize().to_hex().to_string()
    }

    fn namespace_at(&self, segments: &[String]) -> Option<&Namespace> {
        segments
            .iter()
            .try_fold(self, |ns, segment| match ns.children.get(segment)? {
                Node::Namespace(child) => Some(child),
                Node::Leaf(_) => None,
            })
    }

    fn namespace_at_mut(&mut self, segments: &[String]) -> Option<&mut Namespace> {
        let mut current = self;
        for segment in segments {
            current = match current.children.get_mut(segment)? {
                Node::Namespace(child) => child,
                Node::Leaf(_) => return None,
            };
        }
        Some(current)
    }
}

impl FromIterator<(String, Node)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
            attributes: IndexMap::new(),
        }
    }
}

fn collect_leaves<'a>(ns: &'a Namespace, prefix: &str, out: &mut Vec<(String, &'a Token)>) {
    for (key, node) in &ns.children {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match node {
            Node::Leaf(token) => out.push((path, token)),
            Node::Namespace(child) => collect_leaves(child, &path, out),
        }
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_namespace(ns: &Namespace, hasher: &mut blake3::Hasher) {
    let mut keys: Vec<&String> = ns.children.keys().collect();
    keys.sort();

    hasher.update(b"{");
    for key in keys {
        hash_str(hasher, key);
        match &ns.children[key.as_str()] {
            Node::Namespace(child) => hash_namespace(child, hasher),
            Node::Leaf(token) => hash_token(token, hasher),
        }
    }
    hasher.update(b"}");
}

fn hash_token(token: &Token, hasher: &mut blake3::Hasher) {
    hasher.update(b"T");
    match &token.value {
        TokenValue::Text(text) => {
            hasher.update(b"s");
            hash_str(hasher, text);
        }
        TokenValue::Number(number) => {
            hasher.update(b"n");
            hash_str(hasher, &number.to_string());
        }
        TokenValue::List(items) => {
            hasher.update(b"l");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_str(hasher, item);
            }
        }
    }
    hash_str(hasher, token.token_type.as_str());
    match &token.description {
        Some(description) => {
            hasher.update(b"d");
            hash_str(hasher, description);
        }
        None => {
            hasher.update(b"-");
        }
    }
}

/// Document metadata, excluded from hashing and diffing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// Creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last save time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Save counter, bumped on every persisted save
    pub version: u64,
    /// Last mutation version minted against this document
    #[serde(skip_serializing_if = "is_zero")]
    pub ledger_version: u64,
    /// Content hash as of the last save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Author of the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Platforms the document is built for
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unrecognized metadata fields
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// A complete token document.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenDocument {
    /// `$schema`
    pub schema: Option<String>,
    /// `$version` (the token format version, not the save counter)
    pub format_version: Option<String>,
    /// `$metadata`
    pub metadata: Metadata,
    /// The token tree
    pub tokens: Namespace,
}

impl TokenDocument {
    /// A document with no tokens.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema: Some(DTCG_SCHEMA.to_string()),
            format_version: Some(FORMAT_VERSION.to_string()),
            metadata: Metadata::default(),
            tokens: Namespace::new(),
        }
    }

    /// The starter document created when no tokens are stored yet.
    #[must_use]
    pub fn with_defaults(author: &str, platforms: &[String]) -> Self {
        let tokens = Namespace::from_iter([
            group(
                "color",
                [
                    group(
                        "primitive",
                        [
                            group("blue", [leaf("500", "#3b82f6", TokenType::Color, None)]),
                            group(
                                "gray",
                                [
                                    leaf("900", "#111827", TokenType::Color, None),
                                    leaf("100", "#f3f4f6", TokenType::Color, None),
                                ],
                            ),
                        ],
                    ),
                    group(
                        "semantic",
                        [
                            leaf(
                                "primary",
                                "{color.primitive.blue.500}",
                                TokenType::Color,
                                Some("Primary brand color"),
                            ),
                            leaf(
                                "text",
                                "{color.primitive.gray.900}",
                                TokenType::Color,
                                Some("Primary text color"),
                            ),
                            leaf(
                                "background",
                                "{color.primitive.gray.100}",
                                TokenType::Color,
                                Some("Background color"),
                            ),
                        ],
                    ),
                ],
            ),
            group(
                "spacing",
                [
                    group(
                        "primitive",
                        [
                            leaf("4", "1rem", TokenType::Dimension, None),
                            leaf("8", "2rem", TokenType::Dimension, None),
                        ],
                    ),
                    group(
                        "semantic",
                        [
                            leaf(
                                "md",
                                "{spacing.primitive.4}",
                                TokenType::Dimension,
                                Some("Medium spacing"),
                            ),
                            leaf(
                                "lg",
                                "{spacing.primitive.8}",
                                TokenType::Dimension,
                                Some("Large spacing"),
                            ),
                        ],
                    ),
                ],
            ),
        ]);

        Self {
            metadata: Metadata {
                created: Some(Utc::now()),
                author: Some(author.to_string()),
                platforms: platforms.to_vec(),
                ..Metadata::default()
            },
            tokens,
            ..Self::empty()
        }
    }

    /// Content hash of the token tree, ignoring metadata.
    #[must_use]
    pub fn content_hash(&self) -> String {
        self.tokens.content_hash()
    }

    /// Advance the save counter, stamp the modification time and refresh
    /// the stored hash. Returns the new hash.
    pub fn stamp(&mut self, now: DateTime<Utc>) -> String {
        let hash = self.content_hash();
        self.metadata.modified = Some(now);
        self.metadata.version += 1;
        self.metadata.hash = Some(hash.clone());
        hash
    }
}

impl Default for TokenDocument {
    fn default() -> Self {
        Self::empty()
    }
}

fn group<const N: usize>(key: &str, children: [(String, Node); N]) -> (String, Node) {
    (
        key.to_string(),
        Node::Namespace(Namespace::from_iter(children)),
    )
}

fn leaf(
    key: &str,
    value: &str,
    token_type: TokenType,
    description: Option<&str>,
) -> (String, Node) {
    (
        key.to_string(),
        Node::Leaf(Token::new(
            TokenValue::from(value),
            token_type,
            description.map(str::to_string),
        )),
    )
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("$value", &self.value)?;
        map.serialize_entry("$type", &self.token_type)?;
        if let Some(description) = &self.description {
            map.serialize_entry("$description", description)?;
        }
        for (key, value) in &self.attributes {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in &self.attributes {
            map.serialize_entry(key, value)?;
        }
        for (key, node) in &self.children {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Namespace(ns) => ns.serialize(serializer),
            Node::Leaf(token) => token.serialize(serializer),
        }
    }
}

impl Serialize for TokenDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(schema) = &self.schema {
            map.serialize_entry("$schema", schema)?;
        }
        if let Some(version) = &self.format_version {
            map.serialize_entry("$version", version)?;
        }
        map.serialize_entry("$metadata", &self.metadata)?;
        for (key, value) in &self.tokens.attributes {
            map.serialize_entry(key, value)?;
        }
        for (key, node) in &self.tokens.children {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(NodeVisitor)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Node::deserialize(deserializer)? {
            Node::Leaf(token) => Ok(token),
            Node::Namespace(_) => Err(de::Error::custom("expected a token with `$value`")),
        }
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Node::deserialize(deserializer)? {
            Node::Namespace(ns) => Ok(ns),
            Node::Leaf(_) => Err(de::Error::custom("expected a token group")),
        }
    }
}

impl<'de> Deserialize<'de> for TokenDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut tokens = Namespace::deserialize(deserializer)?;

        let schema = take_string(&mut tokens.attributes, "$schema").map_err(de::Error::custom)?;
        let format_version =
            take_string(&mut tokens.attributes, "$version").map_err(de::Error::custom)?;
        let metadata = match tokens.attributes.shift_remove("$metadata") {
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| de::Error::custom(format!("invalid $metadata: {e}")))?,
            None => Metadata::default(),
        };

        Ok(Self {
            schema,
            format_version,
            metadata,
            tokens,
        })
    }
}

fn take_string(
    attributes: &mut IndexMap<String, Value>,
    key: &str,
) -> Result<Option<String>, String> {
    match attributes.shift_remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(format!("{key} must be a string, got {other}")),
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a token object with `$value` or a token group")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut value: Option<TokenValue> = None;
        let mut attributes = IndexMap::new();
        let mut children = IndexMap::new();

        while let Some(key) = map.next_key::<String>()? {
            if key == "$value" {
                value = Some(map.next_value()?);
            } else if key.starts_with('$') {
                attributes.insert(key, map.next_value::<Value>()?);
            } else {
                let child = map.next_value::<Node>()?;
                children.insert(key, child);
            }
        }

        let Some(value) = value else {
            return Ok(Node::Namespace(Namespace {
                children,
                attributes,
            }));
        };

        if let Some(key) = children.keys().next() {
            return Err(de::Error::custom(format!(
                "token with `$value` must not contain child '{key}'"
            )));
        }

        let token_type = match attributes.shift_remove("$type") {
            Some(Value::String(name)) => name.parse::<TokenType>().map_err(de::Error::custom)?,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "`$type` must be a string, got {other}"
                )))
            }
            None => return Err(de::Error::custom("token is missing `$type`")),
        };

        let description = take_string(&mut attributes, "$description").map_err(de::Error::custom)?;

        Ok(Node::Leaf(Token {
            value,
            token_type,
            description,
            attributes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> TokenPath {
        TokenPath::parse(p).unwrap()
    }

    fn color(value: &str) -> Token {
        Token::new(TokenValue::from(value), TokenType::Color, None)
    }

    #[test]
    fn token_type_names() {
        assert_eq!("fontFamily".parse::<TokenType>(), Ok(TokenType::FontFamily));
        assert_eq!(TokenType::CubicBezier.to_string(), "cubicBezier");
        let err = "gradient".parse::<TokenType>().unwrap_err();
        assert!(err.to_string().contains("gradient"));
        assert!(err.to_string().contains("cubicBezier"));
    }

    #[test]
    fn token_value_reference() {
        assert_eq!(
            TokenValue::from("{color.primitive.blue.500}").reference(),
            Some("color.primitive.blue.500")
        );
        assert_eq!(TokenValue::from("#fff").reference(), None);
        assert_eq!(TokenValue::from("{}").reference(), None);
    }

    #[test]
    fn document_json_roundtrip_preserves_order() {
        let raw = json!({
            "$schema": DTCG_SCHEMA,
            "$metadata": { "version": 4, "author": "design" },
            "zeta": { "$value": 1, "$type": "number" },
            "alpha": {
                "$description": "group docs",
                "b": { "$value": "2rem", "$type": "dimension", "$description": "big" },
                "a": { "$value": ["Inter", "sans-serif"], "$type": "fontFamily" }
            }
        });

        let doc: TokenDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.metadata.version, 4);
        assert_eq!(doc.metadata.author.as_deref(), Some("design"));

        let keys: Vec<_> = doc.tokens.children.keys().cloned().collect();
        assert_eq!(keys, ["zeta", "alpha"]);

        let Node::Namespace(alpha) = &doc.tokens.children["alpha"] else {
            panic!("alpha should be a group");
        };
        assert_eq!(alpha.attributes["$description"], json!("group docs"));
        let leaves: Vec<_> = doc.tokens.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(leaves, ["zeta", "alpha.b", "alpha.a"]);

        let back: TokenDocument =
            serde_json::from_str(&serde_json::to_string(&doc).unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn document_rejects_invalid_leaves() {
        let missing_type = json!({ "a": { "$value": "#fff" } });
        assert!(serde_json::from_value::<TokenDocument>(missing_type).is_err());

        let bad_type = json!({ "a": { "$value": "#fff", "$type": "gradient" } });
        assert!(serde_json::from_value::<TokenDocument>(bad_type).is_err());

        let leaf_with_children = json!({
            "a": { "$value": "#fff", "$type": "color", "b": { "$value": 1, "$type": "number" } }
        });
        assert!(serde_json::from_value::<TokenDocument>(leaf_with_children).is_err());
    }

    #[test]
    fn insert_creates_intermediate_namespaces() {
        let mut tokens = Namespace::new();
        let previous = tokens
            .insert_token(&path("color.primitive.blue.500"), color("#3b82f6"))
            .unwrap();
        assert!(previous.is_none());

        let node = tokens.get(&path("color.primitive.blue.500")).unwrap();
        assert_eq!(node.as_token().unwrap().value, TokenValue::from("#3b82f6"));
        assert!(matches!(
            tokens.get(&path("color.primitive")).unwrap(),
            Node::Namespace(_)
        ));
    }

    #[test]
    fn insert_through_leaf_conflicts() {
        let mut tokens = Namespace::new();
        tokens.insert_token(&path("color.brand"), color("#000")).unwrap();

        let err = tokens
            .insert_token(&path("color.brand.dark"), color("#111"))
            .unwrap_err();
        assert!(matches!(
            err,
            TokenError::ConflictingPath { ref segment, .. } if segment == "brand"
        ));
    }

    #[test]
    fn insert_over_populated_group_conflicts() {
        let mut tokens = Namespace::new();
        tokens.insert_token(&path("color.brand.dark"), color("#111")).unwrap();

        let err = tokens.insert_token(&path("color.brand"), color("#000")).unwrap_err();
        assert!(matches!(err, TokenError::ConflictingPath { .. }));
    }

    #[test]
    fn overwrite_keeps_key_position() {
        let mut tokens = Namespace::new();
        tokens.insert_token(&path("a"), color("#000")).unwrap();
        tokens.insert_token(&path("b"), color("#111")).unwrap();
        let previous = tokens.insert_token(&path("a"), color("#222")).unwrap();

        assert!(matches!(previous, Some(Node::Leaf(_))));
        let keys: Vec<_> = tokens.children.keys().cloned().collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn get_and_remove_missing_paths() {
        let mut tokens = Namespace::new();
        tokens.insert_token(&path("color.brand"), color("#000")).unwrap();

        assert!(matches!(
            tokens.get(&path("color.missing")),
            Err(TokenError::NotFound { .. })
        ));
        assert!(matches!(
            tokens.get(&path("color.brand.deeper")),
            Err(TokenError::NotFound { .. })
        ));
        assert!(matches!(
            tokens.remove(&path("nope.brand")),
            Err(TokenError::NotFound { .. })
        ));

        let removed = tokens.remove(&path("color.brand")).unwrap();
        assert!(matches!(removed, Node::Leaf(_)));
        assert!(tokens.get(&path("color.brand")).is_err());
    }

    #[test]
    fn content_hash_ignores_order_and_metadata() {
        let mut a = TokenDocument::empty();
        a.tokens.insert_token(&path("x"), color("#000")).unwrap();
        a.tokens.insert_token(&path("y"), color("#111")).unwrap();

        let mut b = TokenDocument::empty();
        b.tokens.insert_token(&path("y"), color("#111")).unwrap();
        b.tokens.insert_token(&path("x"), color("#000")).unwrap();
        b.metadata.version = 99;
        b.metadata.author = Some("someone".into());
        b.tokens
            .attributes
            .insert("$description".into(), json!("ignored"));

        assert_eq!(a.content_hash(), b.content_hash());

        b.tokens.insert_token(&path("x"), color("#222")).unwrap();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn stamp_bumps_version_and_hash() {
        let mut doc = TokenDocument::with_defaults("tokensync", &["web".to_string()]);
        let hash = doc.stamp(Utc::now());
        assert_eq!(doc.metadata.version, 1);
        assert_eq!(doc.metadata.hash.as_deref(), Some(hash.as_str()));
        assert!(doc.metadata.modified.is_some());

        doc.stamp(Utc::now());
        assert_eq!(doc.metadata.version, 2);
    }

    #[test]
    fn default_document_contents() {
        let doc = TokenDocument::with_defaults("tokensync", &[]);
        let primary = doc.tokens.get(&path("color.semantic.primary")).unwrap();
        let token = primary.as_token().unwrap();
        assert_eq!(token.value.reference(), Some("color.primitive.blue.500"));
        assert_eq!(token.description.as_deref(), Some("Primary brand color"));
        assert_eq!(doc.tokens.leaves().len(), 10);
    }
}
