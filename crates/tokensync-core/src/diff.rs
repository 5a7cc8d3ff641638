//! Change detection between two document snapshots.
//!
//! [`diff`] walks the *new* tree and reports every leaf whose value or type
//! differs from the node at the same path in the old tree. Paths present only
//! in the old tree are not reported; whoever performs a deletion knows which
//! paths it removed and reports them separately.

use crate::document::{Namespace, Node, Token};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Leaves added or modified between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Changed leaf paths in traversal order of the new document
    pub changed_paths: Vec<String>,
    /// New leaf for each changed path, in the same order
    pub new_values: IndexMap<String, Token>,
}

impl ChangeSet {
    /// True when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_paths.is_empty()
    }

    fn push(&mut self, path: String, token: &Token) {
        self.changed_paths.push(path.clone());
        self.new_values.insert(path, token.clone());
    }
}

/// Diff `old` against `new`.
///
/// Leaves are compared by value and type only. Namespace attributes and leaf
/// descriptions never produce a change.
#[must_use]
pub fn diff(old: &Namespace, new: &Namespace) -> ChangeSet {
    let mut changes = ChangeSet::default();
    walk(Some(old), new, "", &mut changes);
    changes
}

fn walk(old: Option<&Namespace>, new: &Namespace, prefix: &str, changes: &mut ChangeSet) {
    for (key, node) in &new.children {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let previous = old.and_then(|ns| ns.children.get(key));

        match node {
            Node::Leaf(token) => {
                let unchanged =
                    matches!(previous, Some(Node::Leaf(prev)) if prev.same_content(token));
                if !unchanged {
                    changes.push(path, token);
                }
            }
            Node::Namespace(child) => {
                let previous = match previous {
                    Some(Node::Namespace(prev)) => Some(prev),
                    _ => None,
                };
                walk(previous, child, &path, changes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{TokenDocument, TokenType, TokenValue};
    use crate::path::TokenPath;

    fn put(ns: &mut Namespace, path: &str, value: &str, token_type: TokenType) {
        let path = TokenPath::parse(path).unwrap();
        ns.insert_token(&path, Token::new(TokenValue::from(value), token_type, None))
            .unwrap();
    }

    #[test]
    fn diff_of_identical_documents_is_empty() {
        let doc = TokenDocument::with_defaults("tokensync", &[]);
        assert!(diff(&doc.tokens, &doc.tokens).is_empty());
    }

    #[test]
    fn diff_reports_additions_in_traversal_order() {
        let old = Namespace::new();
        let mut new = Namespace::new();
        put(&mut new, "spacing.md", "1rem", TokenType::Dimension);
        put(&mut new, "color.primary", "#000", TokenType::Color);
        put(&mut new, "spacing.lg", "2rem", TokenType::Dimension);

        let changes = diff(&old, &new);
        assert_eq!(
            changes.changed_paths,
            ["spacing.md", "spacing.lg", "color.primary"]
        );
        let keys: Vec<_> = changes.new_values.keys().cloned().collect();
        assert_eq!(keys, changes.changed_paths);
    }

    #[test]
    fn diff_detects_value_and_type_changes() {
        let mut old = Namespace::new();
        put(&mut old, "a", "#000", TokenType::Color);
        put(&mut old, "b", "4", TokenType::Number);
        put(&mut old, "c", "same", TokenType::FontFamily);

        let mut new = old.clone();
        put(&mut new, "a", "#fff", TokenType::Color);
        put(&mut new, "b", "4", TokenType::FontWeight);

        let changes = diff(&old, &new);
        assert_eq!(changes.changed_paths, ["a", "b"]);
        assert_eq!(changes.new_values["a"].value, TokenValue::from("#fff"));
    }

    #[test]
    fn diff_ignores_descriptions_and_attributes() {
        let mut old = Namespace::new();
        put(&mut old, "color.a", "#000", TokenType::Color);

        let mut new = old.clone();
        let path = TokenPath::parse("color.a").unwrap();
        new.insert_token(
            &path,
            Token::new(
                TokenValue::from("#000"),
                TokenType::Color,
                Some("now documented".into()),
            ),
        )
        .unwrap();
        new.attributes
            .insert("$description".into(), serde_json::json!("root"));

        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn diff_treats_namespace_replaced_by_leaf_as_change() {
        let mut old = Namespace::new();
        old.children
            .insert("brand".into(), Node::Namespace(Namespace::new()));

        let mut new = Namespace::new();
        put(&mut new, "brand", "#123456", TokenType::Color);

        assert_eq!(diff(&old, &new).changed_paths, ["brand"]);
    }

    #[test]
    fn diff_does_not_report_deletions() {
        let mut old = Namespace::new();
        put(&mut old, "a", "#000", TokenType::Color);
        put(&mut old, "b", "#111", TokenType::Color);

        let mut new = old.clone();
        new.remove(&TokenPath::parse("b").unwrap()).unwrap();

        assert!(diff(&old, &new).is_empty());
    }
}
