//! # tokensync CLI
//!
//! Offline utilities for inspecting and checking token documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokensync_core::validate::validate_value;
use tokensync_core::{diff, Node, TokenDocument, TokenPath};

#[derive(Debug, Parser)]
#[command(name = "tokensync", version, about = "tokensync document utilities")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the content hash of a document
    Hash {
        /// Token document (JSON)
        file: PathBuf,
    },
    /// List leaf paths added or modified between two documents
    Diff {
        /// Earlier document
        old: PathBuf,
        /// Later document
        new: PathBuf,
    },
    /// Print the node at a dot path
    Get {
        /// Token document (JSON)
        file: PathBuf,
        /// Dot path, e.g. `color.semantic.primary`
        path: String,
    },
    /// Check every token value against its type
    Validate {
        /// Token document (JSON)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Hash { file } => {
            let doc = read_document(&file)?;
            println!("{}", doc.content_hash());
        }
        Command::Diff { old, new } => {
            for line in diff_lines(&read_document(&old)?, &read_document(&new)?) {
                println!("{line}");
            }
        }
        Command::Get { file, path } => {
            let doc = read_document(&file)?;
            let path = TokenPath::parse(&path)?;
            let node: &Node = doc.tokens.get(&path)?;
            println!("{}", serde_json::to_string_pretty(node)?);
        }
        Command::Validate { file } => {
            let doc = read_document(&file)?;
            let problems = validation_problems(&doc);
            for problem in &problems {
                eprintln!("{problem}");
            }
            anyhow::ensure!(problems.is_empty(), "{} invalid token(s)", problems.len());
            println!("ok: {} tokens", doc.tokens.leaves().len());
        }
    }

    Ok(())
}

fn read_document(path: &Path) -> Result<TokenDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a valid token document", path.display()))
}

/// `+ path` for additions, `~ path` for modifications, `- path` for removals.
fn diff_lines(old: &TokenDocument, new: &TokenDocument) -> Vec<String> {
    let changes = diff(&old.tokens, &new.tokens);
    let mut lines: Vec<String> = changes
        .changed_paths
        .iter()
        .map(|path| {
            let existed = TokenPath::parse(path)
                .ok()
                .and_then(|p| old.tokens.get(&p).ok())
                .is_some_and(|node| node.as_token().is_some());
            format!("{} {path}", if existed { '~' } else { '+' })
        })
        .collect();

    // The detector only reports additions and modifications
    let removed = diff(&new.tokens, &old.tokens);
    lines.extend(
        removed
            .changed_paths
            .iter()
            .filter(|path| {
                TokenPath::parse(path)
                    .ok()
                    .and_then(|p| new.tokens.get(&p).ok())
                    .and_then(Node::as_token)
                    .is_none()
            })
            .map(|path| format!("- {path}")),
    );
    lines
}

fn validation_problems(doc: &TokenDocument) -> Vec<String> {
    doc.tokens
        .leaves()
        .into_iter()
        .filter_map(|(path, token)| {
            validate_value(token.token_type, &token.value)
                .err()
                .map(|e| format!("{path}: {e}"))
        })
        .collect()
}
