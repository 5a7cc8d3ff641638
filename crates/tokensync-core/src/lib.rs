//! # tokensync Core
//!
//! Token document model, change detection, and version bookkeeping for tokensync.
//!
//! This crate provides:
//! - A typed design-token tree (namespaces and leaf tokens) with DTCG-shaped JSON
//! - Dot-path addressing and input validation for token writes
//! - A deterministic content hash that ignores document metadata
//! - The change detector that diffs two document snapshots
//! - The version ledger that mints versions and keeps a bounded change history

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod document;
pub mod error;
pub mod ledger;
pub mod path;
pub mod validate;

pub use diff::{diff, ChangeSet};
pub use document::{Metadata, Namespace, Node, Token, TokenDocument, TokenType, TokenValue};
pub use error::TokenError;
pub use ledger::{LedgerConfig, LedgerStatus, MutationRecord, VersionLedger};
pub use path::TokenPath;
