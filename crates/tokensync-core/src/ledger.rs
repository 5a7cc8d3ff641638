//! Version ledger.
//!
//! Mints a strictly increasing version for every accepted mutation and keeps
//! a bounded history of [`MutationRecord`]s for catch-up queries.
//!
//! The ledger itself is a plain value with `&mut self` minting; callers that
//! share it across tasks wrap it in a lock so that minting and appending
//! happen as one step.

use crate::diff::ChangeSet;
use crate::document::Token;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of records retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default number of records replayed on a hash mismatch.
pub const DEFAULT_SYNC_WINDOW: usize = 10;

/// Ledger sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Maximum records kept in history
    pub history_capacity: usize,
    /// Records returned by [`VersionLedger::since_hash`] on mismatch
    pub sync_window: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sync_window: DEFAULT_SYNC_WINDOW,
        }
    }
}

/// One accepted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Version minted for this mutation
    pub version: u64,
    /// Content hash after the mutation
    pub hash: String,
    /// Added or modified leaf paths
    pub changed_paths: Vec<String>,
    /// New leaf for each changed path
    pub new_values: IndexMap<String, Token>,
    /// Leaf paths removed by a delete
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_paths: Vec<String>,
    /// When the record was minted
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    /// Latest minted version
    pub current_version: u64,
    /// Latest known content hash
    pub current_hash: String,
    /// Records currently retained
    pub history_len: usize,
    /// Timestamp of the newest record
    pub last_update: Option<DateTime<Utc>>,
}

/// Mints versions and answers catch-up queries.
#[derive(Debug)]
pub struct VersionLedger {
    config: LedgerConfig,
    current_version: u64,
    current_hash: String,
    history: VecDeque<Arc<MutationRecord>>,
}

impl VersionLedger {
    /// A fresh ledger at version 1.
    #[must_use]
    pub fn new(config: LedgerConfig, hash: impl Into<String>) -> Self {
        Self::resume(config, 1, hash)
    }

    /// A ledger continuing from a previously reached version.
    ///
    /// Versions below 1 are raised to 1.
    #[must_use]
    pub fn resume(config: LedgerConfig, version: u64, hash: impl Into<String>) -> Self {
        Self {
            config: LedgerConfig {
                history_capacity: config.history_capacity.max(1),
                sync_window: config.sync_window,
            },
            current_version: version.max(1),
            current_hash: hash.into(),
            history: VecDeque::with_capacity(config.history_capacity.max(1)),
        }
    }

    /// Mint the next version for a set of changes and append it to history.
    pub fn record_mutation(
        &mut self,
        changes: ChangeSet,
        removed_paths: Vec<String>,
        hash: impl Into<String>,
    ) -> Arc<MutationRecord> {
        self.current_version += 1;
        self.current_hash = hash.into();

        let record = Arc::new(MutationRecord {
            version: self.current_version,
            hash: self.current_hash.clone(),
            changed_paths: changes.changed_paths,
            new_values: changes.new_values,
            removed_paths,
            timestamp: Utc::now(),
        });

        self.history.push_back(Arc::clone(&record));
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }

        tracing::debug!(
            version = record.version,
            changed = record.changed_paths.len(),
            removed = record.removed_paths.len(),
            "minted version"
        );
        record
    }

    /// Update the current hash after a save that produced no record.
    pub fn note_hash(&mut self, hash: impl Into<String>) {
        self.current_hash = hash.into();
    }

    /// Retained records newer than `version`, oldest first.
    ///
    /// An empty result is ambiguous when `version` is older than the oldest
    /// retained record; see [`VersionLedger::covers`].
    #[must_use]
    pub fn since_version(&self, version: u64) -> Vec<Arc<MutationRecord>> {
        if version >= self.current_version {
            return Vec::new();
        }
        self.history
            .iter()
            .filter(|record| record.version > version)
            .cloned()
            .collect()
    }

    /// Records to replay for a client holding `hash`.
    ///
    /// A matching hash yields nothing. Any other hash yields the most recent
    /// `sync_window` records whether or not they supersede the client's
    /// state: hash mismatch triggers recent-window replay, not exact
    /// reconciliation.
    #[must_use]
    pub fn since_hash(&self, hash: &str) -> Vec<Arc<MutationRecord>> {
        if hash == self.current_hash {
            return Vec::new();
        }
        let skip = self.history.len().saturating_sub(self.config.sync_window);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Whether history still holds every record after `version`.
    ///
    /// When this is false an empty or partial [`VersionLedger::since_version`]
    /// result cannot be trusted and the client needs a full reload.
    #[must_use]
    pub fn covers(&self, version: u64) -> bool {
        if version >= self.current_version {
            return true;
        }
        self.history
            .front()
            .is_some_and(|oldest| oldest.version <= version + 1)
    }

    /// Latest minted version.
    #[must_use]
    pub fn current_version(&self) -> u64 {
        self.current_version
    }

    /// Latest known content hash.
    #[must_use]
    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    /// Snapshot of the ledger state.
    #[must_use]
    pub fn status(&self) -> LedgerStatus {
        LedgerStatus {
            current_version: self.current_version,
            current_hash: self.current_hash.clone(),
            history_len: self.history.len(),
            last_update: self.history.back().map(|record| record.timestamp),
        }
    }
}
