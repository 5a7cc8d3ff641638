//! Streaming event envelope.
//!
//! Payloads serialize with an internal `type` tag:
//!
//! ```json
//! {"type":"TOKEN_UPDATE","version":4,"hash":"...","data":{...},"timestamp":"..."}
//! ```

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokensync_core::{LedgerStatus, MutationRecord, Token};
use uuid::Uuid;

/// Changed content carried by a [`TokenUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateData {
    /// Added or modified leaf paths
    pub changed_paths: Vec<String>,
    /// New leaf per changed path
    pub new_values: IndexMap<String, Token>,
    /// Leaf paths removed by a delete
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_paths: Vec<String>,
}

/// Wire form of a mutation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUpdate {
    /// Minted version
    pub version: u64,
    /// Content hash after the mutation
    pub hash: String,
    /// What changed
    pub data: UpdateData,
    /// When the version was minted
    pub timestamp: DateTime<Utc>,
}

impl From<&MutationRecord> for TokenUpdate {
    fn from(record: &MutationRecord) -> Self {
        Self {
            version: record.version,
            hash: record.hash.clone(),
            data: UpdateData {
                changed_paths: record.changed_paths.clone(),
                new_values: record.new_values.clone(),
                removed_paths: record.removed_paths.clone(),
            },
            timestamp: record.timestamp,
        }
    }
}

/// Broadcast status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatus {
    /// Latest minted version
    pub current_version: u64,
    /// Latest content hash
    pub current_hash: String,
    /// Live stream connections
    pub sse_clients: usize,
    /// Records retained for catch-up
    pub update_history_size: usize,
    /// Timestamp of the newest record
    pub last_update: Option<DateTime<Utc>>,
}

impl HubStatus {
    /// Combine ledger state with the live connection count.
    #[must_use]
    pub fn new(ledger: LedgerStatus, sse_clients: usize) -> Self {
        Self {
            current_version: ledger.current_version,
            current_hash: ledger.current_hash,
            sse_clients,
            update_history_size: ledger.history_len,
            last_update: ledger.last_update,
        }
    }
}

/// An event pushed to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HubEvent {
    /// First event on every new connection
    Connected {
        /// Human-readable greeting
        message: String,
        /// Connection identifier assigned by the hub
        connection_id: Uuid,
        /// Version at subscribe time
        current_version: u64,
        /// Hash at subscribe time
        current_hash: String,
        /// Server time
        timestamp: DateTime<Utc>,
    },
    /// Catch-up burst for a client that supplied its last version
    MissedUpdates {
        /// Number of updates in the burst
        count: usize,
        /// Updates newer than the client's version
        updates: Vec<TokenUpdate>,
    },
    /// Recent-window replay for a client whose hash does not match
    SyncRequired {
        /// Human-readable explanation
        message: String,
        /// Most recent updates
        updates: Vec<TokenUpdate>,
    },
    /// Current status snapshot
    Status {
        /// The snapshot
        data: HubStatus,
    },
    /// A newly minted mutation
    TokenUpdate(TokenUpdate),
    /// Periodic keep-alive
    Heartbeat {
        /// Server time
        timestamp: DateTime<Utc>,
        /// Live stream connections
        client_count: usize,
    },
}

impl HubEvent {
    /// The SSE event name for this payload.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Connected { .. } => "connected",
            HubEvent::MissedUpdates { .. } => "missed-updates",
            HubEvent::SyncRequired { .. } => "sync-required",
            HubEvent::Status { .. } => "status",
            HubEvent::TokenUpdate(_) => "token-update",
            HubEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Build a `missed-updates` event from ledger records.
    #[must_use]
    pub fn missed_updates(records: &[std::sync::Arc<MutationRecord>]) -> Self {
        let updates: Vec<TokenUpdate> = records.iter().map(|r| TokenUpdate::from(&**r)).collect();
        HubEvent::MissedUpdates {
            count: updates.len(),
            updates,
        }
    }

    /// Build a `sync-required` event from ledger records.
    #[must_use]
    pub fn sync_required(records: &[std::sync::Arc<MutationRecord>]) -> Self {
        HubEvent::SyncRequired {
            message: "client hash mismatch, syncing recent updates".to_string(),
            updates: records.iter().map(|r| TokenUpdate::from(&**r)).collect(),
        }
    }
}
