//! HTTP request and response bodies.

use crate::events::{HubStatus, TokenUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokensync_core::{Metadata, Node, Token, TokenValue};

/// Body of `PUT /tokens/*path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// New token value
    pub value: TokenValue,
    /// Token type name, checked against the closed set by the store
    #[serde(rename = "type")]
    pub token_type: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Result of a single write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Always true; failures are reported as errors
    pub success: bool,
    /// Dot path that was written
    pub token_path: String,
    /// The stored token
    pub token: Token,
    /// Document save counter after the write
    pub document_version: u64,
    /// Version minted for the change, absent for no-op writes
    pub version: Option<u64>,
    /// Server time of the write
    pub timestamp: DateTime<Utc>,
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Always true; failures are reported as errors
    pub success: bool,
    /// Dot path that was deleted
    pub token_path: String,
    /// The removed node
    pub removed: Node,
    /// Document save counter after the delete
    pub document_version: u64,
    /// Version minted for the change, absent when nothing was removed
    pub version: Option<u64>,
    /// Server time of the delete
    pub timestamp: DateTime<Utc>,
}

/// One item of a batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Target dot path
    pub token_path: String,
    /// New token value
    pub value: TokenValue,
    /// Token type name
    #[serde(rename = "type")]
    pub token_type: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /tokens/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Items applied in order, independently
    pub tokens: Vec<BatchItem>,
}

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Target dot path
    pub token_path: String,
    /// Whether the item was applied
    pub success: bool,
    /// Version minted for the item, if it changed anything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Error message for a failed item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial-success report for a batch write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Items submitted
    pub total: usize,
    /// Items applied
    pub successful: usize,
    /// Items rejected
    pub failed: usize,
    /// Per-item outcomes in submission order
    pub results: Vec<BatchItemResult>,
}

impl BatchReport {
    /// Append an item outcome and update the counters.
    pub fn push(&mut self, result: BatchItemResult) {
        self.total += 1;
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }
}

/// Body of `POST /platforms/build`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Platforms to build; all configured platforms when absent
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
}

/// Response of `GET /sse/updates/since/:version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatesSinceResponse {
    /// Version the client asked from
    pub since_version: u64,
    /// Latest minted version
    pub current_version: u64,
    /// Number of updates returned
    pub updates_count: usize,
    /// Updates newer than `since_version`
    pub updates: Vec<TokenUpdate>,
    /// History no longer covers the requested range
    pub needs_full_sync: bool,
}

/// Response of `GET /sse/updates/sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckResponse {
    /// Latest minted version
    pub current_version: u64,
    /// Current content hash
    pub current_hash: String,
    /// Metadata of the stored document
    pub server_metadata: Metadata,
    /// The client hash is stale
    pub sync_needed: bool,
    /// Recent-window replay for a stale client
    pub updates: Vec<TokenUpdate>,
    /// Stale client but nothing to replay
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub full_reload_needed: bool,
}

/// Response of `GET /sse/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    /// Live stream connections
    pub sse_clients: usize,
    /// Ledger and hub state
    pub current_status: HubStatus,
    /// Metadata of the stored document
    pub token_metadata: Metadata,
}

/// Response of `POST /sse/polling/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingRegistration {
    /// Always `registered`
    pub status: String,
    /// Recommended polling period
    pub polling_interval_seconds: u64,
    /// Endpoint to poll
    pub fallback_endpoint: String,
}

impl PollingRegistration {
    /// Registration pointing at the hash sync endpoint.
    #[must_use]
    pub fn new(polling_interval_seconds: u64) -> Self {
        Self {
            status: "registered".to_string(),
            polling_interval_seconds,
            fallback_endpoint: "/sse/updates/sync".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_request_accepts_wire_names() {
        let req: WriteRequest =
            serde_json::from_value(json!({"value": "#3b82f6", "type": "color"})).unwrap();
        assert_eq!(req.token_type, "color");
        assert_eq!(req.value, TokenValue::from("#3b82f6"));
        assert!(req.description.is_none());

        let req: WriteRequest =
            serde_json::from_value(json!({"value": ["Inter", "sans-serif"], "type": "fontFamily"}))
                .unwrap();
        assert!(matches!(req.value, TokenValue::List(ref items) if items.len() == 2));
    }

    #[test]
    fn batch_report_counts() {
        let mut report = BatchReport::default();
        report.push(BatchItemResult {
            token_path: "a".into(),
            success: true,
            version: Some(2),
            error: None,
        });
        report.push(BatchItemResult {
            token_path: "b".into(),
            success: false,
            version: None,
            error: Some("invalid token type".into()),
        });

        assert_eq!((report.total, report.successful, report.failed), (2, 1, 1));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["results"][0].get("error").is_none());
        assert_eq!(json["results"][1]["error"], "invalid token type");
    }

    #[test]
    fn sync_check_omits_reload_flag_when_false() {
        let resp = SyncCheckResponse {
            current_version: 1,
            current_hash: "h".into(),
            server_metadata: Metadata::default(),
            sync_needed: false,
            updates: Vec::new(),
            full_reload_needed: false,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("full_reload_needed").is_none());
    }
}
