//! Token store service.
//!
//! Owns the persisted token document and drives the mutation pipeline:
//!
//! 1. load the pre-image from the backend
//! 2. apply the edit to a copy
//! 3. bump the document's save counter and recompute its hash
//! 4. persist
//! 5. diff pre-image against post-image
//! 6. if anything changed, mint a version in the ledger and publish it
//!
//! The whole sequence runs under one async mutex, so mutations are applied,
//! versioned and broadcast in a single total order. A failed save returns
//! before step 5, so nothing is minted or broadcast for it.
//!
//! A save whose diff is empty (e.g. rewriting a token with the same value and
//! type) still persists the bumped save counter but produces no record and no
//! broadcast.

use crate::hub::{BroadcastHub, HubError, Subscription};
use crate::persistence::{DocumentBackend, PersistenceError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokensync_core::validate::{validate_batch_len, validate_value};
use tokensync_core::{
    diff, LedgerConfig, LedgerStatus, Metadata, MutationRecord, Node, Token, TokenDocument,
    TokenError, TokenPath, TokenType, TokenValue, VersionLedger,
};
use tokensync_proto::{
    BatchItem, BatchItemResult, BatchReport, HubEvent, HubStatus, SyncCheckResponse, TokenUpdate,
    UpdatesSinceResponse,
};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request addressed or described tokens incorrectly
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Loading or saving the document failed
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// The broadcast hub refused a subscriber
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Backend key of the token document
    pub document: String,
    /// Author recorded in a newly created document
    pub author: String,
    /// Platforms recorded in a newly created document
    pub platforms: Vec<String>,
    /// Ledger sizing
    pub ledger: LedgerConfig,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            document: "tokens".to_string(),
            author: "tokensync".to_string(),
            platforms: vec![
                "web".to_string(),
                "ios".to_string(),
                "android".to_string(),
                "flutter".to_string(),
            ],
            ledger: LedgerConfig::default(),
        }
    }
}

/// Result of a successful write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Path that was written
    pub path: TokenPath,
    /// The stored token
    pub token: Token,
    /// Document save counter after the write
    pub document_version: u64,
    /// Record minted for the write; `None` when nothing changed
    pub record: Option<Arc<MutationRecord>>,
    /// When the write completed
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful delete.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// Path that was deleted
    pub path: TokenPath,
    /// The removed node
    pub removed: Node,
    /// Document save counter after the delete
    pub document_version: u64,
    /// Record minted for the delete; `None` when the removed node had no leaves
    pub record: Option<Arc<MutationRecord>>,
    /// When the delete completed
    pub timestamp: DateTime<Utc>,
}

/// What a subscriber already has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUp {
    /// Last version the client saw
    pub since_version: Option<u64>,
    /// Content hash the client holds
    pub client_hash: Option<String>,
}

/// The token store.
pub struct TokenStore {
    backend: Arc<dyn DocumentBackend>,
    settings: StoreSettings,
    ledger: RwLock<VersionLedger>,
    hub: Arc<BroadcastHub>,
    /// Serializes load, mutate, persist, diff, record and publish.
    write_lock: tokio::sync::Mutex<()>,
}

impl TokenStore {
    /// Open a store over `backend`.
    ///
    /// The ledger resumes from the last version persisted with the document,
    /// so a restart never reissues a version a client may already have seen.
    /// Documents that predate that field fall back to their save counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if an existing document cannot be
    /// read.
    pub async fn open(
        backend: Arc<dyn DocumentBackend>,
        hub: Arc<BroadcastHub>,
        settings: StoreSettings,
    ) -> Result<Self, StoreError> {
        let ledger = match backend.load(&settings.document).await? {
            Some(doc) => {
                let version = match doc.metadata.ledger_version {
                    0 => doc.metadata.version,
                    minted => minted,
                };
                VersionLedger::resume(settings.ledger, version, doc.content_hash())
            }
            None => VersionLedger::new(settings.ledger, String::new()),
        };

        tracing::info!(
            document = %settings.document,
            version = ledger.current_version(),
            "Token store opened"
        );

        Ok(Self {
            backend,
            settings,
            ledger: RwLock::new(ledger),
            hub,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The broadcast hub this store publishes to.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Current document, creating and persisting the default one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails.
    pub async fn load(&self) -> Result<TokenDocument, StoreError> {
        if let Some(doc) = self.backend.load(&self.settings.document).await? {
            return Ok(doc);
        }
        let _guard = self.write_lock.lock().await;
        self.load_or_init().await
    }

    /// Must be called with `write_lock` held.
    async fn load_or_init(&self) -> Result<TokenDocument, StoreError> {
        if let Some(doc) = self.backend.load(&self.settings.document).await? {
            return Ok(doc);
        }

        let mut doc = TokenDocument::with_defaults(&self.settings.author, &self.settings.platforms);
        let hash = doc.stamp(Utc::now());
        doc.metadata.ledger_version = self.ledger.read().current_version();
        self.backend.save(&self.settings.document, &doc).await?;
        self.ledger.write().note_hash(hash);

        tracing::info!(document = %self.settings.document, "Created default token document");
        Ok(doc)
    }

    /// Node at a dot path.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] if any segment is absent and
    /// [`TokenError::Validation`] for a malformed path.
    pub async fn read_path(&self, path: &str) -> Result<Node, StoreError> {
        let path = TokenPath::parse(path)?;
        let doc = self.load().await?;
        Ok(doc.tokens.get(&path)?.clone())
    }

    /// Create or replace the token at `path`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidType`], [`TokenError::Validation`] and
    /// [`TokenError::ConflictingPath`] for bad requests;
    /// [`StoreError::Persistence`] if the save fails.
    pub async fn write_path(
        &self,
        path: &str,
        value: TokenValue,
        token_type: &str,
        description: Option<String>,
    ) -> Result<WriteOutcome, StoreError> {
        let token_type: TokenType = token_type.parse()?;
        let path = TokenPath::parse(path)?;
        validate_value(token_type, &value)?;
        let token = Token::new(value, token_type, description);

        let _guard = self.write_lock.lock().await;
        let pre = self.load_or_init().await?;
        let mut post = pre.clone();
        post.tokens.insert_token(&path, token.clone())?;

        let (post, record) = self.commit(&pre, post, Vec::new()).await?;
        tracing::info!(
            path = %path,
            document_version = post.metadata.version,
            version = record.as_ref().map(|r| r.version),
            "Token written"
        );

        Ok(WriteOutcome {
            path,
            token,
            document_version: post.metadata.version,
            record,
            timestamp: Utc::now(),
        })
    }

    /// Remove the node at `path` (a token or a whole group).
    ///
    /// The removed subtree's leaf paths are reported in the record's
    /// `removed_paths`, since the diff itself only sees additions and
    /// modifications.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] if any segment is absent; nothing is
    /// saved in that case.
    pub async fn delete_path(&self, path: &str) -> Result<DeleteOutcome, StoreError> {
        let path = TokenPath::parse(path)?;

        let _guard = self.write_lock.lock().await;
        let pre = self.load_or_init().await?;
        let mut post = pre.clone();
        let removed = post.tokens.remove(&path)?;
        let removed_paths = removed.leaf_paths(&path.to_string());

        let (post, record) = self.commit(&pre, post, removed_paths).await?;
        tracing::info!(
            path = %path,
            document_version = post.metadata.version,
            version = record.as_ref().map(|r| r.version),
            "Token deleted"
        );

        Ok(DeleteOutcome {
            path,
            removed,
            document_version: post.metadata.version,
            record,
            timestamp: Utc::now(),
        })
    }

    /// Apply each item independently. Failed items do not undo earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Validation`] for an empty or oversized batch.
    /// Per-item failures are reported in the [`BatchReport`].
    pub async fn batch_write(&self, items: Vec<BatchItem>) -> Result<BatchReport, StoreError> {
        validate_batch_len(items.len())?;

        let mut report = BatchReport::default();
        for item in items {
            let result = self
                .write_path(&item.token_path, item.value, &item.token_type, item.description)
                .await;
            report.push(match result {
                Ok(outcome) => BatchItemResult {
                    token_path: item.token_path,
                    success: true,
                    version: outcome.record.map(|r| r.version),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(path = %item.token_path, error = %e, "Batch item rejected");
                    BatchItemResult {
                        token_path: item.token_path,
                        success: false,
                        version: None,
                        error: Some(e.to_string()),
                    }
                }
            });
        }

        tracing::info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Batch write finished"
        );
        Ok(report)
    }

    /// Persist `post`, then record and publish its changes against `pre`.
    async fn commit(
        &self,
        pre: &TokenDocument,
        mut post: TokenDocument,
        removed_paths: Vec<String>,
    ) -> Result<(TokenDocument, Option<Arc<MutationRecord>>), StoreError> {
        let hash = post.stamp(Utc::now());
        let changes = diff(&pre.tokens, &post.tokens);
        let effective = !(changes.is_empty() && removed_paths.is_empty());

        // The version about to be minted is persisted first, so a failed save
        // mints nothing and a restart resumes past it.
        let current = self.ledger.read().current_version();
        post.metadata.ledger_version = if effective { current + 1 } else { current };
        self.backend.save(&self.settings.document, &post).await?;

        if !effective {
            self.ledger.write().note_hash(hash);
            tracing::debug!(
                document_version = post.metadata.version,
                "Save produced no changes; nothing to broadcast"
            );
            return Ok((post, None));
        }

        let record = self.ledger.write().record_mutation(changes, removed_paths, hash);
        self.hub.publish_record(&record);
        Ok((post, Some(record)))
    }

    /// Metadata of the stored document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails.
    pub async fn metadata(&self) -> Result<Metadata, StoreError> {
        Ok(self.load().await?.metadata)
    }

    /// Register a stream subscriber and queue its opening events.
    ///
    /// The subscriber first receives `connected`, then a catch-up burst if it
    /// supplied a version (`missed-updates`) or a stale hash
    /// (`sync-required`), then `status`. Registration happens under the
    /// write lock, so no mutation can slip between the catch-up burst and
    /// the live stream.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Hub`] when the connection limit is reached.
    pub async fn subscribe(&self, catch_up: CatchUp) -> Result<Subscription, StoreError> {
        let _guard = self.write_lock.lock().await;
        let subscription = self.hub.subscribe()?;
        let id = subscription.id();

        let ledger = self.ledger.read();
        self.hub.send_to(
            id,
            HubEvent::Connected {
                message: "connected to design token updates".to_string(),
                connection_id: id.as_uuid(),
                current_version: ledger.current_version(),
                current_hash: ledger.current_hash().to_string(),
                timestamp: Utc::now(),
            },
        );

        if let Some(version) = catch_up.since_version {
            let records = ledger.since_version(version);
            if !records.is_empty() {
                tracing::debug!(
                    connection_id = %id,
                    since = version,
                    count = records.len(),
                    "Sending missed updates"
                );
                self.hub.send_to(id, HubEvent::missed_updates(&records));
            }
        } else if let Some(hash) = catch_up.client_hash.filter(|h| !h.is_empty()) {
            let records = ledger.since_hash(&hash);
            if !records.is_empty() {
                tracing::debug!(
                    connection_id = %id,
                    count = records.len(),
                    "Client hash stale, replaying recent updates"
                );
                self.hub.send_to(id, HubEvent::sync_required(&records));
            }
        }

        let status = HubStatus::new(ledger.status(), self.hub.connection_count());
        drop(ledger);
        self.hub.send_to(id, HubEvent::Status { data: status });

        Ok(subscription)
    }

    /// Polling catch-up by version.
    #[must_use]
    pub fn updates_since(&self, version: u64) -> UpdatesSinceResponse {
        let ledger = self.ledger.read();
        let updates: Vec<TokenUpdate> = ledger
            .since_version(version)
            .iter()
            .map(|r| TokenUpdate::from(&**r))
            .collect();

        UpdatesSinceResponse {
            since_version: version,
            current_version: ledger.current_version(),
            updates_count: updates.len(),
            updates,
            needs_full_sync: !ledger.covers(version),
        }
    }

    /// Polling check of a client's content hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the document metadata cannot be
    /// read.
    pub async fn sync_check(
        &self,
        client_hash: Option<&str>,
    ) -> Result<SyncCheckResponse, StoreError> {
        let server_metadata = self.metadata().await?;
        let ledger = self.ledger.read();
        let current_hash = ledger.current_hash().to_string();

        let stale = client_hash.is_some_and(|h| !h.is_empty() && h != current_hash);
        let updates: Vec<TokenUpdate> = match client_hash {
            Some(hash) if stale => ledger
                .since_hash(hash)
                .iter()
                .map(|r| TokenUpdate::from(&**r))
                .collect(),
            _ => Vec::new(),
        };

        Ok(SyncCheckResponse {
            current_version: ledger.current_version(),
            full_reload_needed: stale && updates.is_empty(),
            current_hash,
            server_metadata,
            sync_needed: stale,
            updates,
        })
    }

    /// Ledger state.
    #[must_use]
    pub fn ledger_status(&self) -> LedgerStatus {
        self.ledger.read().status()
    }

    /// Ledger state combined with the live connection count.
    #[must_use]
    pub fn status(&self) -> HubStatus {
        HubStatus::new(self.ledger_status(), self.hub.connection_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::persistence::MemoryStore;

    async fn store_with(doc: Option<TokenDocument>) -> (Arc<MemoryStore>, TokenStore) {
        let backend = Arc::new(match doc {
            Some(doc) => MemoryStore::with_document("tokens", &doc).unwrap(),
            None => MemoryStore::new(),
        });
        let hub = BroadcastHub::new(HubConfig::default());
        let store = TokenStore::open(backend.clone(), hub, StoreSettings::default())
            .await
            .unwrap();
        (backend, store)
    }

    #[tokio::test]
    async fn load_creates_default_once() {
        let (backend, store) = store_with(None).await;

        let first = store.load().await.unwrap();
        let second = store.load().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.metadata.version, 1);
        assert_eq!(first.metadata.author.as_deref(), Some("tokensync"));
        assert!(backend.load("tokens").await.unwrap().is_some());
        assert_eq!(store.ledger_status().current_hash, first.content_hash());
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;

        let outcome = store
            .write_path("color.primitive.blue.500", "#3b82f6".into(), "color", None)
            .await
            .unwrap();
        assert_eq!(outcome.record.as_ref().unwrap().version, 2);

        let node = store.read_path("color.primitive.blue.500").await.unwrap();
        let token = node.as_token().unwrap();
        assert_eq!(token.value, TokenValue::from("#3b82f6"));
        assert_eq!(token.token_type, TokenType::Color);
    }

    #[tokio::test]
    async fn identical_overwrite_bumps_document_only() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        let hub = Arc::clone(store.hub());
        let mut sub = hub.subscribe().unwrap();

        let first = store
            .write_path("spacing.md", "1rem".into(), "dimension", None)
            .await
            .unwrap();
        let second = store
            .write_path("spacing.md", "1rem".into(), "dimension", Some("docs".into()))
            .await
            .unwrap();

        assert!(first.record.is_some());
        assert!(second.record.is_none());
        assert_eq!(second.document_version, first.document_version + 1);
        assert_eq!(store.ledger_status().current_version, 2);

        let doc = store.load().await.unwrap();
        assert_eq!(store.ledger_status().current_hash, doc.content_hash());

        // Exactly one broadcast
        assert!(matches!(&*sub.recv().await.unwrap(), HubEvent::TokenUpdate(_)));
        hub.heartbeat();
        assert!(matches!(&*sub.recv().await.unwrap(), HubEvent::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn rejected_writes_do_not_save() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        store
            .write_path("color.brand", "#000".into(), "color", None)
            .await
            .unwrap();
        let before = store.load().await.unwrap();

        let invalid_type = store
            .write_path("color.accent", "#fff".into(), "gradient", None)
            .await;
        assert!(matches!(
            invalid_type,
            Err(StoreError::Token(TokenError::InvalidType { .. }))
        ));

        let conflict = store
            .write_path("color.brand.dark", "#111".into(), "color", None)
            .await;
        assert!(matches!(
            conflict,
            Err(StoreError::Token(TokenError::ConflictingPath { .. }))
        ));

        let bad_value = store
            .write_path("color.accent", "blue".into(), "color", None)
            .await;
        assert!(matches!(
            bad_value,
            Err(StoreError::Token(TokenError::Validation(_)))
        ));

        assert_eq!(store.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn delete_reports_removed_leaves() {
        let (_backend, store) = store_with(None).await;
        store.load().await.unwrap();

        let outcome = store.delete_path("spacing.primitive").await.unwrap();
        let record = outcome.record.unwrap();
        assert!(record.changed_paths.is_empty());
        assert_eq!(
            record.removed_paths,
            ["spacing.primitive.4", "spacing.primitive.8"]
        );
        assert!(matches!(outcome.removed, Node::Namespace(_)));
        assert!(store.read_path("spacing.primitive.4").await.is_err());
    }

    #[tokio::test]
    async fn delete_missing_path_changes_nothing() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        let before = store.load().await.unwrap();
        let status = store.ledger_status();

        let err = store.delete_path("color.primitive.blue.500").await.unwrap_err();
        assert!(matches!(err, StoreError::Token(TokenError::NotFound { .. })));

        assert_eq!(store.load().await.unwrap().metadata, before.metadata);
        assert_eq!(store.ledger_status(), status);
    }

    #[tokio::test]
    async fn failed_save_mints_nothing() {
        let (backend, store) = store_with(Some(TokenDocument::empty())).await;
        let mut sub = store.hub().subscribe().unwrap();
        backend.set_fail_writes(true);

        let err = store
            .write_path("color.a", "#000".into(), "color", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert_eq!(store.ledger_status().current_version, 1);

        backend.set_fail_writes(false);
        store
            .write_path("color.a", "#000".into(), "color", None)
            .await
            .unwrap();
        let event = sub.recv().await.unwrap();
        let HubEvent::TokenUpdate(update) = &*event else {
            panic!("expected token update");
        };
        assert_eq!(update.version, 2);
    }

    #[tokio::test]
    async fn batch_reports_partial_success() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        let item = |path: &str, value: &str, ty: &str| BatchItem {
            token_path: path.to_string(),
            value: value.into(),
            token_type: ty.to_string(),
            description: None,
        };

        let report = store
            .batch_write(vec![
                item("color.a", "#000", "color"),
                item("color.b", "#111", "bogus"),
                item("color.c", "#222", "color"),
            ])
            .await
            .unwrap();

        assert_eq!((report.total, report.successful, report.failed), (3, 2, 1));
        assert_eq!(report.results[0].version, Some(2));
        assert!(report.results[1].error.as_deref().unwrap().contains("bogus"));
        assert_eq!(report.results[2].version, Some(3));
        assert!(store.read_path("color.c").await.is_ok());

        assert!(matches!(
            store.batch_write(Vec::new()).await,
            Err(StoreError::Token(TokenError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn subscribe_sends_catch_up_burst() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        for path in ["a", "b", "c"] {
            store
                .write_path(path, "4".into(), "number", None)
                .await
                .unwrap();
        }

        let mut sub = store
            .subscribe(CatchUp {
                since_version: Some(2),
                client_hash: None,
            })
            .await
            .unwrap();

        let connected = sub.recv().await.unwrap();
        assert!(matches!(
            &*connected,
            HubEvent::Connected { current_version: 4, .. }
        ));
        let event = sub.recv().await.unwrap();
        let HubEvent::MissedUpdates { count, updates } = &*event else {
            panic!("expected missed updates");
        };
        assert_eq!(*count, 2);
        assert_eq!(updates[0].data.changed_paths, ["b"]);
        assert!(matches!(&*sub.recv().await.unwrap(), HubEvent::Status { .. }));
    }

    #[tokio::test]
    async fn subscribe_with_stale_hash_replays_window() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        store
            .write_path("a", "1".into(), "number", None)
            .await
            .unwrap();

        let mut sub = store
            .subscribe(CatchUp {
                since_version: None,
                client_hash: Some("stale".into()),
            })
            .await
            .unwrap();

        sub.recv().await.unwrap();
        assert!(matches!(
            &*sub.recv().await.unwrap(),
            HubEvent::SyncRequired { updates, .. } if updates.len() == 1
        ));
    }

    #[tokio::test]
    async fn polling_fallback() {
        let (_backend, store) = store_with(Some(TokenDocument::empty())).await;
        store
            .write_path("a", "1".into(), "number", None)
            .await
            .unwrap();

        let since = store.updates_since(1);
        assert_eq!(since.updates_count, 1);
        assert!(!since.needs_full_sync);
        assert!(store.updates_since(2).updates.is_empty());

        let current = store.ledger_status().current_hash;
        let fresh = store.sync_check(Some(&current)).await.unwrap();
        assert!(!fresh.sync_needed);

        let stale = store.sync_check(Some("stale")).await.unwrap();
        assert!(stale.sync_needed);
        assert_eq!(stale.updates.len(), 1);
        assert!(!stale.full_reload_needed);
    }

    #[tokio::test]
    async fn reopen_resumes_versions() {
        let (backend, store) = store_with(None).await;
        store.load().await.unwrap();
        store
            .write_path("color.x", "#fff".into(), "color", None)
            .await
            .unwrap();
        let before = store.ledger_status();
        drop(store);

        let reopened = TokenStore::open(
            backend,
            BroadcastHub::new(HubConfig::default()),
            StoreSettings::default(),
        )
        .await
        .unwrap();
        let after = reopened.ledger_status();
        assert_eq!(after.current_version, before.current_version);
        assert_eq!(after.current_hash, before.current_hash);
    }
}
