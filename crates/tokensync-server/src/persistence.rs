//! Token document persistence.
//!
//! The store keeps exactly one named document per backend key. Backends only
//! get and set whole documents; all read-modify-write sequencing happens in
//! [`crate::store::TokenStore`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokensync_core::TokenDocument;

/// Errors from loading or saving a document.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Reading or writing failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Location that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Stored bytes are not a valid token document
    #[error("failed to decode document '{name}': {source}")]
    Decode {
        /// Document name
        name: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
    /// The document could not be serialized
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Get/set access to named token documents.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Load the document stored under `name`, or `None` if there is none.
    async fn load(&self, name: &str) -> Result<Option<TokenDocument>, PersistenceError>;

    /// Replace the document stored under `name`.
    async fn save(&self, name: &str, document: &TokenDocument) -> Result<(), PersistenceError>;
}

/// Pretty-printed JSON files, one per document, in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store documents under `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing the document `name`.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// The storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DocumentBackend for JsonFileStore {
    async fn load(&self, name: &str) -> Result<Option<TokenDocument>, PersistenceError> {
        let path = self.path(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Decode {
                name: name.to_string(),
                source,
            })
    }

    async fn save(&self, name: &str, document: &TokenDocument) -> Result<(), PersistenceError> {
        let mut bytes = serde_json::to_vec_pretty(document).map_err(PersistenceError::Encode)?;
        bytes.push(b'\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.dir.clone(),
                source,
            })?;

        // Write beside the target and rename so readers never see a partial file
        let path = self.path(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved token document");
        Ok(())
    }
}

/// In-memory backend holding serialized documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `document` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Encode`] if the document cannot be serialized.
    pub fn with_document(name: &str, document: &TokenDocument) -> Result<Self, PersistenceError> {
        let store = Self::new();
        let bytes = serde_json::to_vec(document).map_err(PersistenceError::Encode)?;
        store.documents.lock().insert(name.to_string(), bytes);
        Ok(store)
    }

    /// Make every subsequent save fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentBackend for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<TokenDocument>, PersistenceError> {
        let bytes = self.documents.lock().get(name).cloned();
        bytes
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()
    }

    async fn save(&self, name: &str, document: &TokenDocument) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                path: PathBuf::from(format!("memory://{name}")),
                source: std::io::Error::other("simulated write failure"),
            });
        }
        let bytes = serde_json::to_vec(document).map_err(PersistenceError::Encode)?;
        self.documents.lock().insert(name.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("tokens"));

        assert!(store.load("tokens").await.unwrap().is_none());

        let doc = TokenDocument::with_defaults("tokensync", &["web".to_string()]);
        store.save("tokens", &doc).await.unwrap();

        let loaded = store.load("tokens").await.unwrap().unwrap();
        assert_eq!(loaded, doc);

        let raw = std::fs::read_to_string(store.path("tokens")).unwrap();
        assert!(raw.starts_with("{\n  \"$schema\""));
        assert!(!dir.path().join("tokens/.tokens.json.tmp").exists());
    }

    #[tokio::test]
    async fn json_file_store_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());

        let err = store.load("broken").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Decode { .. }));
    }

    #[tokio::test]
    async fn memory_store_can_fail_writes() {
        let store = MemoryStore::new();
        let doc = TokenDocument::empty();

        store.save("tokens", &doc).await.unwrap();
        store.set_fail_writes(true);
        assert!(matches!(
            store.save("tokens", &doc).await,
            Err(PersistenceError::Io { .. })
        ));
        assert_eq!(store.load("tokens").await.unwrap().unwrap(), doc);
    }
}
