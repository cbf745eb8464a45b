//! Remote blob storage collaborator.
//!
//! The portal never keeps uploaded bytes; it hands them to a [`StorageGateway`] and keeps
//! the returned [`BlobId`]. Drive is the production backend, [`UnavailableStorage`] stands
//! in when the backend cannot be constructed so every call fails cleanly, and
//! [`MemoryStorage`] backs demos and tests.

mod drive;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub use drive::{DriveConnector, GoogleDriveClient, GoogleDriveStorage};

/// Opaque identifier handed out by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation failed: {0}")]
    Backend(String),
    #[error("blob {0} not found")]
    NotFound(BlobId),
}

/// Contract for the remote blob store.
pub trait StorageGateway: Debug + Send + Sync {
    /// Store `bytes` under a human-readable `name`, returning the backend's identifier.
    fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<BlobId, StorageError>;

    fn get(&self, blob: &BlobId) -> Result<Vec<u8>, StorageError>;

    /// A link the browser can open directly, when the backend offers one.
    fn preview_link(&self, blob: &BlobId) -> Result<Option<String>, StorageError>;

    /// Remove a blob that no record references (failed submissions).
    fn discard(&self, blob: &BlobId) -> Result<(), StorageError>;
}

/// Stand-in used when the real backend failed to initialise.
#[derive(Debug, Clone)]
pub struct UnavailableStorage {
    reason: String,
}

impl UnavailableStorage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> StorageError {
        StorageError::Unavailable(self.reason.clone())
    }
}

impl StorageGateway for UnavailableStorage {
    fn put(&self, _bytes: &[u8], _name: &str, _mime_type: &str) -> Result<BlobId, StorageError> {
        Err(self.error())
    }

    fn get(&self, _blob: &BlobId) -> Result<Vec<u8>, StorageError> {
        Err(self.error())
    }

    fn preview_link(&self, _blob: &BlobId) -> Result<Option<String>, StorageError> {
        Err(self.error())
    }

    fn discard(&self, _blob: &BlobId) -> Result<(), StorageError> {
        Err(self.error())
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

/// Process-local blob store. Offers preview links only when built with a base URL, so
/// callers exercise both retrieval paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<BlobId, StoredBlob>>,
    preview_base: Option<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preview_base(base: impl Into<String>) -> Self {
        Self {
            blobs: Mutex::default(),
            preview_base: Some(base.into().trim_end_matches('/').to_string()),
        }
    }

    /// Names of the blobs currently held, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .blobs
            .lock()
            .map(|blobs| blobs.values().map(|blob| blob.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mime_type(&self, blob: &BlobId) -> Option<String> {
        self.blobs
            .lock()
            .ok()?
            .get(blob)
            .map(|stored| stored.mime_type.clone())
    }

    fn poisoned() -> StorageError {
        StorageError::Unavailable("memory storage lock poisoned".to_string())
    }
}

impl StorageGateway for MemoryStorage {
    fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<BlobId, StorageError> {
        let blob = BlobId(format!("mem-{}", uuid::Uuid::new_v4().simple()));
        let mut blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        blobs.insert(
            blob.clone(),
            StoredBlob {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(blob)
    }

    fn get(&self, blob: &BlobId) -> Result<Vec<u8>, StorageError> {
        let blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        blobs
            .get(blob)
            .map(|stored| stored.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(blob.clone()))
    }

    fn preview_link(&self, blob: &BlobId) -> Result<Option<String>, StorageError> {
        let blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        if !blobs.contains_key(blob) {
            return Err(StorageError::NotFound(blob.clone()));
        }
        Ok(self
            .preview_base
            .as_ref()
            .map(|base| format!("{base}/{blob}/view")))
    }

    fn discard(&self, blob: &BlobId) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        blobs
            .remove(blob)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(blob.clone()))
    }
}
