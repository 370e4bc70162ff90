//! Object storage trait definitions

use anyhow::Result;

/// Error returned by [`ObjectStore::read`] when the key is absent
#[derive(Debug, thiserror::Error)]
#[error("Object not found: {key}")]
pub struct ObjectNotFound {
    pub key: String,
}

impl ObjectNotFound {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Trait for flat key/value object storage
///
/// Keys are `/`-separated relative paths (e.g. `mail/debug/m1_msg.json`).
/// Backs both the cursor and the audit artifacts, so implementations only
/// need whole-object reads and writes.
pub trait ObjectStore: Send + Sync {
    /// Check if an object exists
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read an object
    ///
    /// Fails with [`ObjectNotFound`] if the key is absent; callers that
    /// tolerate absence check [`exists`](ObjectStore::exists) first.
    fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or replace an object
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;
}
