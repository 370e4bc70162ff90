//! In-memory object store
//!
//! Used by tests and for dry runs where nothing should reach disk or GCS.

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{ObjectNotFound, ObjectStore};

/// In-memory implementation of ObjectStore
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored object parsed as JSON, if present and valid
    pub fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        let objects = self.objects.read().ok()?;
        serde_json::from_slice(objects.get(key)?).ok()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let objects = self.objects.read().map_err(|_| anyhow!("Object store lock poisoned"))?;
        Ok(objects.contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.read().map_err(|_| anyhow!("Object store lock poisoned"))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectNotFound::new(key).into())
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| anyhow!("Object store lock poisoned"))?;
        objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}
