//! Durable cursor for one mailbox

use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;

use super::ObjectStore;
use crate::models::SyncCursor;

/// Reads and writes the single cursor object of a mailbox
pub struct CursorStore {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl CursorStore {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored cursor, or `None` on the first run for this mailbox
    pub fn load(&self) -> Result<Option<SyncCursor>> {
        if !self
            .store
            .exists(&self.key)
            .with_context(|| format!("Failed to check cursor {}", self.key))?
        {
            debug!("History file {} did not exist", self.key);
            return Ok(None);
        }

        let data = self
            .store
            .read(&self.key)
            .with_context(|| format!("Failed to read cursor {}", self.key))?;

        SyncCursor::from_json(&data).map(Some)
    }

    /// Persist `cursor`, replacing the previous value
    pub fn save(&self, cursor: &SyncCursor) -> Result<()> {
        let data = cursor.to_json()?;
        self.store
            .write(&self.key, &data)
            .with_context(|| format!("Failed to write cursor {}", self.key))
    }
}
