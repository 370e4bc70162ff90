//! Audit artifacts written for each reconciliation pass

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{ObjectStore, StorageLayout};
use crate::gmail::api::HistoryResponse;
use crate::models::{CanonicalRecord, MessageId, RawRecord};

/// Writes raw payloads, canonical records and change-list snapshots
pub struct ArtifactSink {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
}

impl ArtifactSink {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    /// Store the provider payload of a message, unmodified
    pub fn store_raw(&self, id: &MessageId, raw: &RawRecord) -> Result<()> {
        let key = self.layout.raw_record_key(id);
        self.store
            .write(&key, &raw.to_json_bytes()?)
            .with_context(|| format!("Failed to store raw message {}", key))
    }

    /// Store the canonical record, keyed by the id it was fetched under
    pub fn store_record(&self, id: &MessageId, record: &CanonicalRecord) -> Result<()> {
        let key = self.layout.record_key(id);
        let data = serde_json::to_vec(record).context("Failed to serialize record")?;
        self.store
            .write(&key, &data)
            .with_context(|| format!("Failed to store record {}", key))
    }

    /// Store the full change list fetched starting at `history_id`
    pub fn store_change_list(&self, history_id: &str, changes: &HistoryResponse) -> Result<()> {
        let key = self.layout.change_list_key(history_id);
        let data = serde_json::to_vec(changes).context("Failed to serialize change list")?;
        self.store
            .write(&key, &data)
            .with_context(|| format!("Failed to store change list {}", key))
    }
}
