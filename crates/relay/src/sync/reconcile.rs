//! Reconciliation pass for one inbound change event

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, bail};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{ChangeSource, collect_change_records, dedup_records, timed};
use crate::config::SyncSettings;
use crate::error::SyncError;
use crate::gmail::{Extraction, HistoryExpiredError, extract_record};
use crate::models::{ChangeEvent, ChangeRecord, MessageId, SyncCursor};
use crate::notify::{Notifier, summary_text};
use crate::storage::{ArtifactSink, CursorStore, ObjectStore};

/// When the stored cursor moves to the event's position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    /// Write the new cursor before listing changes.
    ///
    /// A pass that fails after the write leaves its changes unreplayed.
    #[default]
    AdvanceBeforeFetch,
    /// Write the new cursor only after the change list was fetched and
    /// every record was handled. A failed pass is retried from the old
    /// cursor, so records may be emitted twice.
    AdvanceAfterSuccess,
}

impl FromStr for CursorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "advance_before_fetch" | "before_fetch" => Ok(Self::AdvanceBeforeFetch),
            "advance_after_success" | "after_success" => Ok(Self::AdvanceAfterSuccess),
            other => bail!("Unknown cursor policy: {}", other),
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    /// No cursor existed; the event only seeded it
    pub first_run: bool,
    /// The stored cursor had expired upstream; the event replaced it
    pub history_reset: bool,
    /// Distinct change records after dedup
    pub records_found: usize,
    /// Records fetched and extracted (skipped headerless records included)
    pub records_processed: usize,
    /// Ids of processed records, in emission order
    pub processed_ids: Vec<MessageId>,
    /// Cursor stored at the end of the pass
    pub cursor: Option<SyncCursor>,
    /// Duration of the pass
    pub duration_ms: u64,
}

/// Computes and emits the records that changed between two cursors
pub struct Reconciler {
    source: Arc<dyn ChangeSource>,
    notifier: Arc<dyn Notifier>,
    cursors: CursorStore,
    artifacts: ArtifactSink,
    settings: SyncSettings,
    policy: CursorPolicy,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            cursors: CursorStore::new(store.clone(), settings.layout.cursor_key()),
            artifacts: ArtifactSink::new(store, settings.layout.clone()),
            settings,
            policy: CursorPolicy::default(),
        }
    }

    pub fn with_cursor_policy(mut self, policy: CursorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Handle one inbound push message end to end
    ///
    /// Decodes the event, loads the stored cursor and reconciles. A payload
    /// that does not decode leaves the cursor untouched.
    pub fn handle_message(&self, data: &[u8]) -> Result<ReconciliationResult, SyncError> {
        let event = ChangeEvent::decode(data)?;
        info!(
            "Received change event for {} at history {}",
            event.email_address.as_deref().unwrap_or(&self.settings.account),
            event.history_id
        );

        let previous = timed("cursor load", || self.cursors.load()).map_err(SyncError::Cursor)?;
        self.reconcile(previous.as_ref(), &event)
    }

    /// Reconcile `event` against the `previous` cursor
    pub fn reconcile(
        &self,
        previous: Option<&SyncCursor>,
        event: &ChangeEvent,
    ) -> Result<ReconciliationResult, SyncError> {
        let start = std::time::Instant::now();
        let new_cursor = SyncCursor::from_event(event);
        let mut result = ReconciliationResult::default();

        let Some(previous) = previous else {
            info!(
                "No history at {}, starting from {}",
                self.cursors.key(),
                new_cursor.history_id
            );
            self.save_cursor(&new_cursor)?;
            result.first_run = true;
            result.cursor = Some(new_cursor);
            result.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(result);
        };

        if self.policy == CursorPolicy::AdvanceBeforeFetch {
            self.save_cursor(&new_cursor)?;
        }

        let listed = timed("change list fetch", || {
            self.source
                .list_changes(&previous.history_id, self.settings.history_label_filter())
        });
        let changes = match listed {
            Ok(changes) => changes,
            // Replaying from an expired id can never succeed
            Err(e) if e.downcast_ref::<HistoryExpiredError>().is_some() => {
                warn!(
                    "History {} expired, resetting cursor to {}",
                    previous.history_id, new_cursor.history_id
                );
                if self.policy == CursorPolicy::AdvanceAfterSuccess {
                    self.save_cursor(&new_cursor)?;
                }
                result.history_reset = true;
                result.cursor = Some(new_cursor);
                result.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(result);
            }
            Err(e) => return Err(SyncError::DeltaFetch(e)),
        };

        let records = dedup_records(collect_change_records(&changes, &self.settings));
        result.records_found = records.len();
        info!(
            "Found {} changed records since history {}",
            records.len(),
            previous.history_id
        );

        timed("record processing", || {
            for record in &records {
                if self.process_record(record) {
                    result.processed_ids.push(record.record_id.clone());
                }
            }
        });
        result.records_processed = result.processed_ids.len();

        best_effort("store change list", || {
            self.artifacts
                .store_change_list(&previous.history_id, &changes)
        });

        if self.policy == CursorPolicy::AdvanceAfterSuccess {
            self.save_cursor(&new_cursor)?;
        }

        result.cursor = Some(new_cursor);
        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Processed {}/{} records in {}ms",
            result.records_processed, result.records_found, result.duration_ms
        );
        Ok(result)
    }

    fn save_cursor(&self, cursor: &SyncCursor) -> Result<(), SyncError> {
        timed("cursor write", || self.cursors.save(cursor)).map_err(SyncError::Cursor)
    }

    /// Fetch, extract and emit one record; true when it counts as processed
    fn process_record(&self, record: &ChangeRecord) -> bool {
        let id = &record.record_id;
        if id.is_empty() {
            warn!(
                "Skipping change on thread {} without a message id",
                record.thread_id.as_str()
            );
            return false;
        }

        let raw = match timed("record fetch", || self.source.fetch_record(id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("Message {} not found", id);
                return false;
            }
            Err(e) => {
                warn!("Failed to fetch message {}: {:#}", id, e);
                return false;
            }
        };

        let canonical = match extract_record(&raw) {
            Ok(Extraction::Record(canonical)) => canonical,
            Ok(Extraction::Skip(reason)) => {
                debug!("Skipping message {}: {:?}", id, reason);
                return true;
            }
            Err(e) => {
                warn!("Failed to extract message {}: {:#}", id, e);
                return false;
            }
        };

        best_effort("store raw message", || self.artifacts.store_raw(id, &raw));
        best_effort("store record", || self.artifacts.store_record(id, &canonical));
        best_effort("notify", || self.notifier.notify(&summary_text(&canonical)));
        true
    }
}

/// Run a non-critical step, logging its failure instead of propagating it
fn best_effort<E: Display>(what: &str, f: impl FnOnce() -> Result<(), E>) {
    if let Err(e) = f() {
        warn!("{} failed: {:#}", what, e);
    }
}
