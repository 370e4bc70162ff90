//! Delta reconciliation between a stored cursor and an inbound change event
//!
//! A pass is idempotent with respect to the cursor: replaying the same event
//! against the same stored cursor lists and emits the same records.

mod changes;
mod reconcile;
mod timing;

use anyhow::Result;

use crate::gmail::api::HistoryResponse;
use crate::models::{MessageId, RawRecord};

pub use changes::{collect_change_records, dedup_records};
pub use reconcile::{CursorPolicy, ReconciliationResult, Reconciler};
pub use timing::timed;

/// Upstream provider of change lists and full records
pub trait ChangeSource: Send + Sync {
    /// List every change since `start_cursor`, all pages merged in order
    fn list_changes(&self, start_cursor: &str, label_filter: Option<&str>) -> Result<HistoryResponse>;

    /// Fetch one full record; `Ok(None)` when the provider no longer has it
    fn fetch_record(&self, id: &MessageId) -> Result<Option<RawRecord>>;
}
