//! Flattening and deduplication of history change lists

use std::collections::HashSet;

use crate::config::SyncSettings;
use crate::gmail::api::{HistoryResponse, MessageRef};
use crate::models::ChangeRecord;

/// Flatten every history entry into change records, in upstream order
///
/// `messagesAdded` entries are always kept; `labelsAdded` entries only when
/// one of their labels is watched. Entries with neither an id nor a thread
/// id carry nothing to fetch and are dropped.
pub fn collect_change_records(changes: &HistoryResponse, settings: &SyncSettings) -> Vec<ChangeRecord> {
    let mut records = Vec::new();

    for entry in changes.records() {
        for added in &entry.labels_added {
            if settings.watches_any(&added.label_ids) {
                push_ref(&mut records, added.message.as_ref());
            }
        }
        for added in &entry.messages_added {
            push_ref(&mut records, added.message.as_ref());
        }
    }

    records
}

fn push_ref(records: &mut Vec<ChangeRecord>, message: Option<&MessageRef>) {
    if let Some(m) = message {
        if !m.id.is_empty() || !m.thread_id.is_empty() {
            records.push(ChangeRecord::new(m.id.as_str(), m.thread_id.as_str()));
        }
    }
}

/// Drop repeated records, keeping the first occurrence of each identity
pub fn dedup_records(records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.identity().to_string()))
        .collect()
}
