//! Message-level models: change records, raw provider payloads and the
//! canonical flattened form

use super::ThreadId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of change reported by the history API
///
/// Two records describe the same unit of work when their [`identity`]
/// matches.
///
/// [`identity`]: ChangeRecord::identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub record_id: MessageId,
    pub thread_id: ThreadId,
}

impl ChangeRecord {
    pub fn new(record_id: impl Into<MessageId>, thread_id: impl Into<ThreadId>) -> Self {
        Self {
            record_id: record_id.into(),
            thread_id: thread_id.into(),
        }
    }

    /// Dedup key: the record id, or the thread id when the record id is empty
    pub fn identity(&self) -> &str {
        if self.record_id.is_empty() {
            self.thread_id.as_str()
        } else {
            self.record_id.as_str()
        }
    }
}

/// Full message payload exactly as returned by `users.messages.get`
///
/// Kept as untyped JSON so the audit copy is byte-for-byte what the
/// provider sent; the extractor reads the fields it needs from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(serde_json::Value);

impl RawRecord {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Serialize the payload for the audit artifact
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).context("Failed to serialize raw record")
    }
}

impl From<serde_json::Value> for RawRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Flattened message produced by the extractor
///
/// Body fields keep the provider's transfer encoding (base64url for Gmail).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanonicalRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub snippet: String,
    pub body_text: String,
    pub body_html: String,
}

impl CanonicalRecord {
    /// Sender display name: the `From` value up to the first `<`, trimmed
    pub fn sender_display_name(&self) -> &str {
        self.from.split('<').next().unwrap_or_default().trim()
    }
}
