//! Sync cursor and the inbound change event that advances it

use anyhow::{Context, Result};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Last history position that has been handed to the reconciler
///
/// Stored as a single JSON blob per mailbox, e.g. `{"historyId":"456"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    #[serde(deserialize_with = "history_id::deserialize")]
    pub history_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl SyncCursor {
    pub fn new(history_id: impl Into<String>) -> Self {
        Self {
            history_id: history_id.into(),
            email_address: None,
        }
    }

    /// The cursor an event moves the mailbox to
    pub fn from_event(event: &ChangeEvent) -> Self {
        Self {
            history_id: event.history_id.clone(),
            email_address: event.email_address.clone(),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).with_context(|| {
            format!(
                "Invalid JSON in history file: {}",
                String::from_utf8_lossy(data)
            )
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize sync cursor")
    }
}

/// "The mailbox changed; its new position is `history_id`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(deserialize_with = "history_id::deserialize")]
    pub history_id: String,
}

impl ChangeEvent {
    pub fn new(history_id: impl Into<String>) -> Self {
        Self {
            email_address: None,
            history_id: history_id.into(),
        }
    }

    /// Decode an inbound Pub/Sub message body
    ///
    /// Accepts raw JSON, base64-framed JSON, or a push envelope of the form
    /// `{"message": {"data": "<base64>"}}`.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let value = parse_payload(data)?;

        if let Some(inner) = envelope_data(&value)? {
            let inner = parse_payload(&inner)?;
            return Self::from_value(inner);
        }

        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        if object.get("historyId").is_none_or(Value::is_null) {
            return Err(DecodeError::MissingHistoryId);
        }
        serde_json::from_value(value).map_err(DecodeError::InvalidShape)
    }
}

/// Parse bytes as JSON, unwrapping base64 framing when the payload is not
/// already a JSON object
fn parse_payload(data: &[u8]) -> Result<Value, DecodeError> {
    let trimmed = data.trim_ascii();

    if !trimmed.starts_with(b"{")
        && let Some(decoded) = decode_base64(trimmed)
        && let Ok(value) = serde_json::from_slice::<Value>(&decoded)
    {
        return Ok(value);
    }

    serde_json::from_slice(trimmed).map_err(DecodeError::InvalidJson)
}

/// Extract the base64 `message.data` of a push envelope, if this is one
fn envelope_data(value: &Value) -> Result<Option<Vec<u8>>, DecodeError> {
    if value.get("historyId").is_some() {
        return Ok(None);
    }
    match value.pointer("/message/data").and_then(Value::as_str) {
        Some(data) => decode_base64(data.as_bytes())
            .map(Some)
            .ok_or(DecodeError::InvalidEnvelope),
        None => Ok(None),
    }
}

/// Pub/Sub uses standard base64 but padding and alphabet vary by client,
/// so try the common variants.
fn decode_base64(data: &[u8]) -> Option<Vec<u8>> {
    let decoders: [&base64::engine::GeneralPurpose; 4] = [
        &BASE64_STANDARD,
        &BASE64_STANDARD_NO_PAD,
        &BASE64_URL_SAFE,
        &BASE64_URL_SAFE_NO_PAD,
    ];

    decoders.iter().find_map(|decoder| decoder.decode(data).ok())
}

/// Gmail sends `historyId` as a JSON number; older cursors store it as a
/// string. Both normalize to a non-empty string.
mod history_id {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HistoryIdRepr {
        Text(String),
        Number(u64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match HistoryIdRepr::deserialize(deserializer)? {
            HistoryIdRepr::Text(s) if s.trim().is_empty() => {
                Err(D::Error::custom("historyId must not be empty"))
            }
            HistoryIdRepr::Text(s) => Ok(s.trim().to_string()),
            HistoryIdRepr::Number(n) => Ok(n.to_string()),
        }
    }
}
