//! Gmail message extraction
//!
//! Flattens a raw `users.messages.get` payload into a [`CanonicalRecord`].
//! Body data is copied as-is; decoding the base64url transfer encoding is
//! left to consumers of the stored records.

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

use super::api::{GmailMessage, MessagePayload};
use crate::models::{CanonicalRecord, RawRecord};

/// Outcome of extracting one raw message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Record(CanonicalRecord),
    Skip(SkipReason),
}

/// Why a message was intentionally not extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Payload carries no header list (some provider payloads legitimately don't)
    MissingHeaders,
}

/// Extract a canonical record from a raw Gmail message
///
/// Returns `Err` only when the payload does not have the shape of a Gmail
/// message at all (e.g. `payload` is a string).
pub fn extract_record(raw: &RawRecord) -> Result<Extraction> {
    let message = GmailMessage::deserialize(raw.as_value())
        .context("Raw record is not a Gmail message")?;

    let Some(payload) = message.payload.as_ref() else {
        debug!("Message {} has no payload", message.id);
        return Ok(Extraction::Skip(SkipReason::MissingHeaders));
    };
    let Some(headers) = payload.headers.as_ref() else {
        debug!("Header is not defined for msgId: {}", message.id);
        return Ok(Extraction::Skip(SkipReason::MissingHeaders));
    };

    let mut record = CanonicalRecord {
        id: message.id.clone(),
        snippet: message.snippet.clone(),
        ..Default::default()
    };

    let mime_type = payload.mime_type.as_deref().unwrap_or_default();
    if mime_type.contains("plain") {
        record.body_text = body_data(payload);
    } else {
        match &payload.parts {
            None => {
                debug!(
                    "Parts is not defined for msgId: {} mimeType: {}",
                    message.id, mime_type
                );
                record.body_text = body_data(payload);
            }
            // Later parts overwrite earlier ones of the same type
            Some(parts) => {
                for part in parts {
                    let data = part
                        .body
                        .as_ref()
                        .and_then(|b| b.data.clone())
                        .unwrap_or_default();
                    match part.mime_type.as_deref() {
                        Some("text/plain") => record.body_text = data,
                        Some("text/html") => record.body_html = data,
                        _ => {}
                    }
                }
            }
        }
    }

    // Last occurrence wins for repeated headers
    for header in headers {
        let name = header.name.as_str();
        if name.eq_ignore_ascii_case("To") {
            record.to = header.value.clone();
        } else if name.eq_ignore_ascii_case("From") {
            record.from = header.value.clone();
        } else if name.eq_ignore_ascii_case("Subject") {
            record.subject = header.value.clone();
        }
    }

    Ok(Extraction::Record(record))
}

/// Top-level body data of the payload
fn body_data(payload: &MessagePayload) -> String {
    payload
        .body
        .as_ref()
        .and_then(|b| b.data.clone())
        .unwrap_or_default()
}
