//! Gmail API integration
//!
//! This module provides:
//! - Bearer token providers
//! - Gmail API client for history, message and watch endpoints
//! - Extraction of raw messages into canonical records

mod auth;
mod client;
mod extract;

pub use auth::{MetadataServerAuth, RefreshTokenAuth, StaticToken, TokenProvider};
pub use client::{GmailClient, HistoryExpiredError};
pub use extract::{Extraction, SkipReason, extract_record};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Reference to a message (just ID and thread ID)
    ///
    /// Both fields default to empty; history entries occasionally omit one.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub label_ids: Option<Vec<String>>,
    }

    /// Response from `users.history.list`, with all pages merged
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub history: Option<Vec<HistoryRecord>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub next_page_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub history_id: Option<String>,
    }

    impl HistoryResponse {
        /// History records across all pages, in upstream order
        pub fn records(&self) -> &[HistoryRecord] {
            self.history.as_deref().unwrap_or_default()
        }
    }

    /// One history entry
    ///
    /// Fields the sync engine does not read (`messages`, `messagesDeleted`,
    /// `labelsRemoved`) are carried in `extra` so the debug snapshot keeps
    /// the full response.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        #[serde(default)]
        pub id: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub messages_added: Vec<HistoryMessageAdded>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub labels_added: Vec<HistoryLabelAdded>,
        #[serde(flatten)]
        pub extra: serde_json::Map<String, serde_json::Value>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct HistoryMessageAdded {
        #[serde(default)]
        pub message: Option<MessageRef>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryLabelAdded {
        #[serde(default)]
        pub message: Option<MessageRef>,
        #[serde(default)]
        pub label_ids: Vec<String>,
    }

    /// Full message from Gmail API, as read by the extractor
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: String,
        pub snippet: String,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        #[serde(default)]
        pub value: String,
    }

    /// Message body (base64url encoded)
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub body: Option<MessageBody>,
    }

    /// Request body for `users.watch`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchRequest<'a> {
        pub topic_name: &'a str,
        pub label_ids: &'a [String],
        pub label_filter_action: &'a str,
    }

    /// Response from `users.watch`
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchResponse {
        pub history_id: String,
        #[serde(default)]
        pub expiration: Option<String>,
    }
}
