//! Gmail API HTTP client
//!
//! Provides the history, message and watch endpoints used by the relay.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::TokenProvider;
use super::api::{HistoryResponse, WatchRequest, WatchResponse};
use crate::models::{MessageId, RawRecord};
use crate::sync::ChangeSource;

/// Error indicating the history ID has expired
#[derive(Debug, thiserror::Error)]
#[error("History ID expired or invalid")]
pub struct HistoryExpiredError;

/// Gmail API client for a single watched mailbox
pub struct GmailClient {
    auth: Arc<dyn TokenProvider>,
    user_id: String,
    base_url: String,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Attempts for a single message fetch
    const FETCH_ATTEMPTS: u32 = 3;

    /// Create a new Gmail client
    ///
    /// # Arguments
    /// * `auth` - Token provider for the watched account
    /// * `user_id` - Mailbox address, or `me` for the token's own account
    pub fn new(auth: Arc<dyn TokenProvider>, user_id: impl Into<String>) -> Self {
        Self {
            auth,
            user_id: user_id.into(),
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (e.g. a local emulator)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_url(&self) -> String {
        format!(
            "{}/users/{}",
            self.base_url,
            urlencoding::encode(&self.user_id)
        )
    }

    fn history_url(
        &self,
        start_history_id: &str,
        label_id: Option<&str>,
        page_token: Option<&str>,
    ) -> String {
        let mut url = format!(
            "{}/history?startHistoryId={}",
            self.user_url(),
            urlencoding::encode(start_history_id)
        );

        if let Some(label) = label_id {
            url.push_str(&format!("&labelId={}", urlencoding::encode(label)));
        }

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        url
    }

    /// List one page of history since a given historyId
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` if the history ID is too old (404 from Gmail)
    pub fn list_history(
        &self,
        start_history_id: &str,
        label_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        let access_token = self.auth.access_token()?;
        let url = self.history_url(start_history_id, label_id, page_token);

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let history: HistoryResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response")?;
                Ok(history)
            }
            Err(ureq::Error::StatusCode(404)) => Err(HistoryExpiredError.into()),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }

    /// List all history pages since a given historyId
    ///
    /// Automatically handles pagination; records keep upstream order.
    pub fn list_history_all(
        &self,
        start_history_id: &str,
        label_id: Option<&str>,
    ) -> Result<HistoryResponse> {
        let mut all_records = Vec::new();
        let mut final_history_id = None;
        let mut page_token = None;

        loop {
            let response = self.list_history(start_history_id, label_id, page_token.as_deref())?;

            if let Some(records) = response.history {
                all_records.extend(records);
            }

            if response.history_id.is_some() {
                final_history_id = response.history_id;
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(HistoryResponse {
            history: if all_records.is_empty() {
                None
            } else {
                Some(all_records)
            },
            next_page_token: None,
            history_id: final_history_id,
        })
    }

    /// Get the full message as raw JSON
    ///
    /// Returns `Ok(None)` when Gmail reports the message does not exist
    /// (deleted between the history entry and the fetch).
    pub fn get_message(&self, id: &MessageId) -> Result<Option<RawRecord>> {
        let access_token = self.auth.access_token()?;

        let url = format!(
            "{}/messages/{}?format=full",
            self.user_url(),
            urlencoding::encode(id.as_str())
        );

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let value: serde_json::Value = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse message response")?;
                Ok(Some(RawRecord::new(value)))
            }
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch message {}: {}", id, e)),
        }
    }

    /// Get a message with exponential backoff retry
    fn get_message_with_retry(&self, id: &MessageId, max_retries: u32) -> Result<Option<RawRecord>> {
        let mut delay = Duration::from_millis(100);
        let mut attempt = 1;

        loop {
            match self.get_message(id) {
                Ok(msg) => return Ok(msg),
                Err(e) if attempt >= max_retries => return Err(e),
                Err(e) => {
                    log::debug!("Fetch of {} failed (attempt {}): {:#}", id, attempt, e);
                    let jitter = Duration::from_millis(rand_jitter());
                    std::thread::sleep(delay + jitter);
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    /// Start push notifications for the mailbox
    ///
    /// Only changes touching `label_ids` are published to `topic_name`.
    pub fn start_watch(&self, topic_name: &str, label_ids: &[String]) -> Result<WatchResponse> {
        let access_token = self.auth.access_token()?;
        let url = format!("{}/watch", self.user_url());

        let request = WatchRequest {
            topic_name,
            label_ids,
            label_filter_action: "include",
        };

        let mut response = ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_json(&request)
            .context("Failed to send watch request")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse watch response")
    }

    /// Stop push notifications for the mailbox
    pub fn stop_watch(&self) -> Result<()> {
        let access_token = self.auth.access_token()?;
        let url = format!("{}/stop", self.user_url());

        ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_empty()
            .context("Failed to stop Gmail watch")?;

        Ok(())
    }
}

impl ChangeSource for GmailClient {
    fn list_changes(&self, start_cursor: &str, label_filter: Option<&str>) -> Result<HistoryResponse> {
        self.list_history_all(start_cursor, label_filter)
    }

    fn fetch_record(&self, id: &MessageId) -> Result<Option<RawRecord>> {
        self.get_message_with_retry(id, Self::FETCH_ATTEMPTS)
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
