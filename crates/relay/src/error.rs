//! Error types surfaced to callers of the sync engine

/// Structural problems with an inbound change event
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid JSON message received: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Message must be a JSON object")]
    NotAnObject,
    #[error("Message has no historyId")]
    MissingHistoryId,
    #[error("Message does not match the change event shape: {0}")]
    InvalidShape(#[source] serde_json::Error),
    #[error("Push envelope data is not valid base64")]
    InvalidEnvelope,
}

/// A failed invocation, tagged with the stage that failed
///
/// Everything recoverable (single record fetches, artifact writes,
/// notifications) is logged by the reconciler and never becomes a
/// `SyncError`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("decode stage failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("cursor stage failed: {0:#}")]
    Cursor(anyhow::Error),
    #[error("delta fetch stage failed: {0:#}")]
    DeltaFetch(anyhow::Error),
}

impl SyncError {
    /// Short stage name for logs and exit reporting
    pub fn stage(&self) -> &'static str {
        match self {
            SyncError::Decode(_) => "decode",
            SyncError::Cursor(_) => "cursor",
            SyncError::DeltaFetch(_) => "delta_fetch",
        }
    }
}
