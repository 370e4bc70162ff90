//! Downstream notification of extracted records

use anyhow::Result;
use log::info;

use crate::models::CanonicalRecord;

/// Receives one human-readable summary per extracted record
///
/// Notification is best-effort; the reconciler logs failures and moves on.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str) -> Result<()>;
}

/// Notifier that writes summaries to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &str) -> Result<()> {
        info!("Sending notification: {}", summary.replace('\n', " | "));
        Ok(())
    }
}

/// `"{sender}: {subject}\n\n{snippet}"`, sender being the `From` display name
pub fn summary_text(record: &CanonicalRecord) -> String {
    format!(
        "{}: {}\n\n{}",
        record.sender_display_name(),
        record.subject,
        record.snippet
    )
}
