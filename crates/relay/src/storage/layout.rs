//! Key layout for the cursor and audit artifacts

use serde::{Deserialize, Serialize};

use crate::models::MessageId;

/// Where the relay keeps its objects inside the store
///
/// Segments are joined with `/`; leading and trailing slashes in configured
/// values are ignored, and an empty root folder means the store root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    pub root_folder: String,
    pub history_file_name: String,
    pub emails_folder: String,
    pub debug_folder: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            root_folder: String::new(),
            history_file_name: "history.json".to_string(),
            emails_folder: "emails".to_string(),
            debug_folder: "debug".to_string(),
        }
    }
}

impl StorageLayout {
    /// Key of the mailbox cursor
    pub fn cursor_key(&self) -> String {
        join_key(&[&self.root_folder, &self.history_file_name])
    }

    /// Key of the raw provider payload for a message
    pub fn raw_record_key(&self, id: &MessageId) -> String {
        join_key(&[
            &self.root_folder,
            &self.debug_folder,
            &format!("{}_msg.json", id),
        ])
    }

    /// Key of the canonical record for a message
    pub fn record_key(&self, id: &MessageId) -> String {
        join_key(&[
            &self.root_folder,
            &self.emails_folder,
            &format!("{}_email.json", id),
        ])
    }

    /// Key of the change-list snapshot fetched from `history_id`
    pub fn change_list_key(&self, history_id: &str) -> String {
        join_key(&[
            &self.root_folder,
            &self.debug_folder,
            &format!("{}.json", history_id),
        ])
    }
}

fn join_key(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = StorageLayout::default();
        let id = MessageId::new("m1");

        assert_eq!(layout.cursor_key(), "history.json");
        assert_eq!(layout.raw_record_key(&id), "debug/m1_msg.json");
        assert_eq!(layout.record_key(&id), "emails/m1_email.json");
        assert_eq!(layout.change_list_key("450"), "debug/450.json");
    }

    #[test]
    fn test_slashes_are_normalized() {
        let layout = StorageLayout {
            root_folder: "assistant/".to_string(),
            history_file_name: "history.json".to_string(),
            emails_folder: "/emails/".to_string(),
            debug_folder: "debug/".to_string(),
        };

        assert_eq!(layout.cursor_key(), "assistant/history.json");
        assert_eq!(
            layout.record_key(&MessageId::new("m1")),
            "assistant/emails/m1_email.json"
        );
        assert_eq!(layout.change_list_key("9"), "assistant/debug/9.json");
    }
}
