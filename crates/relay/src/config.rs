//! Configuration loading for the relay
//!
//! Settings are resolved once at startup and handed to the reconciler; the
//! sync engine itself never reads the environment. Sources, in order of
//! priority:
//! 1. JSON file (~/.config/mailrelay/settings.json)
//! 2. Environment variables (the Cloud Functions deployment style)

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::gmail::{RefreshTokenAuth, StaticToken, TokenProvider};
use crate::storage::StorageLayout;
use crate::sync::CursorPolicy;

/// Settings filename in the mailrelay config directory
const SETTINGS_FILE: &str = "settings.json";

/// Credentials filename in the mailrelay config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// What the reconciler needs to know about the watched mailbox
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncSettings {
    /// Gmail user id of the watched mailbox
    pub account: String,
    /// Label ids whose `labelsAdded` history entries are relevant
    #[serde(default)]
    pub watched_labels: Vec<String>,
    #[serde(default)]
    pub layout: StorageLayout,
}

impl SyncSettings {
    pub fn new(account: impl Into<String>, watched_labels: Vec<String>) -> Self {
        Self {
            account: account.into(),
            watched_labels,
            layout: StorageLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: StorageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Whether any of `label_ids` is a watched label
    pub fn watches_any(&self, label_ids: &[String]) -> bool {
        label_ids.iter().any(|l| self.watched_labels.contains(l))
    }

    /// Server-side `labelId` filter for the history request
    ///
    /// The history endpoint accepts a single label, so the filter is only
    /// applied when exactly one label is watched.
    pub fn history_label_filter(&self) -> Option<&str> {
        match self.watched_labels.as_slice() {
            [label] => Some(label.as_str()),
            _ => None,
        }
    }
}

/// Where cursor and artifacts are stored
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Google Cloud Storage bucket
    Gcs { bucket: String },
    /// Local directory
    Local { dir: PathBuf },
}

/// Full process configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    pub sync: SyncSettings,
    pub storage: StorageBackend,
    /// Pub/Sub topic the mailbox watch publishes to
    #[serde(default)]
    pub pubsub_topic: Option<String>,
    #[serde(default)]
    pub cursor_policy: CursorPolicy,
}

impl RelayConfig {
    /// Load configuration from the settings file, falling back to the
    /// environment
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            return config::load_json(SETTINGS_FILE);
        }
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&config::env_value)
    }

    /// Resolve configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account = config::required(lookup, "WATCH_ACCOUNT")?;
        let watched_labels = parse_label_ids(&config::required(lookup, "LABEL_IDS")?);

        let layout = StorageLayout {
            root_folder: lookup("ROOT_FOLDER").unwrap_or_default(),
            history_file_name: config::required(lookup, "HISTORY_FILE_NAME")?,
            emails_folder: config::required(lookup, "EMAILS_FOLDER")?,
            debug_folder: config::required(lookup, "DEBUG_FOLDER")?,
        };

        let storage = if let Some(bucket) = lookup("GCP_CONTENT_BUCKET_NAME") {
            StorageBackend::Gcs { bucket }
        } else if let Some(dir) = lookup("MAILRELAY_STORAGE_DIR") {
            StorageBackend::Local { dir: dir.into() }
        } else {
            bail!("GCP_CONTENT_BUCKET_NAME environment variable is required.");
        };

        let cursor_policy = match lookup("MAILRELAY_CURSOR_POLICY") {
            Some(value) => value.parse()?,
            None => CursorPolicy::default(),
        };

        Ok(Self {
            sync: SyncSettings {
                account,
                watched_labels,
                layout,
            },
            storage,
            pubsub_topic: lookup("GCP_PUBSUB_TOPIC"),
            cursor_policy,
        })
    }
}

/// Split a comma-separated `LABEL_IDS` value
fn parse_label_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Credentials for the Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmailCredentials {
    /// Externally issued access token
    AccessToken(String),
    /// OAuth client plus a refresh token for the watched account
    Refresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

/// Google Cloud Console credential file format (installed or web app)
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

#[derive(Deserialize)]
struct OAuthClient {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials using the following priority:
    /// 1. `GMAIL_ACCESS_TOKEN`
    /// 2. `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET` / `GMAIL_REFRESH_TOKEN`
    /// 3. ~/.config/mailrelay/google-credentials.json plus `GMAIL_REFRESH_TOKEN`
    pub fn load() -> Result<Self> {
        let lookup = config::env_value;

        if lookup("GMAIL_ACCESS_TOKEN").is_some() || lookup("GMAIL_CLIENT_ID").is_some() {
            return Self::from_lookup(&lookup);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let file: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            let refresh_token = config::required(&lookup, "GMAIL_REFRESH_TOKEN")?;
            return Self::from_credential_file(file, refresh_token);
        }

        Self::from_lookup(&lookup)
    }

    /// Resolve credentials from environment-style keys
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("GMAIL_ACCESS_TOKEN") {
            return Ok(Self::AccessToken(token));
        }

        Ok(Self::Refresh {
            client_id: config::required(lookup, "GMAIL_CLIENT_ID")?,
            client_secret: config::required(lookup, "GMAIL_CLIENT_SECRET")?,
            refresh_token: config::required(lookup, "GMAIL_REFRESH_TOKEN")?,
        })
    }

    /// Parse a Google Cloud Console credentials JSON document
    pub fn from_json(json: &str, refresh_token: impl Into<String>) -> Result<Self> {
        let file: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(file, refresh_token.into())
    }

    fn from_credential_file(file: GoogleCredentialFile, refresh_token: String) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let client = file
            .installed
            .or(file.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self::Refresh {
            client_id: client.client_id,
            client_secret: client.client_secret,
            refresh_token,
        })
    }

    /// Build the token provider shared by everything that calls Gmail
    pub fn into_provider(self) -> Arc<dyn TokenProvider> {
        match self {
            Self::AccessToken(token) => Arc::new(StaticToken::new(token)),
            Self::Refresh {
                client_id,
                client_secret,
                refresh_token,
            } => Arc::new(RefreshTokenAuth::new(client_id, client_secret, refresh_token)),
        }
    }
}
