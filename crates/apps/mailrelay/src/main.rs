//! mailrelay - Gmail push notification relay
//!
//! Reconciles Gmail history for one watched mailbox and writes canonical
//! records to Cloud Storage or a local directory.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use relay::gmail::MetadataServerAuth;
use relay::{
    FileObjectStore, GcsObjectStore, GmailClient, GmailCredentials, LogNotifier, ObjectStore,
    Reconciler, RelayConfig, StorageBackend,
};

#[derive(Debug, Parser)]
#[command(name = "mailrelay", version, about = "Relay Gmail changes into canonical records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process one push notification (reads stdin when no input is given)
    Process {
        /// Message body, raw JSON or base64
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// File containing the message body
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Start push notifications for the watched labels
    Watch,
    /// Stop push notifications for the mailbox
    Unwatch,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    let relay_config = RelayConfig::load().context("Failed to load relay configuration")?;
    let gmail_auth = GmailCredentials::load()
        .context("Gmail credentials not found")?
        .into_provider();
    let gmail = GmailClient::new(gmail_auth, relay_config.sync.account.clone());

    match cli.command {
        Commands::Process { data, file } => {
            let payload = read_payload(data, file)?;
            let store = open_store(&relay_config.storage)?;
            let reconciler = Reconciler::new(
                Arc::new(gmail),
                store,
                Arc::new(LogNotifier),
                relay_config.sync.clone(),
            )
            .with_cursor_policy(relay_config.cursor_policy);

            match reconciler.handle_message(&payload) {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    Ok(())
                }
                Err(e) => {
                    error!("Reconciliation failed at {} stage: {}", e.stage(), e);
                    Err(e.into())
                }
            }
        }
        Commands::Watch => {
            let Some(topic) = relay_config.pubsub_topic.as_deref() else {
                bail!("GCP_PUBSUB_TOPIC environment variable is required.");
            };
            gmail.stop_watch().context("Failed to stop Gmail watch")?;
            let response = gmail.start_watch(topic, &relay_config.sync.watched_labels)?;
            info!(
                "Watching {} from history {} (expires {})",
                relay_config.sync.account,
                response.history_id,
                response.expiration.as_deref().unwrap_or("never")
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Unwatch => {
            gmail.stop_watch()?;
            info!("Stopped watching {}", relay_config.sync.account);
            Ok(())
        }
    }
}

fn read_payload(data: Option<String>, file: Option<PathBuf>) -> Result<Vec<u8>> {
    if let Some(data) = data {
        return Ok(data.into_bytes());
    }
    if let Some(path) = file {
        return std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()));
    }

    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("Failed to read message from stdin")?;
    Ok(buf)
}

fn open_store(backend: &StorageBackend) -> Result<Arc<dyn ObjectStore>> {
    Ok(match backend {
        StorageBackend::Gcs { bucket } => {
            info!("Using bucket gs://{}", bucket);
            Arc::new(GcsObjectStore::new(bucket.clone(), Arc::new(MetadataServerAuth::new())))
        }
        StorageBackend::Local { dir } => {
            info!("Using local storage at {}", dir.display());
            Arc::new(FileObjectStore::new(dir)?)
        }
    })
}
