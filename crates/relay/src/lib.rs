//! Relay crate - Gmail history reconciliation
//!
//! This crate turns mailbox change notifications into canonical records:
//! - Decoding of inbound push events
//! - Durable sync cursor per mailbox
//! - Delta reconciliation against the Gmail history API
//! - Extraction of raw messages into canonical records
//! - Audit artifacts and downstream notifications
//!
//! Every external dependency (change source, object store, notifier, token
//! provider) is a trait object handed to the [`Reconciler`], so the engine
//! runs unchanged against GCS, a local directory or in-memory fakes.

pub mod config;
pub mod error;
pub mod gmail;
pub mod models;
pub mod notify;
pub mod storage;
pub mod sync;

pub use config::{GmailCredentials, RelayConfig, StorageBackend, SyncSettings};
pub use error::{DecodeError, SyncError};
pub use gmail::{GmailClient, HistoryExpiredError, TokenProvider};
pub use models::{CanonicalRecord, ChangeEvent, ChangeRecord, MessageId, RawRecord, SyncCursor, ThreadId};
pub use notify::{LogNotifier, Notifier};
pub use storage::{FileObjectStore, GcsObjectStore, InMemoryObjectStore, ObjectStore, StorageLayout};
pub use sync::{ChangeSource, CursorPolicy, ReconciliationResult, Reconciler};
