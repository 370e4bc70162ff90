//! Integration tests for the relay crate
//!
//! These tests drive whole reconciliation passes through the public API,
//! with scripted change sources and in-memory storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use base64::prelude::*;
use relay::gmail::api::HistoryResponse;
use relay::storage::CursorStore;
use relay::{
    ChangeSource, CursorPolicy, HistoryExpiredError, InMemoryObjectStore, MessageId, Notifier,
    ObjectStore, RawRecord, Reconciler, SyncCursor, SyncError, SyncSettings,
};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Change source that replays a fixed history and message set
#[derive(Default)]
struct ScriptedSource {
    history: Option<Value>,
    messages: HashMap<String, Value>,
    failing: Vec<String>,
    expired: bool,
    list_calls: Mutex<Vec<(String, Option<String>)>>,
    fetches: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn with_history(history: Value) -> Self {
        Self {
            history: Some(history),
            ..Default::default()
        }
    }

    fn unavailable() -> Self {
        Self::default()
    }

    fn expired() -> Self {
        Self {
            expired: true,
            ..Default::default()
        }
    }

    fn message(mut self, id: &str, raw: Value) -> Self {
        self.messages.insert(id.to_string(), raw);
        self
    }

    fn failing(mut self, id: &str) -> Self {
        self.failing.push(id.to_string());
        self
    }

    fn list_calls(&self) -> Vec<(String, Option<String>)> {
        self.list_calls.lock().unwrap().clone()
    }

    fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

impl ChangeSource for ScriptedSource {
    fn list_changes(&self, start_cursor: &str, label_filter: Option<&str>) -> Result<HistoryResponse> {
        self.list_calls
            .lock()
            .unwrap()
            .push((start_cursor.to_string(), label_filter.map(str::to_string)));
        if self.expired {
            return Err(HistoryExpiredError.into());
        }
        match &self.history {
            Some(history) => Ok(serde_json::from_value(history.clone())?),
            None => Err(anyhow!("Failed to fetch history: 503 Service Unavailable")),
        }
    }

    fn fetch_record(&self, id: &MessageId) -> Result<Option<RawRecord>> {
        self.fetches.lock().unwrap().push(id.to_string());
        if self.failing.iter().any(|f| f == id.as_str()) {
            return Err(anyhow!("Failed to fetch message {}: connection reset", id));
        }
        Ok(self.messages.get(id.as_str()).cloned().map(RawRecord::new))
    }
}

/// Object store whose writes fail for keys containing a marker
struct FlakyStore {
    inner: InMemoryObjectStore,
    fail_marker: String,
}

impl FlakyStore {
    fn new(fail_marker: &str) -> Self {
        Self {
            inner: InMemoryObjectStore::new(),
            fail_marker: fail_marker.to_string(),
        }
    }
}

impl ObjectStore for FlakyStore {
    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        if key.contains(&self.fail_marker) {
            return Err(anyhow!("Failed to upload {}: 500", key));
        }
        self.inner.write(key, data)
    }
}

/// Object store that cannot be reached at all
struct UnreachableStore;

impl ObjectStore for UnreachableStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Err(anyhow!("Failed to check object {}: 503", key))
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        Err(anyhow!("Failed to download {}: 503", key))
    }

    fn write(&self, key: &str, _data: &[u8]) -> Result<()> {
        Err(anyhow!("Failed to upload {}: 503", key))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, summary: &str) -> Result<()> {
        self.sent.lock().unwrap().push(summary.to_string());
        if self.fail {
            return Err(anyhow!("push endpoint unreachable"));
        }
        Ok(())
    }
}

fn settings() -> SyncSettings {
    SyncSettings::new("me@example.com", vec!["UNREAD".to_string()])
}

fn raw_message(id: &str, from: &str, subject: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("t-{}", id),
        "snippet": format!("snippet {}", id),
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                {"name": "From", "value": from},
                {"name": "To", "value": "me@example.com"},
                {"name": "Subject", "value": subject}
            ],
            "body": {"size": 5, "data": "aGVsbG8"}
        }
    })
}

fn added(ids: &[&str]) -> Value {
    let entries: Vec<Value> = ids
        .iter()
        .map(|id| json!({"message": {"id": id, "threadId": format!("t-{}", id)}}))
        .collect();
    json!({"id": "451", "messagesAdded": entries})
}

fn seed_cursor(store: &Arc<dyn ObjectStore>, history_id: &str) {
    CursorStore::new(store.clone(), "history.json")
        .save(&SyncCursor::new(history_id))
        .unwrap();
}

fn stored_cursor(store: &Arc<dyn ObjectStore>) -> Option<String> {
    CursorStore::new(store.clone(), "history.json")
        .load()
        .unwrap()
        .map(|c| c.history_id)
}

struct Harness {
    source: Arc<ScriptedSource>,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<RecordingNotifier>,
    reconciler: Reconciler,
}

fn harness(source: ScriptedSource, store: Arc<dyn ObjectStore>, notifier: RecordingNotifier) -> Harness {
    let source = Arc::new(source);
    let notifier = Arc::new(notifier);
    let reconciler = Reconciler::new(source.clone(), store.clone(), notifier.clone(), settings());
    Harness {
        source,
        store,
        notifier,
        reconciler,
    }
}

fn memory_store() -> Arc<dyn ObjectStore> {
    Arc::new(InMemoryObjectStore::new())
}

#[test]
fn test_first_run_seeds_cursor_only() {
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]})),
        memory_store(),
        RecordingNotifier::default(),
    );

    let result = h
        .reconciler
        .handle_message(br#"{"emailAddress":"me@example.com","historyId":456}"#)
        .unwrap();

    assert!(result.first_run);
    assert_eq!(result.records_processed, 0);
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("456"));
    assert!(h.source.list_calls().is_empty());
    assert!(h.source.fetches().is_empty());
}

#[test]
fn test_duplicate_entries_fetched_once() {
    let history = json!({
        "history": [
            {"id": "451", "messagesAdded": [{"message": {"id": "m1", "threadId": "t1"}}]},
            {"id": "452", "labelsAdded": [{"message": {"id": "m1", "threadId": "t1"}, "labelIds": ["UNREAD"]}]}
        ],
        "historyId": "460"
    });
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(history)
            .message("m1", raw_message("m1", "Jane Doe <jane@example.com>", "Hello")),
        store,
        RecordingNotifier::default(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert!(!result.first_run);
    assert_eq!(result.records_found, 1);
    assert_eq!(result.processed_ids, vec![MessageId::new("m1")]);
    assert_eq!(h.source.fetches(), vec!["m1"]);
    assert_eq!(
        h.source.list_calls(),
        vec![("450".to_string(), Some("UNREAD".to_string()))]
    );
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("460"));
    assert_eq!(h.notifier.sent(), vec!["Jane Doe: Hello\n\nsnippet m1"]);

    for key in ["debug/m1_msg.json", "emails/m1_email.json", "debug/450.json"] {
        assert!(h.store.exists(key).unwrap(), "missing {}", key);
    }
    let record: Value = serde_json::from_slice(&h.store.read("emails/m1_email.json").unwrap()).unwrap();
    assert_eq!(record["subject"], "Hello");
    assert_eq!(record["bodyText"], "aGVsbG8");
}

#[test]
fn test_undecodable_payload_leaves_cursor() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]})),
        store,
        RecordingNotifier::default(),
    );

    for payload in [&b"not json at all"[..], b"eyJlbWFpbE", b"[1,2]", br#"{"emailAddress":"x"}"#] {
        let err = h.reconciler.handle_message(payload).unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)), "unexpected {:?}", err);
        assert_eq!(err.stage(), "decode");
    }

    assert_eq!(stored_cursor(&h.store).as_deref(), Some("450"));
    assert!(h.source.list_calls().is_empty());
}

#[test]
fn test_push_envelope_end_to_end() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]}))
            .message("m1", raw_message("m1", "a@example.com", "Hi")),
        store,
        RecordingNotifier::default(),
    );

    let data = BASE64_STANDARD.encode(br#"{"emailAddress":"me@example.com","historyId":470}"#);
    let envelope = json!({"message": {"data": data, "messageId": "1"}, "subscription": "s"});
    let result = h
        .reconciler
        .handle_message(envelope.to_string().as_bytes())
        .unwrap();

    assert_eq!(result.records_processed, 1);
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("470"));
}

#[test]
fn test_records_emitted_in_upstream_order() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m3", "m1"]), added(&["m2", "m3"])]}))
            .message("m1", raw_message("m1", "One <1@x>", "first"))
            .message("m2", raw_message("m2", "Two <2@x>", "second"))
            .message("m3", raw_message("m3", "Three <3@x>", "third")),
        store,
        RecordingNotifier::default(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    let ids: Vec<&str> = result.processed_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["m3", "m1", "m2"]);
    assert_eq!(h.source.fetches(), vec!["m3", "m1", "m2"]);
    let senders: Vec<String> = h
        .notifier
        .sent()
        .iter()
        .map(|s| s.split(':').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(senders, vec!["Three", "One", "Two"]);
}

#[test]
fn test_fetch_failures_isolated_per_record() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1", "m2", "m3", "m4"])]}))
            .message("m1", raw_message("m1", "a@x", "1"))
            .message("m4", raw_message("m4", "d@x", "4"))
            .failing("m2"),
        store,
        RecordingNotifier::default(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.records_found, 4);
    assert_eq!(
        result.processed_ids,
        vec![MessageId::new("m1"), MessageId::new("m4")]
    );
    assert_eq!(h.source.fetches(), vec!["m1", "m2", "m3", "m4"]);
    assert!(h.store.exists("emails/m4_email.json").unwrap());
    assert!(!h.store.exists("emails/m2_email.json").unwrap());
}

#[test]
fn test_headerless_message_skipped_without_artifacts() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1", "m2"])]}))
            .message("m1", json!({"id": "m1", "payload": {"mimeType": "text/plain"}}))
            .message("m2", raw_message("m2", "b@x", "kept")),
        store,
        RecordingNotifier::default(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.records_processed, 2);
    assert!(!h.store.exists("debug/m1_msg.json").unwrap());
    assert!(!h.store.exists("emails/m1_email.json").unwrap());
    assert_eq!(h.notifier.sent(), vec!["b@x: kept\n\nsnippet m2"]);
}

#[test]
fn test_cursor_write_failure_aborts_before_fetch() {
    let store: Arc<dyn ObjectStore> = Arc::new(FlakyStore::new("history.json"));
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]})),
        store,
        RecordingNotifier::default(),
    );
    let previous = SyncCursor::new("450");
    let event = relay::ChangeEvent::new("460");

    let err = h.reconciler.reconcile(Some(&previous), &event).unwrap_err();

    assert!(matches!(err, SyncError::Cursor(_)));
    assert!(h.source.list_calls().is_empty());
    assert!(h.source.fetches().is_empty());
}

#[test]
fn test_artifact_and_notify_failures_do_not_abort_batch() {
    let store: Arc<dyn ObjectStore> = Arc::new(FlakyStore::new("emails/"));
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1", "m2"])]}))
            .message("m1", raw_message("m1", "a@x", "1"))
            .message("m2", raw_message("m2", "b@x", "2")),
        store,
        RecordingNotifier::failing(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.records_processed, 2);
    assert_eq!(h.notifier.sent().len(), 2);
    assert!(h.store.exists("debug/m2_msg.json").unwrap());
    assert!(!h.store.exists("emails/m2_email.json").unwrap());
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("460"));
}

#[test]
fn test_advance_before_fetch_loses_failed_pass() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(ScriptedSource::unavailable(), store, RecordingNotifier::default());

    let err = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap_err();

    assert_eq!(err.stage(), "delta_fetch");
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("460"));
}

#[test]
fn test_advance_after_success_keeps_cursor_on_failure() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let source = Arc::new(ScriptedSource::unavailable());
    let reconciler = Reconciler::new(
        source.clone(),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        settings(),
    )
    .with_cursor_policy(CursorPolicy::AdvanceAfterSuccess);

    let err = reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap_err();
    assert!(matches!(err, SyncError::DeltaFetch(_)));
    assert_eq!(stored_cursor(&store).as_deref(), Some("450"));

    // A retry starts from the old cursor again
    let _ = reconciler.handle_message(br#"{"historyId":"460"}"#);
    let starts: Vec<String> = source.list_calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(starts, vec!["450", "450"]);
}

#[test]
fn test_advance_after_success_writes_cursor_at_end() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let reconciler = Reconciler::new(
        Arc::new(
            ScriptedSource::with_history(json!({"history": [added(&["m1"])]}))
                .message("m1", raw_message("m1", "a@x", "1")),
        ),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        settings(),
    )
    .with_cursor_policy(CursorPolicy::AdvanceAfterSuccess);

    let result = reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.records_processed, 1);
    assert_eq!(stored_cursor(&store).as_deref(), Some("460"));
}

#[test]
fn test_thread_fallback_dedup_and_unfetchable_entries() {
    let history = json!({"history": [{"id": "451", "messagesAdded": [
        {"message": {"threadId": "t1"}},
        {"message": {"threadId": "t1"}},
        {"message": {"id": "m1", "threadId": "t1"}}
    ]}]});
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(history).message("m1", raw_message("m1", "a@x", "1")),
        store,
        RecordingNotifier::default(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.records_found, 2);
    assert_eq!(result.processed_ids, vec![MessageId::new("m1")]);
    assert_eq!(h.source.fetches(), vec!["m1"]);
}

#[test]
fn test_multiple_watched_labels_filter_client_side() {
    let history = json!({"history": [{"id": "451", "labelsAdded": [
        {"message": {"id": "m1", "threadId": "t1"}, "labelIds": ["STARRED"]},
        {"message": {"id": "m2", "threadId": "t2"}, "labelIds": ["IMPORTANT"]}
    ]}]});
    let store = memory_store();
    seed_cursor(&store, "450");
    let source = Arc::new(
        ScriptedSource::with_history(history)
            .message("m1", raw_message("m1", "a@x", "1"))
            .message("m2", raw_message("m2", "b@x", "2")),
    );
    let reconciler = Reconciler::new(
        source.clone(),
        store,
        Arc::new(RecordingNotifier::default()),
        SyncSettings::new("me", vec!["UNREAD".to_string(), "IMPORTANT".to_string()]),
    );

    let result = reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.processed_ids, vec![MessageId::new("m2")]);
    assert_eq!(source.list_calls(), vec![("450".to_string(), None)]);
}

#[test]
fn test_file_store_pass_and_replay() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(relay::FileObjectStore::new(dir.path()).unwrap());
    let layout: relay::StorageLayout =
        serde_json::from_value(json!({"root_folder": "mail"})).unwrap();
    let source = Arc::new(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]}))
            .message("m1", raw_message("m1", "a@x", "1")),
    );
    let reconciler = Reconciler::new(
        source.clone(),
        store,
        Arc::new(RecordingNotifier::default()),
        settings().with_layout(layout),
    );

    let first = reconciler.handle_message(br#"{"historyId":"450"}"#).unwrap();
    assert!(first.first_run);
    assert!(dir.path().join("mail/history.json").is_file());

    let second = reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();
    assert_eq!(second.records_processed, 1);
    assert!(dir.path().join("mail/emails/m1_email.json").is_file());
    assert!(dir.path().join("mail/debug/m1_msg.json").is_file());
    assert!(dir.path().join("mail/debug/450.json").is_file());

    let stored: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("mail/history.json")).unwrap()).unwrap();
    assert_eq!(stored["historyId"], "460");
}

#[test]
fn test_snapshot_write_failure_is_not_fatal() {
    let store: Arc<dyn ObjectStore> = Arc::new(FlakyStore::new("debug/450.json"));
    seed_cursor(&store, "450");
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]}))
            .message("m1", raw_message("m1", "a@x", "1")),
        store,
        RecordingNotifier::default(),
    );

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert_eq!(result.processed_ids, vec![MessageId::new("m1")]);
    assert!(!h.store.exists("debug/450.json").unwrap());
    assert!(h.store.exists("emails/m1_email.json").unwrap());
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("460"));
}

#[test]
fn test_cursor_read_failure_is_terminal() {
    let h = harness(
        ScriptedSource::with_history(json!({"history": [added(&["m1"])]})),
        Arc::new(UnreachableStore),
        RecordingNotifier::default(),
    );

    let err = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap_err();

    assert!(matches!(err, SyncError::Cursor(_)));
    assert_eq!(err.stage(), "cursor");
    assert!(h.source.list_calls().is_empty());
    assert!(h.source.fetches().is_empty());
}

#[test]
fn test_expired_history_resets_cursor_after_success_policy() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let source = Arc::new(ScriptedSource::expired());
    let reconciler = Reconciler::new(
        source.clone(),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        settings(),
    )
    .with_cursor_policy(CursorPolicy::AdvanceAfterSuccess);

    for history_id in ["460", "470", "480"] {
        let payload = json!({"historyId": history_id}).to_string();
        let result = reconciler.handle_message(payload.as_bytes()).unwrap();
        assert!(result.history_reset);
        assert_eq!(result.records_processed, 0);
        assert_eq!(stored_cursor(&store).as_deref(), Some(history_id));
    }

    let starts: Vec<String> = source.list_calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(starts, vec!["450", "460", "470"]);
    assert!(source.fetches().is_empty());
}

#[test]
fn test_expired_history_resets_cursor_before_fetch_policy() {
    let store = memory_store();
    seed_cursor(&store, "450");
    let h = harness(ScriptedSource::expired(), store, RecordingNotifier::default());

    let result = h.reconciler.handle_message(br#"{"historyId":"460"}"#).unwrap();

    assert!(result.history_reset);
    assert!(!result.first_run);
    assert_eq!(stored_cursor(&h.store).as_deref(), Some("460"));
    assert!(!h.store.exists("debug/450.json").unwrap());
}
