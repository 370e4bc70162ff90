//! Domain models for the history sync engine

mod cursor;
mod message;
mod thread;

pub use cursor::{ChangeEvent, SyncCursor};
pub use message::{CanonicalRecord, ChangeRecord, MessageId, RawRecord};
pub use thread::ThreadId;
