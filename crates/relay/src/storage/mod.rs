//! Storage traits and implementations
//!
//! Everything the relay persists goes through [`ObjectStore`]: the mailbox
//! cursor via [`CursorStore`] and audit artifacts via [`ArtifactSink`].
//! The trait-based design allows swapping between GCS, a local directory
//! and memory.

mod artifacts;
mod cursor;
mod file;
mod gcs;
mod layout;
mod memory;
mod traits;

pub use artifacts::ArtifactSink;
pub use cursor::CursorStore;
pub use file::FileObjectStore;
pub use gcs::GcsObjectStore;
pub use layout::StorageLayout;
pub use memory::InMemoryObjectStore;
pub use traits::{ObjectNotFound, ObjectStore};
