//! File-based object storage
//!
//! Mirrors the bucket layout on a local directory, for running the relay
//! outside GCP.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::{ObjectNotFound, ObjectStore};

/// File-based object storage
///
/// Directory structure for the default layout:
/// ```text
/// root/
///   history.json
///   debug/
///     450.json            # change list fetched from history 450
///     m1_msg.json         # raw message m1
///   emails/
///     m1_email.json       # canonical record m1
/// ```
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Create a new file object store at the given path
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).context("Failed to create object storage directory")?;
        Ok(Self { root })
    }

    /// Get the file path for a key, refusing keys that escape the root
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object key: {:?}", key);
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FileObjectStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.object_path(key)?.is_file())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;

        if !path.is_file() {
            return Err(ObjectNotFound::new(key).into());
        }

        fs::read(&path).with_context(|| format!("Failed to read object: {}", path.display()))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically (write to temp, then rename)
        let mut temp_name = path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, data)
            .with_context(|| format!("Failed to write object: {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to move object into place: {}", path.display()))?;

        Ok(())
    }
}
