//! Configuration loading for mailrelay
//!
//! Provides utilities for loading configuration files from the shared
//! mailrelay config directory (~/.config/mailrelay/) and for reading
//! settings from the process environment.
//!
//! Call [`init`] at startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Initialize the mailrelay config directory.
///
/// Creates ~/.config/mailrelay/ if it doesn't exist.
/// Call this once at startup.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the mailrelay config directory (~/.config/mailrelay/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("mailrelay"))
}

/// Get the path to a config file within the mailrelay config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the mailrelay config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the mailrelay config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the mailrelay config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Read an environment variable, treating blank values as unset.
///
/// The returned value is trimmed.
pub fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve a required setting through `lookup`.
///
/// `lookup` is usually [`env_value`]; tests pass a map-backed closure.
pub fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} environment variable is required.", key))
}
