//! Blob persistence used for cross-seed inventory and shipment state.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::LogisticsError;

/// Key/value byte storage provided by the host.
pub trait BlobStore: Send + Sync {
    /// Load the blob stored under `key`, returning `None` if it does not exist.
    fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Persist `bytes` under `key`, replacing any previous value.
    fn save_blob(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Stores each blob as a JSON file beneath a root directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        let mut segments = key.split('/').map(sanitize_component).peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}.json"));
            }
        }
        path
    }
}

impl BlobStore for FileBlobStore {
    fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn save_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Volatile store for tests and the headless driver.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().contains_key(key)
    }
}

impl BlobStore for MemoryBlobStore {
    fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn save_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Read and decode a JSON blob.
///
/// Missing, unreadable and undecodable blobs all yield `None`; the latter
/// two are logged so the session can continue with defaults.
pub fn load_json<T: DeserializeOwned>(store: &dyn BlobStore, key: &str) -> Option<T> {
    let bytes = match store.load_blob(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(err) => {
            warn!("failed to load `{key}`: {err:#}");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(source) => {
            let err = LogisticsError::Serialization {
                key: key.to_string(),
                source,
            };
            warn!("{err}; continuing with defaults");
            None
        }
    }
}

/// Encode `value` as pretty JSON and store it under `key`.
pub fn save_json<T: Serialize>(store: &dyn BlobStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize `{key}`"))?;
    store.save_blob(key, &bytes)
}

fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
            result.push(ch);
        }
    }
    if result.is_empty() {
        "blob".to_string()
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn file_store_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = FileBlobStore::new(dir.path());
        let sample = Sample {
            name: "iron".to_string(),
            count: 3,
        };

        assert!(load_json::<Sample>(&store, "desired/seed-1").is_none());
        save_json(&store, "desired/seed-1", &sample)?;
        assert!(dir.path().join("desired").join("seed-1.json").exists());
        assert_eq!(load_json::<Sample>(&store, "desired/seed-1"), Some(sample));
        Ok(())
    }

    #[test]
    fn corrupt_blob_is_treated_as_absent() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.save_blob("shipping/main", b"{not json")?;
        assert!(store.contains("shipping/main"));
        assert!(load_json::<Sample>(&store, "shipping/main").is_none());
        Ok(())
    }

    #[test]
    fn sanitize_creates_safe_filenames() {
        assert_eq!(sanitize_component("../My Save!*"), "MySave");
        assert_eq!(sanitize_component("??"), "blob");
        let store = FileBlobStore::new("/tmp/root");
        assert_eq!(
            store.path_for("desired/../x y"),
            PathBuf::from("/tmp/root/desired/blob/xy.json")
        );
    }
}
