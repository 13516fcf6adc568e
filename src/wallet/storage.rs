//! Durable storage slot
//!
//! The wallet owns exactly one key in a local key-value store. Clearing the
//! slot removes that key only; unrelated application state is preserved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Fixed key of the encrypted vault blob
pub const STORAGE_KEY: &str = "remembered_wallet";

/// File name of the key-value store inside the data directory
pub const STORAGE_FILE: &str = "storage.json";

/// Single-key durable slot holding an opaque string
#[async_trait]
pub trait StorageSlot: Send + Sync {
    async fn read(&self) -> Result<Option<String>>;

    /// Overwrite the slot
    async fn write(&self, blob: &str) -> Result<()>;

    /// Remove the slot; succeeds if already absent
    async fn remove(&self) -> Result<()>;
}

/// JSON key-value file shared with other application state
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/storage.json`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STORAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_map(&self) -> Result<BTreeMap<String, Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::Storage(format!("Failed to parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save_map(&self, map: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;

        // Owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, perms).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl StorageSlot for FileStorage {
    async fn read(&self) -> Result<Option<String>> {
        match self.load_map().await?.remove(STORAGE_KEY) {
            Some(Value::String(blob)) => Ok(Some(blob)),
            Some(_) => Err(Error::Storage(format!("{} is not a string", STORAGE_KEY))),
            None => Ok(None),
        }
    }

    async fn write(&self, blob: &str) -> Result<()> {
        let mut map = self.load_map().await?;
        map.insert(STORAGE_KEY.to_string(), Value::String(blob.to_string()));
        self.save_map(&map).await
    }

    async fn remove(&self) -> Result<()> {
        let mut map = self.load_map().await?;
        if map.remove(STORAGE_KEY).is_some() {
            self.save_map(&map).await?;
        }
        Ok(())
    }
}

/// In-process slot for embedding and tests
#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageSlot for MemoryStorage {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.slot().clone())
    }

    async fn write(&self, blob: &str) -> Result<()> {
        *self.slot() = Some(blob.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
