//! Key-value persistence
//!
//! Values are strings; typed records go through the JSON helpers on
//! [`KeyValueStoreExt`].

use crate::{ReverieError, Result};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Application data directory name
pub const APP_DIR: &str = "reverie";

/// String key-value storage capability
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Returns whether the key existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Typed access on top of any store
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(text) if !text.trim().is_empty() => Ok(Some(serde_json::from_str(&text)?)),
            _ => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.put(key, &text)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Store kept in memory only
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Store persisted as one JSON object on disk
///
/// The whole map is rewritten on every change, through a temporary file so a
/// crash never leaves a half-written store.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing or empty file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ReverieError::Storage(format!("Failed to parse {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ReverieError::Storage(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )))
            }
        };
        info!("Opened store {:?} with {} entries", path, entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Open the store in the platform data directory
    pub fn open_default() -> Result<Self> {
        Self::open(default_data_dir()?.join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ReverieError::Storage(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .map_err(|e| ReverieError::Storage(format!("Failed to write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ReverieError::Storage(format!("Failed to replace {:?}: {}", self.path, e))
        })?;
        debug!("Flushed {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.flush(&entries)?;
        Ok(true)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Platform data directory for the application
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| ReverieError::Storage("Could not determine data directory".into()))
}
