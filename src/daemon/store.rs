//! Key-value persistence for timer snapshots.
//!
//! The engine only talks to the [`StateStore`] trait. Two implementations
//! ship with the crate:
//! - [`MemoryStore`]: process-local map, used in tests and embeddings that
//!   do not need durability
//! - [`JsonFileStore`]: one JSON object on disk, replaced atomically

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use super::error::StoreError;

/// Durable key-value store.
///
/// Writes are last-write-wins; writing the same value twice is harmless.
pub trait StateStore: Send + Sync + 'static {
    /// Reads a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes a single value.
    fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Writes several values as one unit.
    ///
    /// The default implementation writes them one by one; stores that can
    /// do better should override it.
    fn put_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.put(key, value.clone())?;
        }
        Ok(())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn put_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError> {
        let mut map = self.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Store backed by a single JSON object file.
///
/// The whole object is cached in memory and rewritten on every put through
/// a temporary file and a rename, so readers never observe a torn write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, reading existing contents if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let cache = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened state store at {:?} ({} keys)", path, cache.len());

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// Opens the store at `path`, starting empty if the file is unusable.
    ///
    /// A file that does not parse is moved aside to `<name>.json.corrupt`
    /// so the next write replaces it without losing the evidence. Any later
    /// write failure surfaces through `put_many` as usual.
    pub fn open_or_recover(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(StoreError::Malformed(reason)) => {
                let aside = path.with_extension("json.corrupt");
                match fs::rename(&path, &aside) {
                    Ok(()) => warn!(
                        "State file {:?} is malformed ({}), moved to {:?}",
                        path, reason, aside
                    ),
                    Err(e) => warn!(
                        "State file {:?} is malformed ({}) and could not be moved: {}",
                        path, reason, e
                    ),
                }
                Self::empty(path)
            }
            Err(e) => {
                warn!("Cannot read state file {:?}, starting empty: {}", path, e);
                Self::empty(path)
            }
        }
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, map: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.put_many(&[(key, value)])
    }

    fn put_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError> {
        let mut map = self.lock();
        let mut next = map.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), value.clone());
        }
        // Only commit to the cache once the file is durable.
        self.flush(&next)?;
        *map = next;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
