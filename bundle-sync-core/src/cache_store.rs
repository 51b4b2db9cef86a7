//! Persisted bundle state.
//!
//! [`FileCacheStore`] keeps the key/value map in a small JSON file and is what
//! the CLI uses. [`MemoryCacheStore`] is the process-local variant.
//! [`CacheState`] is the typed view the synchroniser reads and writes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::contract::{CacheKey, CacheStore};
use crate::error::StoreError;
use crate::metadata::BundleInfo;

/// Typed snapshot of the persisted state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    /// Publish timestamp of the installed bundle; `0.0` when there is none.
    pub current_bundle_timestamp: f64,
    pub cached_bundle_info: Option<BundleInfo>,
}

impl CacheState {
    /// Read the state out of a store. Unreadable values read as absent.
    pub fn load<S: CacheStore + ?Sized>(store: &S) -> Self {
        let current_bundle_timestamp = store
            .get(CacheKey::CurrentBundleTimestamp)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let cached_bundle_info = store.get(CacheKey::CachedBundleInfo).and_then(|v| {
            serde_json::from_value::<BundleInfo>(v)
                .map_err(|e| warn!(error = %e, "Discarding unreadable cached bundle info"))
                .ok()
        });

        CacheState {
            current_bundle_timestamp,
            cached_bundle_info,
        }
    }

    /// Record a freshly installed bundle.
    pub fn record<S: CacheStore + ?Sized>(
        store: &S,
        timestamp: f64,
        bundle_info: &BundleInfo,
    ) -> Result<(), StoreError> {
        store.set(CacheKey::CachedBundleInfo, serde_json::to_value(bundle_info)?)?;
        store.set(CacheKey::CurrentBundleTimestamp, Value::from(timestamp))?;
        info!(timestamp, identifier = ?bundle_info.identifier, "Recorded installed bundle");
        Ok(())
    }

    pub fn has_bundle(&self) -> bool {
        self.current_bundle_timestamp > 0.0
    }
}

/// State kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    values: Mutex<HashMap<CacheKey, Value>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryCacheStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, Value>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Io(std::io::Error::other("state lock poisoned")))
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: CacheKey) -> Option<Value> {
        self.values.lock().ok()?.get(&key).cloned()
    }

    fn set(&self, key: CacheKey, value: Value) -> Result<(), StoreError> {
        self.lock()?.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
        self.lock()?.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.lock()?.clear();
        Ok(())
    }
}

/// State persisted as a JSON object in a single file.
///
/// Every write rewrites the file through a sibling temp file and a rename.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FileCacheStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                other => {
                    warn!(path = %path.display(), found = %other, "State file is not an object, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet");
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), keys = values.len(), "Opened bundle state file");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Persisted bundle state");
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::Io(std::io::Error::other("state lock poisoned")))?;
        // The in-memory map only changes once the file holds the new state.
        let mut updated = values.clone();
        f(&mut updated);
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: CacheKey) -> Option<Value> {
        self.values.lock().ok()?.get(key.as_str()).cloned()
    }

    fn set(&self, key: CacheKey, value: Value) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(key.as_str().to_string(), value);
        })
    }

    fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
        self.update(|values| {
            values.remove(key.as_str());
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.update(|values| {
            for key in CacheKey::ALL {
                values.remove(key.as_str());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn poisoned_memory_store_reports_write_errors() {
        let store = MemoryCacheStore::new();
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = store.values.lock().unwrap();
                    panic!("poison the state lock");
                })
                .join()
        });

        assert!(matches!(
            store.set(CacheKey::CurrentBundleTimestamp, json!(1.0)),
            Err(StoreError::Io(_))
        ));
        assert!(store.remove(CacheKey::CachedBundleInfo).is_err());
        assert!(store.clear().is_err());
    }
}
