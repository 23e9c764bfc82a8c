//! Durable snapshot of the last known-good collection per (table, owner).
//!
//! The cache never surfaces failures to its callers: write errors and
//! corrupt reads are logged and treated as "nothing cached".

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::time::now_ms;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache quota exceeded ({needed} bytes needed, {quota} allowed)")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("cache snapshot version {found} is not supported")]
    Version { found: u32 },
}

/// String-keyed durable storage behind [`LocalCache`].
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    /// Flush buffered writes; backends that write through do nothing.
    fn save(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// One JSON file per key inside a directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

// Keys contain ':' and arbitrary owner ids; keep file names portable.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

impl CacheBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|err| err.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Process-local backend, optionally limited to a byte quota across all keys.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryBackend {
    pub fn with_quota(quota: usize) -> Self {
        Self {
            data: Mutex::default(),
            quota: Some(quota),
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(quota) = self.quota {
            let others: usize = guard
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(CacheError::QuotaExceeded { needed, quota });
            }
        }
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
        Ok(())
    }
}

/// Identifies one cached collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
    pub table: String,
    pub owner_id: String,
}

impl CacheScope {
    pub fn new(table: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            owner_id: owner_id.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.table, self.owner_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSnapshot<T> {
    pub version: u32,
    pub saved_at: i64,
    pub items: Vec<T>,
}

#[derive(Serialize)]
struct SnapshotRef<'a, T> {
    version: u32,
    saved_at: i64,
    items: &'a [T],
}

#[derive(Clone)]
pub struct LocalCache {
    inner: Arc<dyn CacheBackend>,
}

impl LocalCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { inner: backend }
    }

    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    pub fn with_quota(quota: usize) -> Self {
        Self::new(Arc::new(MemoryBackend::with_quota(quota)))
    }

    /// Overwrite the snapshot for `scope`. Returns whether the write landed.
    pub fn save<T: Serialize>(&self, scope: &CacheScope, items: &[T]) -> bool {
        match self.try_save(scope, items) {
            Ok(()) => {
                debug!(
                    target: "quadrant",
                    event = "cache_saved",
                    key = %scope.key(),
                    count = items.len()
                );
                true
            }
            Err(err) => {
                warn!(
                    target: "quadrant",
                    event = "cache_save_failed",
                    key = %scope.key(),
                    error = %err
                );
                false
            }
        }
    }

    fn try_save<T: Serialize>(&self, scope: &CacheScope, items: &[T]) -> Result<(), CacheError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            saved_at: now_ms(),
            items,
        };
        let payload = serde_json::to_string(&snapshot)?;
        self.inner.set(&scope.key(), &payload)?;
        self.inner.save()
    }

    /// Read the snapshot for `scope`; `None` when absent or unreadable.
    pub fn load<T: DeserializeOwned>(&self, scope: &CacheScope) -> Option<CacheSnapshot<T>> {
        match self.try_load(scope) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    target: "quadrant",
                    event = "cache_load_failed",
                    key = %scope.key(),
                    error = %err
                );
                None
            }
        }
    }

    fn try_load<T: DeserializeOwned>(
        &self,
        scope: &CacheScope,
    ) -> Result<Option<CacheSnapshot<T>>, CacheError> {
        let Some(raw) = self.inner.get(&scope.key())? else {
            return Ok(None);
        };
        let snapshot: CacheSnapshot<T> = serde_json::from_str(&raw)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CacheError::Version {
                found: snapshot.version,
            });
        }
        Ok(Some(snapshot))
    }

    pub fn clear(&self, scope: &CacheScope) {
        if let Err(err) = self.inner.remove(&scope.key()).and_then(|()| self.inner.save()) {
            warn!(
                target: "quadrant",
                event = "cache_clear_failed",
                key = %scope.key(),
                error = %err
            );
        }
    }

    /// Raw JSON payload for inspection tooling.
    pub fn raw(&self, scope: &CacheScope) -> Option<String> {
        self.inner.get(&scope.key()).ok().flatten()
    }
}
