use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, CachePolicy, EvictionPolicy};
use crate::protocol::NULL_VALUE;

/// Name of the snapshot file inside the storage directory
pub const STORAGE_FILE: &str = "kvstorage.txt";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage directory does not exist or is not a directory: {0}")]
    InvalidStorageDir(PathBuf),
}

/// Point-in-time engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub keys: usize,
    pub cached_keys: usize,
    pub cache_policy: CachePolicy,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub storage_hits: u64,
    pub evictions: u64,
    pub snapshots_written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    storage_hits: AtomicU64,
    evictions: AtomicU64,
    snapshots_written: AtomicU64,
}

/// Durable key space fronted by a write-through cache.
///
/// The map is a sharded concurrent map so readers of unrelated keys never
/// contend. Every mutation runs under `writer`, so the full-file snapshot
/// that follows each mutation sees a consistent map and the cache cannot
/// keep a key a concurrent delete just removed. Reads never take `writer`.
///
/// Mutations block for the length of a snapshot. Async callers use
/// [`StorageEngine::run_blocking`].
#[derive(Debug)]
pub struct StorageEngine {
    store: DashMap<String, String>,
    cache: Mutex<Cache>,
    writer: Mutex<()>,
    dir: RwLock<PathBuf>,
    counters: Counters,
}

impl StorageEngine {
    /// Open the store in `dir`, loading `kvstorage.txt` or creating it empty.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        policy: CachePolicy,
        capacity: usize,
    ) -> Result<Self, StorageError> {
        let dir = validate_dir(dir.as_ref())?;
        let store = DashMap::new();
        load_snapshot(&dir.join(STORAGE_FILE), &store)?;

        info!(
            "Opened storage at {} with {} keys (cache: {} x {})",
            dir.display(),
            store.len(),
            policy,
            capacity
        );

        Ok(Self {
            store,
            cache: Mutex::new(Cache::new(policy, capacity)),
            writer: Mutex::new(()),
            dir: RwLock::new(dir),
            counters: Counters::default(),
        })
    }

    pub fn storage_path(&self) -> PathBuf {
        self.dir.read().join(STORAGE_FILE)
    }

    /// Redirect future snapshots to `dir`. The directory must already exist.
    pub fn set_storage_path<P: AsRef<Path>>(&self, dir: P) -> Result<(), StorageError> {
        let dir = validate_dir(dir.as_ref())?;
        let _writer = self.writer.lock();
        info!("Storage path set to {}", dir.display());
        *self.dir.write() = dir;
        Ok(())
    }

    /// Run `op` against this engine on the blocking thread pool.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&StorageEngine) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache.lock().policy()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().capacity()
    }

    /// Cache first, then the durable store. A store hit does not warm the
    /// cache.
    pub fn get(&self, key: &str) -> Option<String> {
        {
            let mut cache = self.cache.lock();
            if cache.is_enabled() {
                if let Some(value) = cache.get(key) {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache hit for key: {}", key);
                    return Some(value);
                }
                self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        let value = self.store.get(key).map(|v| v.value().clone());
        if value.is_some() {
            self.counters.storage_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Storage hit for key: {}", key);
        }
        value
    }

    /// Upsert, or delete when `value` is `None` or the `null` sentinel.
    ///
    /// The whole store is rewritten to disk before returning. On a snapshot
    /// failure the in-memory change stays applied and the error is returned.
    pub fn put(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        let _writer = self.writer.lock();

        match value.filter(|v| *v != NULL_VALUE) {
            None => {
                if self.store.remove(key).is_some() {
                    info!("Key removed from storage: {}", key);
                }
                if self.cache.lock().remove(key).is_some() {
                    info!("Key removed from cache: {}", key);
                }
            }
            Some(value) => {
                self.store.insert(key.to_string(), value.to_string());
                debug!("Storage updated for key: {}", key);

                let mut cache = self.cache.lock();
                if cache.is_enabled() {
                    if let Some(evicted) = cache.admit(key, value) {
                        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                        debug!("Evicted key {} from {} cache", evicted, cache.policy());
                    }
                }
            }
        }

        self.write_snapshot().inspect_err(|e| {
            error!("Error saving storage after update of key {}: {}", key, e);
        })
    }

    pub fn in_storage(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn in_cache(&self, key: &str) -> bool {
        self.cache.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        info!("Cache cleared");
    }

    /// Drop every key from memory and disk. The cache goes with it.
    pub fn clear_storage(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock();
        self.store.clear();
        self.cache.lock().clear();
        info!("Storage cleared");
        self.write_snapshot()
    }

    /// Write the current map to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock();
        self.write_snapshot()
    }

    /// Hold the mutation lock as a long snapshot would
    #[cfg(test)]
    pub(crate) fn hold_writer(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.writer.lock()
    }

    pub fn stats(&self) -> StorageStats {
        let cache = self.cache.lock();
        StorageStats {
            keys: self.store.len(),
            cached_keys: cache.len(),
            cache_policy: cache.policy(),
            cache_capacity: cache.capacity(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            storage_hits: self.counters.storage_hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            snapshots_written: self.counters.snapshots_written.load(Ordering::Relaxed),
        }
    }

    /// Caller must hold `writer`.
    fn write_snapshot(&self) -> Result<(), StorageError> {
        let dir = self.dir.read().clone();
        let path = dir.join(STORAGE_FILE);
        let tmp = dir.join(format!("{}.tmp", STORAGE_FILE));

        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            for entry in self.store.iter() {
                writeln!(writer, "{},{}", entry.key(), entry.value())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        self.counters
            .snapshots_written
            .fetch_add(1, Ordering::Relaxed);
        debug!("Storage data saved to {}", path.display());
        Ok(())
    }
}

fn validate_dir(dir: &Path) -> Result<PathBuf, StorageError> {
    if dir.is_dir() {
        Ok(dir.to_path_buf())
    } else {
        Err(StorageError::InvalidStorageDir(dir.to_path_buf()))
    }
}

/// Read `key,value` lines into `store`, creating the file when missing.
/// Lines without exactly two fields are skipped.
fn load_snapshot(path: &Path, store: &DashMap<String, String>) -> Result<(), StorageError> {
    if !path.exists() {
        OpenOptions::new().create(true).append(true).open(path)?;
        info!("Created new {} file", path.display());
        return Ok(());
    }

    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() == 2 {
            store.insert(parts[0].to_string(), parts[1].to_string());
        } else if !line.is_empty() {
            warn!("Skipping malformed storage line: {}", line);
        }
    }

    info!("Loaded data from {} file", path.display());
    Ok(())
}

// Storage tests are in test.rs
#[cfg(test)]
mod test;
