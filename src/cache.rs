//! Two-tier cache manager (§4.7) — an in-process LRU in front of an on-disk
//! JSON file, keyed by the normalized signature's cache key plus the
//! resolution root.
//!
//! Tier 1 (runtime) answers repeat lookups within a process without touching
//! disk. Tier 2 (persistent) survives process restarts; it is read once at
//! startup and rewritten whenever a new resolution is recorded.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::CacheConfig;
use crate::exports::AccessDescriptor;

/// One resolved signature -> file mapping, as stored in both cache tiers
/// (§4.7: path relative to root, access descriptor, score, timestamp, mtime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub rel_path: String,
    pub access: AccessDescriptor,
    pub score: i64,
    /// Unix seconds at the time this record was written.
    pub cached_at: u64,
    /// The target file's mtime (unix seconds) when last resolved, used to
    /// detect an on-disk change cheaply without a full rescan.
    pub mtime: Option<u64>,
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// The persistent tier's on-disk shape: a flat map from cache key to record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCache {
    #[serde(default)]
    entries: HashMap<String, ResolutionRecord>,
}

struct Inner {
    runtime: LruCache<String, ResolutionRecord>,
    persisted: PersistedCache,
    /// Bounded set of file names whose content has been loaded this session,
    /// so repeated lookups for the same signature during one scan don't
    /// re-stat/re-read files already ruled out. Capacity 100 (§4.7); the
    /// oldest half is evicted on overflow rather than a strict LRU, matching
    /// the "tracked loaded files" bookkeeping described in §4.7.
    tracked_loaded_files: Vec<String>,
}

/// Owns both cache tiers for one discovery root. One instance per
/// [`crate::engine::Engine`] (§3's per-root-path ownership invariant).
pub struct CacheManager {
    config: CacheConfig,
    cache_file: PathBuf,
    inner: Mutex<Inner>,
}

const TRACKED_FILES_CAPACITY: usize = 100;
const RUNTIME_CAPACITY: usize = 200;

impl CacheManager {
    pub fn new(config: CacheConfig, root: &Path) -> Self {
        let cache_file = root.join(&config.file);
        let runtime = LruCache::new(NonZeroUsize::new(RUNTIME_CAPACITY).unwrap());
        CacheManager {
            config,
            cache_file,
            inner: Mutex::new(Inner {
                runtime,
                persisted: PersistedCache::default(),
                tracked_loaded_files: Vec::new(),
            }),
        }
    }

    /// Load the persistent tier from disk, if present. Missing or corrupt
    /// cache files are treated as "start empty" — a bad cache file must never
    /// fail discovery (§4.7).
    pub async fn load(&self) {
        if !self.config.enabled {
            return;
        }
        match tokio::fs::read_to_string(&self.cache_file).await {
            Ok(content) => match serde_json::from_str::<PersistedCache>(&content) {
                Ok(persisted) => {
                    self.inner.lock().await.persisted = persisted;
                }
                Err(err) => {
                    if self.config.log_warnings {
                        warn!(path = %self.cache_file.display(), error = %err, "cache file is corrupt, ignoring");
                    }
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                if self.config.log_warnings {
                    warn!(path = %self.cache_file.display(), error = %err, "could not read cache file");
                }
            }
        }
    }

    fn is_expired(&self, record: &ResolutionRecord) -> bool {
        if self.config.ttl == 0 {
            return false;
        }
        now_unix().saturating_sub(record.cached_at) > self.config.ttl
    }

    /// Look up a previously resolved signature. Runtime tier is checked
    /// first; a persistent-tier hit is promoted into the runtime tier.
    pub async fn get(&self, key: &str) -> Option<ResolutionRecord> {
        if !self.config.enabled {
            return None;
        }
        let mut guard = self.inner.lock().await;

        if let Some(record) = guard.runtime.get(key).cloned() {
            if self.is_expired(&record) {
                guard.runtime.pop(key);
            } else {
                return Some(record);
            }
        }

        if let Some(record) = guard.persisted.entries.get(key).cloned() {
            if self.is_expired(&record) {
                guard.persisted.entries.remove(key);
                return None;
            }
            guard.runtime.put(key.to_string(), record.clone());
            return Some(record);
        }

        None
    }

    /// Record a freshly resolved signature in both tiers and flush the
    /// persistent tier to disk.
    pub async fn put(&self, key: String, rel_path: String, access: AccessDescriptor, score: i64, mtime: Option<u64>) {
        if !self.config.enabled {
            return;
        }
        let record = ResolutionRecord { rel_path, access, score, cached_at: now_unix(), mtime };
        {
            let mut guard = self.inner.lock().await;
            guard.runtime.put(key.clone(), record.clone());
            guard.persisted.entries.insert(key, record);
        }
        self.flush().await;
    }

    /// Drop a specific record from both tiers (used when a cached resolution
    /// is found to be stale, e.g. the target file no longer exists).
    pub async fn invalidate(&self, key: &str) {
        let mut guard = self.inner.lock().await;
        guard.runtime.pop(key);
        guard.persisted.entries.remove(key);
        drop(guard);
        self.flush().await;
    }

    /// Clear both tiers entirely (the public `clearCache` operation, §4.7).
    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        guard.runtime.clear();
        guard.persisted.entries.clear();
        guard.tracked_loaded_files.clear();
        drop(guard);
        self.flush().await;
    }

    async fn flush(&self) {
        if !self.config.enabled {
            return;
        }
        let guard = self.inner.lock().await;
        let serialized = match serde_json::to_string_pretty(&guard.persisted) {
            Ok(s) => s,
            Err(err) => {
                if self.config.log_warnings {
                    warn!(error = %err, "failed to serialize cache, skipping flush");
                }
                return;
            }
        };
        drop(guard);
        if let Err(err) = tokio::fs::write(&self.cache_file, serialized).await {
            if self.config.log_warnings {
                warn!(path = %self.cache_file.display(), error = %err, "failed to write cache file");
            }
        }
    }

    /// Record that `file_name`'s content has been read during this scan,
    /// evicting the oldest half of the tracked set when it overflows
    /// capacity (§4.7).
    pub async fn track_loaded_file(&self, file_name: &str) {
        let mut guard = self.inner.lock().await;
        if guard.tracked_loaded_files.iter().any(|f| f == file_name) {
            return;
        }
        if guard.tracked_loaded_files.len() >= TRACKED_FILES_CAPACITY {
            let half = guard.tracked_loaded_files.len() / 2;
            guard.tracked_loaded_files.drain(0..half);
        }
        guard.tracked_loaded_files.push(file_name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig { enabled: true, file: ".discovery-cache.json".to_string(), ttl: 0, log_warnings: false }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(config(), dir.path());
        cache.load().await;
        cache.put("key-a".to_string(), "src/Foo.ts".to_string(), AccessDescriptor::Direct, 42, None).await;

        let record = cache.get("key-a").await.expect("should be cached");
        assert_eq!(record.rel_path, "src/Foo.ts");
        assert_eq!(record.score, 42);
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = CacheManager::new(config(), dir.path());
            cache.load().await;
            cache.put("key-b".to_string(), "src/Bar.ts".to_string(), AccessDescriptor::Default, 10, None).await;
        }
        let reloaded = CacheManager::new(config(), dir.path());
        reloaded.load().await;
        let record = reloaded.get("key-b").await.expect("should survive reload");
        assert_eq!(record.rel_path, "src/Bar.ts");
    }

    #[tokio::test]
    async fn ttl_zero_never_expires() {
        let mut cfg = config();
        cfg.ttl = 0;
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(cfg, dir.path());
        cache.load().await;
        cache.put("key-c".to_string(), "src/Baz.ts".to_string(), AccessDescriptor::Named("Baz".to_string()), 1, Some(123)).await;
        assert!(cache.get("key-c").await.is_some());
    }

    #[tokio::test]
    async fn clear_empties_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(config(), dir.path());
        cache.load().await;
        cache.put("key-d".to_string(), "src/Qux.ts".to_string(), AccessDescriptor::Direct, 5, None).await;
        cache.clear().await;
        assert!(cache.get("key-d").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_ignored_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(".discovery-cache.json"), "{ not valid json").await.unwrap();
        let cache = CacheManager::new(config(), dir.path());
        cache.load().await; // must not panic
        assert!(cache.get("anything").await.is_none());
    }
}
