use crate::services::grouping::ResourceGroup;
use crate::utils::clock::Clock;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Last successful browse result for one filter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBrowse {
    pub stored_at: DateTime<Utc>,
    pub items: Vec<ResourceGroup>,
}

/// Where cached browse results live.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedBrowse>>;
    fn put(&self, key: &str, entry: CachedBrowse) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Every key with its store time, used for eviction.
    fn stamps(&self) -> Result<Vec<(String, DateTime<Utc>)>>;
}

#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, CachedBrowse>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<CachedBrowse>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn put(&self, key: &str, entry: CachedBrowse) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn stamps(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().stored_at))
            .collect())
    }
}

/// Keeps every entry in one JSON document so results survive restarts.
pub struct FileCacheBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCacheBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, CachedBrowse>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read(&self.path)
            .with_context(|| format!("reading browse cache {}", self.path.display()))?;
        if raw.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    fn write_all(&self, entries: &HashMap<String, CachedBrowse>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing browse cache {}", self.path.display()))?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl CacheBackend for FileCacheBackend {
    fn get(&self, key: &str) -> Result<Option<CachedBrowse>> {
        let _guard = self.guard();
        Ok(self.read_all()?.remove(key))
    }

    fn put(&self, key: &str, entry: CachedBrowse) -> Result<()> {
        let _guard = self.guard();
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), entry);
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard();
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }

    fn stamps(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let _guard = self.guard();
        Ok(self
            .read_all()?
            .into_iter()
            .map(|(k, v)| (k, v.stored_at))
            .collect())
    }
}

/// Bounded last-known-good store for browse results. Backend failures are
/// logged and swallowed: the cache never fails a browse.
pub struct BrowseCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl BrowseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            backend,
            clock,
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()), clock, capacity)
    }

    pub fn store(&self, key: &str, items: &[ResourceGroup]) {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let entry = CachedBrowse {
            stored_at: self.clock.now(),
            items: items.to_vec(),
        };
        if let Err(e) = self.backend.put(key, entry) {
            warn!("Failed to cache browse results for {}: {:#}", key, e);
            return;
        }
        if let Err(e) = self.evict_overflow() {
            warn!("Browse cache eviction failed: {:#}", e);
        }
    }

    pub fn last_good(&self, key: &str) -> Option<CachedBrowse> {
        match self.backend.get(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read browse cache for {}: {:#}", key, e);
                None
            }
        }
    }

    fn evict_overflow(&self) -> Result<()> {
        let mut stamps = self.backend.stamps()?;
        if stamps.len() <= self.capacity {
            return Ok(());
        }
        stamps.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let overflow = stamps.len() - self.capacity;
        for (key, _) in stamps.into_iter().take(overflow) {
            debug!("Evicting browse cache entry {}", key);
            self.backend.remove(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;
    use crate::utils::clock::ManualClock;
    use chrono::Duration;

    fn group(title: &str) -> ResourceGroup {
        ResourceGroup {
            file_path: Some(format!("u/{}.pdf", title)),
            title: title.to_string(),
            resource_type: ResourceType::Pyq,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            subject_names: vec!["DBMS".to_string()],
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ))
    }

    #[test]
    fn test_store_and_read_back() {
        let clock = clock();
        let cache = BrowseCache::in_memory(clock.clone(), 4);
        cache.store("k", &[group("a")]);
        let entry = cache.last_good("k").unwrap();
        assert_eq!(entry.items, vec![group("a")]);
        assert_eq!(entry.stored_at, clock.now());
        assert!(cache.last_good("other").is_none());
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let clock = clock();
        let cache = BrowseCache::in_memory(clock.clone(), 2);
        cache.store("first", &[group("a")]);
        clock.advance(Duration::seconds(1));
        cache.store("second", &[group("b")]);
        clock.advance(Duration::seconds(1));
        cache.store("third", &[group("c")]);

        assert!(cache.last_good("first").is_none());
        assert!(cache.last_good("second").is_some());
        assert!(cache.last_good("third").is_some());
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("browse-cache.json");
        let clock = clock();

        let cache = BrowseCache::new(Arc::new(FileCacheBackend::new(&path)), clock.clone(), 8);
        cache.store("k", &[group("a"), group("b")]);
        drop(cache);

        let reopened = BrowseCache::new(Arc::new(FileCacheBackend::new(&path)), clock, 8);
        let entry = reopened.last_good("k").unwrap();
        assert_eq!(entry.items.len(), 2);
        assert_eq!(entry.items[1].title, "b");
    }
}
