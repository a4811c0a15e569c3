use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::fingerprint::Fingerprint;

/// A stored model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub response_payload: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Live while `now - created_at < ttl_seconds`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at).num_seconds();
        age < self.ttl_seconds as i64
    }
}

/// Fingerprint-keyed response store. Expired entries read as misses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<Value>;

    /// Insert or replace the entry for `fingerprint`.
    async fn put(&self, fingerprint: &Fingerprint, payload: Value) -> Result<()>;

    async fn invalidate(&self, fingerprint: &Fingerprint);

    /// Drop every entry. Returns how many were removed.
    async fn clear(&self) -> Result<usize>;
}

// ─── DiskCache ────────────────────────────────────────────────────────────────

/// One JSON file per fingerprint under `dir`.
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Cache(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir, ttl, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.as_str()))
    }
}

#[async_trait]
impl CacheStore for DiskCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<Value> {
        let path = self.entry_path(fingerprint);
        let data = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };
        if !entry.is_live(self.clock.now()) {
            debug!(fingerprint = fingerprint.short(), "cache entry expired");
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.response_payload)
    }

    async fn put(&self, fingerprint: &Fingerprint, payload: Value) -> Result<()> {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            response_payload: payload,
            created_at: self.clock.now(),
            ttl_seconds: self.ttl.as_secs(),
        };
        let data = serde_json::to_vec(&entry).map_err(|e| EngineError::Cache(e.to_string()))?;

        // Write-then-rename so readers never see a half-written entry.
        let path = self.entry_path(fingerprint);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| EngineError::Cache(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::Cache(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) {
        let _ = tokio::fs::remove_file(self.entry_path(fingerprint)).await;
    }

    async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| EngineError::Cache(format!("{}: {e}", self.dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::Cache(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| EngineError::Cache(format!("{}: {e}", path.display())))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ─── MemoryCache ──────────────────────────────────────────────────────────────

pub struct MemoryCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(fingerprint) {
            Some(entry) if entry.is_live(now) => Some(entry.response_payload.clone()),
            Some(_) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    async fn put(&self, fingerprint: &Fingerprint, payload: Value) -> Result<()> {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            response_payload: payload,
            created_at: self.clock.now(),
            ttl_seconds: self.ttl.as_secs(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fingerprint.clone(), entry);
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(fingerprint);
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::builder("test").text("text", text).finish()
    }

    #[tokio::test]
    async fn disk_cache_put_get() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), clock()).unwrap();
        cache.put(&fp("a"), json!({"title": "A"})).await.unwrap();
        assert_eq!(cache.get(&fp("a")).await, Some(json!({"title": "A"})));
        assert_eq!(cache.get(&fp("b")).await, None);
    }

    #[tokio::test]
    async fn disk_cache_entry_expires_at_ttl() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), clock.clone()).unwrap();
        cache.put(&fp("a"), json!(1)).await.unwrap();

        clock.advance(chrono::Duration::seconds(59));
        assert_eq!(cache.get(&fp("a")).await, Some(json!(1)));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get(&fp("a")).await, None);
        // Expired entries are removed from disk.
        assert!(!dir.path().join(format!("{}.json", fp("a"))).exists());
    }

    #[tokio::test]
    async fn disk_cache_put_replaces_existing_entry() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), clock()).unwrap();
        cache.put(&fp("a"), json!("old")).await.unwrap();
        cache.put(&fp("a"), json!("new")).await.unwrap();
        assert_eq!(cache.get(&fp("a")).await, Some(json!("new")));
    }

    #[tokio::test]
    async fn disk_cache_survives_reopen_and_clears() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        {
            let cache =
                DiskCache::new(dir.path(), Duration::from_secs(60), clock.clone()).unwrap();
            cache.put(&fp("a"), json!(1)).await.unwrap();
            cache.put(&fp("b"), json!(2)).await.unwrap();
        }
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), clock).unwrap();
        assert_eq!(cache.get(&fp("b")).await, Some(json!(2)));
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.get(&fp("a")).await, None);
    }

    #[tokio::test]
    async fn disk_cache_ignores_corrupt_entries() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), clock()).unwrap();
        std::fs::write(dir.path().join(format!("{}.json", fp("a"))), b"{not json").unwrap();
        assert_eq!(cache.get(&fp("a")).await, None);
    }

    #[tokio::test]
    async fn memory_cache_expiry_and_invalidate() {
        let clock = clock();
        let cache = MemoryCache::new(Duration::from_secs(10), clock.clone());
        cache.put(&fp("a"), json!(1)).await.unwrap();
        cache.put(&fp("b"), json!(2)).await.unwrap();

        cache.invalidate(&fp("b")).await;
        assert_eq!(cache.get(&fp("b")).await, None);

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(cache.get(&fp("a")).await, None);
        assert!(cache.entries.lock().unwrap().is_empty());
    }
}
