use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::storage::StorageClient;

#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    fetched_at: Instant,
}

/// Presigned GET URLs for private photos, reused until `refresh_after` old.
/// Stale entries are replaced on their next lookup.
pub struct SignedUrlCache {
    storage: Arc<dyn StorageClient>,
    ttl: Duration,
    refresh_after: Duration,
    entries: Mutex<HashMap<String, CachedUrl>>,
}

impl SignedUrlCache {
    pub fn new(storage: Arc<dyn StorageClient>, ttl: Duration, refresh_after: Duration) -> Self {
        Self {
            storage,
            ttl,
            refresh_after: refresh_after.min(ttl),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a displayable URL for `path`, or `None` when signing fails.
    pub async fn get_signed_url(&self, path: &str) -> Option<String> {
        if let Some(url) = self.lookup(path) {
            debug!(%path, "signed url cache hit");
            return Some(url);
        }

        match self.storage.presign_get(path, self.ttl.as_secs()).await {
            Ok(url) => {
                self.store(path, url.clone());
                debug!(%path, "signed url cache miss, presigned");
                Some(url)
            }
            Err(e) => {
                warn!(error = %e, %path, "presign failed");
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let dropped = entries.len();
            entries.clear();
            debug!(dropped, "signed url cache cleared");
        }
    }

    /// Drop one path, e.g. after its object was deleted.
    pub fn forget(&self, path: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(path);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, path: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(path)?;
        (cached.fetched_at.elapsed() < self.refresh_after).then(|| cached.url.clone())
    }

    fn store(&self, path: &str, url: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                path.to_string(),
                CachedUrl {
                    url,
                    fetched_at: Instant::now(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FakeStorage;

    fn cache_with(storage: Arc<FakeStorage>) -> SignedUrlCache {
        SignedUrlCache::new(
            storage as Arc<dyn StorageClient>,
            Duration::from_secs(3600),
            Duration::from_secs(3000),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_within_window_is_a_hit() {
        let storage = Arc::new(FakeStorage::new());
        let cache = cache_with(storage.clone());

        let first = cache.get_signed_url("a.webp").await.unwrap();
        tokio::time::advance(Duration::from_secs(2999)).await;
        let second = cache.get_signed_url("a.webp").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.presign_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn call_after_window_resigns() {
        let storage = Arc::new(FakeStorage::new());
        let cache = cache_with(storage.clone());

        let first = cache.get_signed_url("a.webp").await.unwrap();
        tokio::time::advance(Duration::from_secs(3000)).await;
        let second = cache.get_signed_url("a.webp").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(storage.presign_calls(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failure_returns_none_and_caches_nothing() {
        let storage = Arc::new(FakeStorage::new());
        storage.set_fail_presign(true);
        let cache = cache_with(storage.clone());

        assert!(cache.get_signed_url("a.webp").await.is_none());
        assert!(cache.is_empty());

        storage.set_fail_presign(false);
        assert!(cache.get_signed_url("a.webp").await.is_some());
    }

    #[tokio::test]
    async fn clear_forces_new_signature() {
        let storage = Arc::new(FakeStorage::new());
        let cache = cache_with(storage.clone());

        cache.get_signed_url("a.webp").await.unwrap();
        cache.get_signed_url("b.webp").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        cache.get_signed_url("a.webp").await.unwrap();
        assert_eq!(storage.presign_calls(), 3);
    }

    #[test]
    fn refresh_window_is_capped_by_ttl() {
        let cache = SignedUrlCache::new(
            Arc::new(FakeStorage::new()),
            Duration::from_secs(10),
            Duration::from_secs(20),
        );
        assert_eq!(cache.refresh_after, Duration::from_secs(10));
    }
}
