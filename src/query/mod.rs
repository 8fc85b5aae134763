//! Cache of fetched reads, keyed by query.
//!
//! Values are stored as JSON so one store serves every record type.
//! Snapshot lists and diffs are additionally indexed per resource, so the
//! restore cascade is a direct lookup instead of a scan over all keys.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::ClientError;
use crate::models::CacheResource;

/// Reads younger than this are served from the cache.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Project,
    LockStatus,
    Config,
    CacheList(CacheResource),
    CacheDiff {
        resource: CacheResource,
        revision_id: String,
    },
}

impl QueryKey {
    pub fn cache_diff(resource: CacheResource, revision_id: impl Into<String>) -> Self {
        QueryKey::CacheDiff {
            resource,
            revision_id: revision_id.into(),
        }
    }

    fn resource(&self) -> Option<CacheResource> {
        match self {
            QueryKey::CacheList(resource) | QueryKey::CacheDiff { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve a fresh cached value, fetch otherwise
    CacheFirst { stale_time: Duration },
    /// Always fetch; the result still replaces the cached value
    Always,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy::CacheFirst {
            stale_time: DEFAULT_STALE_TIME,
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: serde_json::Value,
    fetched_at: Instant,
    stale: bool,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    by_resource: HashMap<CacheResource, HashSet<QueryKey>>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read through the cache.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        policy: FetchPolicy,
        fetcher: F,
    ) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if let FetchPolicy::CacheFirst { stale_time } = policy {
            if let Some(value) = self.get_fresh(&key, stale_time) {
                tracing::debug!("Query cache hit for {:?}", key);
                return Ok(value);
            }
        }

        let value = fetcher().await?;
        self.set(key, &value)?;
        Ok(value)
    }

    fn get_fresh<T: DeserializeOwned>(&self, key: &QueryKey, stale_time: Duration) -> Option<T> {
        let inner = self.lock();
        let entry = inner.entries.get(key)?;
        if entry.stale || entry.fetched_at.elapsed() >= stale_time {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Last stored value, stale or not.
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let inner = self.lock();
        let entry = inner.entries.get(key)?;
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<(), ClientError> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.lock();
        if let Some(resource) = key.resource() {
            inner.by_resource.entry(resource).or_default().insert(key.clone());
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
                stale: false,
            },
        );
        Ok(())
    }

    /// `Some(true)` if the key is cached and invalidated.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.lock().entries.get(key).map(|entry| entry.stale)
    }

    /// Mark one query stale. Returns whether it was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        match self.lock().entries.get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Every cached diff key of a resource.
    pub fn diff_keys(&self, resource: CacheResource) -> Vec<QueryKey> {
        self.lock()
            .by_resource
            .get(&resource)
            .map(|keys| {
                keys.iter()
                    .filter(|key| matches!(key, QueryKey::CacheDiff { .. }))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark every diff of `resource` stale. Returns how many were cached.
    pub fn invalidate_resource_diffs(&self, resource: CacheResource) -> usize {
        let keys = self.diff_keys(resource);
        let mut inner = self.lock();
        let mut count = 0;
        for key in keys {
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.stale = true;
                count += 1;
            }
        }
        tracing::debug!("Invalidated {} diff(s) of {}", count, resource);
        count
    }

    /// Mark everything stale.
    pub fn invalidate_all(&self) -> usize {
        let mut inner = self.lock();
        for entry in inner.entries.values_mut() {
            entry.stale = true;
        }
        inner.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_cache_first_serves_fresh_value() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: String = cache
                .fetch(QueryKey::Config, FetchPolicy::default(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("config".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "config");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&QueryKey::Config);
        let _: String = cache
            .fetch(QueryKey::Config, FetchPolicy::default(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("config".to_string())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.is_stale(&QueryKey::Config), Some(false));
    }

    #[tokio::test]
    async fn test_always_policy_refetches() {
        let cache = QueryCache::new();
        let key = QueryKey::cache_diff(CacheResource::Config, "rev-1");
        cache.set(key.clone(), &vec![1]).unwrap();

        let value: Vec<i32> = cache
            .fetch(key.clone(), FetchPolicy::Always, || async { Ok(vec![2]) })
            .await
            .unwrap();
        assert_eq!(value, vec![2]);
        assert_eq!(cache.get::<Vec<i32>>(&key), Some(vec![2]));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_value() {
        let cache = QueryCache::new();
        cache.set(QueryKey::LockStatus, &true).unwrap();
        cache.invalidate(&QueryKey::LockStatus);

        let result: Result<bool, _> = cache
            .fetch(QueryKey::LockStatus, FetchPolicy::default(), || async {
                Err(ClientError::Transport("down".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.get::<bool>(&QueryKey::LockStatus), Some(true));
        assert_eq!(cache.is_stale(&QueryKey::LockStatus), Some(true));
    }

    #[test]
    fn test_resource_diff_invalidation_is_scoped() {
        let cache = QueryCache::new();
        let config_a = QueryKey::cache_diff(CacheResource::Config, "a");
        let config_b = QueryKey::cache_diff(CacheResource::Config, "b");
        let mappings_a = QueryKey::cache_diff(CacheResource::Mappings, "a");
        let config_list = QueryKey::CacheList(CacheResource::Config);

        for key in [&config_a, &config_b, &mappings_a, &config_list] {
            cache.set(key.clone(), &Vec::<String>::new()).unwrap();
        }

        assert_eq!(cache.diff_keys(CacheResource::Config).len(), 2);
        assert_eq!(cache.invalidate_resource_diffs(CacheResource::Config), 2);

        assert_eq!(cache.is_stale(&config_a), Some(true));
        assert_eq!(cache.is_stale(&config_b), Some(true));
        assert_eq!(cache.is_stale(&mappings_a), Some(false));
        assert_eq!(cache.is_stale(&config_list), Some(false));
    }

    #[test]
    fn test_invalidate_all() {
        let cache = QueryCache::new();
        cache.set(QueryKey::Project, &1).unwrap();
        cache.set(QueryKey::LockStatus, &2).unwrap();

        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(cache.is_stale(&QueryKey::Project), Some(true));
        assert!(!cache.invalidate(&QueryKey::Config));
        assert_eq!(cache.is_stale(&QueryKey::Config), None);
    }
}
