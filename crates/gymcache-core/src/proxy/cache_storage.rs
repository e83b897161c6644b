use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::request::cache_key;
use super::{ProxyResponse, ResponseSource};

type NamedCache = HashMap<String, ProxyResponse>;

#[derive(Debug, Default)]
struct Caches {
    named: BTreeMap<String, NamedCache>,
    /// Bumped on every delete or clear.
    epoch: u64,
}

/// Origin-scoped set of named response caches.
///
/// Owned by the proxy side only. Every worker version of the origin sees
/// the same storage, which is what lets activation find and delete the
/// partitions of older builds.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<Caches>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all existing caches.
    pub async fn keys(&self) -> Vec<String> {
        self.caches.read().await.named.keys().cloned().collect()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.named.contains_key(name)
    }

    /// Current deletion epoch. Pass it to [`put_since`](Self::put_since)
    /// to drop writes that started before a delete or clear.
    pub async fn epoch(&self) -> u64 {
        self.caches.read().await.epoch
    }

    /// Create the named cache if it does not exist yet.
    pub async fn open(&self, name: &str) {
        self.caches.write().await.named.entry(name.to_string()).or_default();
    }

    /// Returns whether a cache was deleted.
    pub async fn delete(&self, name: &str) -> bool {
        let mut caches = self.caches.write().await;
        caches.epoch += 1;
        let removed = caches.named.remove(name).is_some();
        if removed {
            debug!(cache = name, "Cache deleted");
        }
        removed
    }

    /// Delete every cache, returning how many existed.
    pub async fn clear(&self) -> usize {
        let mut caches = self.caches.write().await;
        caches.epoch += 1;
        let count = caches.named.len();
        caches.named.clear();
        count
    }

    pub async fn put(&self, name: &str, url: &Url, response: ProxyResponse) {
        let mut caches = self.caches.write().await;
        caches
            .named
            .entry(name.to_string())
            .or_default()
            .insert(cache_key(url), response.from_source(ResponseSource::Network));
    }

    /// Like [`put`](Self::put), but only if nothing was deleted since
    /// `epoch`. Returns whether the entry was stored.
    pub async fn put_since(&self, epoch: u64, name: &str, url: &Url, response: ProxyResponse) -> bool {
        let mut caches = self.caches.write().await;
        if caches.epoch != epoch {
            debug!(cache = name, url = %url, "Dropping write that predates a cache delete");
            return false;
        }
        caches
            .named
            .entry(name.to_string())
            .or_default()
            .insert(cache_key(url), response.from_source(ResponseSource::Network));
        true
    }

    /// Store several entries at once; either all land or none do.
    pub async fn put_all(&self, name: &str, entries: Vec<(Url, ProxyResponse)>) {
        let mut caches = self.caches.write().await;
        let cache = caches.named.entry(name.to_string()).or_default();
        for (url, response) in entries {
            cache.insert(cache_key(&url), response.from_source(ResponseSource::Network));
        }
    }

    /// Look up `url` in one named cache.
    pub async fn match_in(&self, name: &str, url: &Url) -> Option<ProxyResponse> {
        let caches = self.caches.read().await;
        caches
            .named
            .get(name)
            .and_then(|cache| cache.get(&cache_key(url)))
            .map(|response| response.clone().from_source(ResponseSource::Cache))
    }

    /// Look up `url` across all caches.
    pub async fn match_any(&self, url: &Url) -> Option<ProxyResponse> {
        let key = cache_key(url);
        let caches = self.caches.read().await;
        caches
            .named
            .values()
            .find_map(|cache| cache.get(&key))
            .map(|response| response.clone().from_source(ResponseSource::Cache))
    }

    pub async fn entry_count(&self, name: &str) -> usize {
        self.caches
            .read()
            .await
            .named
            .get(name)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}
