// Read replica of the (SKU, marketplace) -> master code associations.
// The database stays the source of truth: entries expire on a configurable
// TTL and misses fall through to an exact database lookup in the resolver.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::mapping::normalize::normalize_sku;

struct CacheEntry {
    msku: String,
    inserted_at: Instant,
}

/// Synchronized in-process mapping cache keyed by the normalized SKU and the
/// marketplace name. actix dispatches requests across worker threads, so all
/// access goes through an `RwLock`.
pub struct MappingCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
    ttl: Option<Duration>,
}

impl MappingCache {
    /// `ttl = None` keeps entries until they are explicitly invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn key(sku: &str, marketplace: &str) -> (String, String) {
        (normalize_sku(sku), marketplace.to_string())
    }

    /// Look up the master code for this SKU/marketplace pair. Expired
    /// entries are dropped and reported as misses.
    pub fn get(&self, sku: &str, marketplace: &str) -> Option<String> {
        let key = Self::key(sku, marketplace);
        {
            let entries = self.entries.read().expect("cache lock poisoned");
            match entries.get(&key) {
                Some(entry) if !self.expired(entry) => return Some(entry.msku.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but is stale; evict under the write lock.
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(&key);
        None
    }

    pub fn put(&self, sku: &str, marketplace: &str, msku: &str) {
        self.entries.write().expect("cache lock poisoned").insert(
            Self::key(sku, marketplace),
            CacheEntry {
                msku: msku.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, sku: &str, marketplace: &str) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(&Self::key(sku, marketplace));
    }

    pub fn clear(&self) {
        self.entries.write().expect("cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => entry.inserted_at.elapsed() >= ttl,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_uses_normalized_keys() {
        let cache = MappingCache::new(None);
        cache.put("abc-123", "amazon", "ELE-WIDG-0001");
        assert_eq!(
            cache.get("ABC 123", "amazon").as_deref(),
            Some("ELE-WIDG-0001")
        );
        assert_eq!(cache.get("ABC123", "ebay"), None);
    }

    #[test]
    fn invalidate_removes_one_pair() {
        let cache = MappingCache::new(None);
        cache.put("SKU1", "amazon", "M1");
        cache.put("SKU1", "ebay", "M1");
        cache.invalidate("SKU1", "amazon");
        assert_eq!(cache.get("SKU1", "amazon"), None);
        assert_eq!(cache.get("SKU1", "ebay").as_deref(), Some("M1"));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = MappingCache::new(Some(Duration::ZERO));
        cache.put("SKU1", "amazon", "M1");
        assert_eq!(cache.get("SKU1", "amazon"), None);
        // The stale entry was evicted, not just hidden.
        assert!(cache.is_empty());
    }
}
