use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::RouteSummary;

use super::RoutePairKey;

/// Default number of routes held in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Default time a resolved route stays fresh (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);

/// A resolved route stored in the [`RouteCache`].
///
/// Entries are read-only once inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: RoutePairKey,
    pub route: RouteSummary,
    pub inserted_at: Instant,
}

/// A bounded, time-aware store of resolved routes.
///
/// - The number of entries never exceeds `capacity`. When a new key would overflow it, the
///   oldest *inserted* entry is evicted first. Lookups do not refresh an entry's position, so
///   this is FIFO and not LRU.
/// - An entry whose age reached `ttl` is never returned. Expiry is lazy: the entry is removed
///   by the lookup that finds it stale.
///
/// Putting a key that is already present replaces the entry and moves it to the back of the
/// eviction order, exactly as if it had been removed and inserted fresh.
#[derive(Debug)]
pub struct RouteCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<RoutePairKey, Arc<CacheEntry>>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<RoutePairKey>,
}

impl RouteCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a fresh entry, removing it if its TTL has elapsed.
    pub fn get(&mut self, key: &RoutePairKey) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            return Some(Arc::clone(entry));
        }

        tracing::trace!("Route cache entry `{}` expired", key);
        metric!(counter("routes.cache.expired") += 1);
        self.remove(key);
        None
    }

    /// Inserts a resolved route, evicting the oldest entries if the cache is full.
    pub fn put(&mut self, key: RoutePairKey, route: RouteSummary) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.contains_key(&key) {
            self.remove(&key);
        }

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                tracing::trace!("Evicting route cache entry `{}`", oldest);
                metric!(counter("routes.cache.evicted") += 1);
            }
        }

        let entry = CacheEntry {
            key: key.clone(),
            route,
            inserted_at: Instant::now(),
        };
        self.entries.insert(key.clone(), Arc::new(entry));
        self.order.push_back(key);
    }

    fn remove(&mut self, key: &RoutePairKey) {
        if self.entries.remove(key).is_some() {
            // The order queue is bounded by `capacity`, so a linear scan is fine.
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
        }
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;
    use crate::types::Coordinate;

    fn key(i: u32) -> RoutePairKey {
        let lat = f64::from(i) / 1000.0;
        RoutePairKey::encode(Coordinate::new(lat, -76.6), Coordinate::new(2.45, -76.61))
    }

    fn route(points: usize) -> RouteSummary {
        RouteSummary {
            geometry: (0..points)
                .map(|i| Coordinate::new(2.44 + i as f64 * 0.001, -76.61))
                .collect(),
            distance_km: 5.0,
            duration_min: 10.0,
        }
    }

    #[tokio::test]
    async fn test_ttl_boundaries() {
        time::pause();
        let mut cache = RouteCache::default();
        cache.put(key(1), route(3));

        time::advance(DEFAULT_CACHE_TTL - Duration::from_millis(1)).await;
        let entry = cache.get(&key(1)).expect("entry is still fresh");
        assert_eq!(entry.route, route(3));

        time::advance(Duration::from_millis(2)).await;
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.is_empty());
        assert!(cache.order.is_empty());
    }

    #[tokio::test]
    async fn test_expired_exactly_at_ttl() {
        time::pause();
        let mut cache = RouteCache::new(10, Duration::from_secs(1));
        cache.put(key(1), route(3));

        time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = RouteCache::default();
        for i in 0..=DEFAULT_CACHE_CAPACITY as u32 {
            cache.put(key(i), route(3));
        }

        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);
        assert!(cache.get(&key(0)).is_none());
        for i in 1..=DEFAULT_CACHE_CAPACITY as u32 {
            assert!(cache.get(&key(i)).is_some(), "key {i} should be retained");
        }
    }

    #[test]
    fn test_access_does_not_refresh_order() {
        let mut cache = RouteCache::new(2, DEFAULT_CACHE_TTL);
        cache.put(key(1), route(3));
        cache.put(key(2), route(3));

        // reading the oldest entry must not protect it from eviction
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), route(3));

        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
        assert!(cache.get(&key(3)).is_some());
    }

    #[test]
    fn test_reinsert_counts_as_fresh_insertion() {
        let mut cache = RouteCache::new(2, DEFAULT_CACHE_TTL);
        cache.put(key(1), route(3));
        cache.put(key(2), route(3));
        cache.put(key(1), route(4));

        assert_eq!(cache.len(), 2);
        cache.put(key(3), route(3));

        assert!(cache.get(&key(2)).is_none());
        assert_eq!(cache.get(&key(1)).unwrap().route, route(4));
        assert!(cache.get(&key(3)).is_some());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = RouteCache::new(0, DEFAULT_CACHE_TTL);
        cache.put(key(1), route(3));
        assert!(cache.is_empty());
        assert!(cache.get(&key(1)).is_none());
    }
}
