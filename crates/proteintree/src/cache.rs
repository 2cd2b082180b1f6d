//! Two tier cache of recently resolved peptide queries
//!
//! Queries that resolve quickly land in the "fast" tier, queries that took
//! longer than a threshold land in the "slow" tier, so that a burst of cheap
//! lookups cannot push out results that are expensive to recompute. Both tiers
//! evict in insertion order only: a hit does not refresh an entry.

use crate::matching::{MatchingType, ProteinMapping};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub peptide: String,
    pub matching_type: MatchingType,
    // f64 bits, so that the key can be hashed
    tolerance: Option<u64>,
}

impl QueryKey {
    pub fn new(peptide: &str, matching_type: MatchingType, tolerance: Option<f64>) -> Self {
        QueryKey {
            peptide: peptide.into(),
            matching_type,
            tolerance: tolerance.map(|t| (t + 0.0).to_bits()),
        }
    }

    pub fn tolerance(&self) -> Option<f64> {
        self.tolerance.map(f64::from_bits)
    }

    fn parameters(&self) -> (MatchingType, Option<u64>) {
        (self.matching_type, self.tolerance)
    }
}

/// A bounded map evicting its oldest insertion on overflow
#[derive(Debug)]
pub struct FifoCache<K, V> {
    capacity: usize,
    map: FnvHashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Hash + Eq + Clone, V> FifoCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        FifoCache {
            capacity,
            map: FnvHashMap::default(),
            order: VecDeque::with_capacity(capacity.min(1 << 16)),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Insert a value. Replacing the value of a cached key keeps its
    /// original position in the eviction order.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.map.get_mut(&key) {
            *existing = value;
            return;
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
        self.evict();
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict();
    }

    fn evict(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fast_hits: usize,
    pub slow_hits: usize,
    pub misses: usize,
}

impl CacheStats {
    pub fn hits(&self) -> usize {
        self.fast_hits + self.slow_hits
    }
}

struct Tiers {
    fast: FifoCache<QueryKey, Arc<ProteinMapping>>,
    slow: FifoCache<QueryKey, Arc<ProteinMapping>>,
    /// Matching parameters the cached entries were computed with
    parameters: Option<(MatchingType, Option<u64>)>,
    stats: CacheStats,
}

impl Tiers {
    fn clear(&mut self) {
        self.fast.clear();
        self.slow.clear();
    }
}

pub struct QueryCache {
    tiers: Mutex<Tiers>,
    threshold: Duration,
}

impl QueryCache {
    pub fn new(capacity: usize, threshold: Duration) -> Self {
        QueryCache {
            tiers: Mutex::new(Tiers {
                fast: FifoCache::new(capacity),
                slow: FifoCache::new(capacity),
                parameters: None,
                stats: CacheStats::default(),
            }),
            threshold,
        }
    }

    /// Look `key` up in both tiers. A change of matching type or tolerance
    /// since the last lookup empties the cache first.
    pub fn get(&self, key: &QueryKey) -> Option<Arc<ProteinMapping>> {
        let mut tiers = self.tiers.lock();
        if tiers.parameters != Some(key.parameters()) {
            if tiers.parameters.is_some() {
                log::trace!("matching parameters changed, emptying query cache");
            }
            tiers.clear();
            tiers.parameters = Some(key.parameters());
        }

        if let Some(hit) = tiers.fast.get(key).cloned() {
            tiers.stats.fast_hits += 1;
            return Some(hit);
        }
        if let Some(hit) = tiers.slow.get(key).cloned() {
            tiers.stats.slow_hits += 1;
            return Some(hit);
        }
        tiers.stats.misses += 1;
        None
    }

    /// Store a freshly resolved query, in the slow tier if resolving it took
    /// longer than the threshold
    pub fn insert(&self, key: QueryKey, mapping: Arc<ProteinMapping>, elapsed: Duration) {
        let mut tiers = self.tiers.lock();
        if tiers.parameters != Some(key.parameters()) {
            // Another thread switched parameters while this query resolved
            return;
        }
        if elapsed > self.threshold {
            tiers.slow.insert(key, mapping);
        } else {
            tiers.fast.insert(key, mapping);
        }
    }

    pub fn clear(&self) {
        self.tiers.lock().clear();
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut tiers = self.tiers.lock();
        tiers.fast.set_capacity(capacity);
        tiers.slow.set_capacity(capacity);
    }

    /// Number of entries in the (fast, slow) tiers
    pub fn len(&self) -> (usize, usize) {
        let tiers = self.tiers.lock();
        (tiers.fast.len(), tiers.slow.len())
    }

    pub fn stats(&self) -> CacheStats {
        self.tiers.lock().stats
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fifo_eviction() {
        let mut cache = FifoCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Reading does not protect an entry from eviction
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.insert("c", 3);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));

        // Replacing keeps the original slot
        cache.insert("b", 20);
        cache.insert("d", 4);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.len(), 2);

        cache.set_capacity(1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"d"), Some(&4));
    }

    #[test]
    fn zero_capacity() {
        let mut cache = FifoCache::new(0);
        cache.insert(1, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn tiers() {
        let cache = QueryCache::new(10, Duration::from_millis(50));
        let fast = QueryKey::new("PEPTIDE", MatchingType::Exact, None);
        let slow = QueryKey::new("PEPTIDES", MatchingType::Exact, None);

        assert!(cache.get(&fast).is_none());
        cache.insert(fast.clone(), Arc::default(), Duration::from_millis(1));
        assert!(cache.get(&slow).is_none());
        cache.insert(slow.clone(), Arc::default(), Duration::from_millis(51));
        assert_eq!(cache.len(), (1, 1));

        assert!(cache.get(&fast).is_some());
        assert!(cache.get(&slow).is_some());
        assert_eq!(
            cache.stats(),
            CacheStats {
                fast_hits: 1,
                slow_hits: 1,
                misses: 2
            }
        );
    }

    #[test]
    fn parameter_change_invalidates() {
        let cache = QueryCache::new(10, Duration::from_millis(50));
        let exact = QueryKey::new("PEPTIDE", MatchingType::Exact, None);
        assert!(cache.get(&exact).is_none());
        cache.insert(exact.clone(), Arc::default(), Duration::ZERO);

        let tolerant = QueryKey::new("PEPTIDE", MatchingType::Indistinguishable, Some(0.02));
        assert!(cache.get(&tolerant).is_none());
        assert_eq!(cache.len(), (0, 0));

        // Switching back does not resurrect the old entry
        assert!(cache.get(&exact).is_none());
        assert_eq!(tolerant.tolerance(), Some(0.02));
    }

    #[test]
    fn signed_zero_tolerance() {
        let cache = QueryCache::new(10, Duration::from_millis(50));
        let positive = QueryKey::new("PEPTIDE", MatchingType::Indistinguishable, Some(0.0));
        let negative = QueryKey::new("PEPTIDE", MatchingType::Indistinguishable, Some(-0.0));
        assert_eq!(positive, negative);
        assert!(negative.tolerance().unwrap().is_sign_positive());

        assert!(cache.get(&positive).is_none());
        cache.insert(positive, Arc::default(), Duration::ZERO);
        assert!(cache.get(&negative).is_some());
        assert_eq!(cache.len(), (1, 0));
    }
}
