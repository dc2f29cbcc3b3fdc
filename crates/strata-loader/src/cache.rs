//! Bounded maps with a swappable eviction policy.
//!
//! The resolution cache set is three of these: a positive URL cache
//! (recency-refreshed), a global negative cache, and one small negative
//! cache per classpath container (both insertion-ordered). Which entry a
//! full cache drops is a performance policy, not a correctness property;
//! callers must stay correct if any entry disappears at any time.

use std::collections::VecDeque;
use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Strategy controlling which entry a full cache drops first.
///
/// The cache evicts the entry at the head of its internal queue; the
/// policy decides whether reads requeue an entry.
pub trait EvictionPolicy: Send {
    /// Whether a successful read moves the entry to the back of the
    /// eviction queue.
    fn refresh_on_access(&self) -> bool;
}

/// Least-recently-used: reads refresh, the coldest entry drops first.
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn refresh_on_access(&self) -> bool {
        true
    }
}

/// Oldest-inserted-first: reads do not refresh.
pub struct FifoPolicy;

impl EvictionPolicy for FifoPolicy {
    fn refresh_on_access(&self) -> bool {
        false
    }
}

/// A bounded map that drops queue-head entries once `capacity` is reached.
///
/// Entries carry a stamp; the queue may hold stale (key, stamp) pairs for
/// refreshed entries, which eviction skips. Not internally synchronized,
/// callers wrap it in a lock.
pub struct BoundedCache<K, V> {
    map: FxHashMap<K, Stamped<V>>,
    queue: VecDeque<(K, u64)>,
    capacity: usize,
    next_stamp: u64,
    policy: Box<dyn EvictionPolicy>,
}

struct Stamped<V> {
    value: V,
    stamp: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    pub fn new(capacity: usize, policy: Box<dyn EvictionPolicy>) -> BoundedCache<K, V> {
        BoundedCache {
            map: FxHashMap::default(),
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            next_stamp: 0,
            policy,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.policy.refresh_on_access() && self.map.contains_key(key) {
            let stamp = self.bump();
            let entry = self.map.get_mut(key).expect("checked above");
            entry.stamp = stamp;
            self.queue.push_back((key.clone(), stamp));
        }
        self.map.get(key).map(|e| &e.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert, evicting from the queue head as needed.
    pub fn insert(&mut self, key: K, value: V) {
        let stamp = self.bump();
        self.map.insert(key.clone(), Stamped { value, stamp });
        self.queue.push_back((key, stamp));
        while self.map.len() > self.capacity {
            match self.queue.pop_front() {
                Some((victim, victim_stamp)) => {
                    // Skip queue entries made stale by a refresh or re-insert.
                    if self
                        .map
                        .get(&victim)
                        .is_some_and(|e| e.stamp == victim_stamp)
                    {
                        self.map.remove(&victim);
                    }
                }
                None => break,
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn bump(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        // Compact the queue if stale pairs have piled up well past the
        // live entry count.
        if self.queue.len() > self.capacity.saturating_mul(4).max(64) {
            let map = &self.map;
            self.queue
                .retain(|(k, s)| map.get(k).is_some_and(|e| e.stamp == *s));
        }
        stamp
    }
}
