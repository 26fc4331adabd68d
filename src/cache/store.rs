//! Cache Store Module
//!
//! Thread-safe key/value table whose entries are evicted by an LRU policy
//! combining entry counts with a usage expiration window.

use std::borrow::Borrow;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::cache::policy::Verdict;
use crate::cache::{CacheEntry, CacheStats, EvictionPolicy};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Entry table and the counters updated alongside it.
#[derive(Debug)]
struct Table<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
    next_usage_seq: u64,
}

impl<K, V> Table<K, V> {
    fn next_seq(&mut self) -> u64 {
        self.next_usage_seq += 1;
        self.next_usage_seq
    }
}

// == Eviction Cache ==
/// Cache evicting entries by a configurable Least Recently Used policy.
///
/// Usage is recorded on `get` and `put`. The policy is only applied by
/// [`maintain`](Self::maintain), which `put` calls after every insert, so
/// changing the policy needs an explicit `maintain` to take effect before
/// the next insert.
///
/// Settings:
/// - `max_entries` caps the number of entries, evicting the least recently
///   used ones first
/// - `min_entries` protects that many most recently used entries from any
///   eviction, including usage expiration
/// - `usage_expiration` evicts unprotected entries not used for longer than
///   the given duration
#[derive(Debug)]
pub struct EvictionCache<K, V> {
    /// Entries and statistics
    table: Mutex<Table<K, V>>,
    /// Retention policy, locked separately from the table
    policy: RwLock<EvictionPolicy>,
    /// Source of usage timestamps
    clock: Arc<dyn Clock>,
}

impl<K, V> EvictionCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructors ==
    /// Creates an unbounded cache using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an unbounded cache reading time from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                stats: CacheStats::new(),
                next_usage_seq: 0,
            }),
            policy: RwLock::new(EvictionPolicy::default()),
            clock,
        }
    }

    /// Replaces the policy and returns the cache, for construction chains.
    pub fn with_policy(self, policy: EvictionPolicy) -> Self {
        *self.policy.write() = policy;
        self
    }

    // == Policy ==
    /// Returns a snapshot of the current policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy.read().clone()
    }

    /// Replaces the whole policy at once.
    pub fn set_policy(&self, policy: EvictionPolicy) -> &Self {
        *self.policy.write() = policy;
        self
    }

    /// Sets the number of most recent entries kept regardless of last usage.
    pub fn set_min_entries(&self, min_entries: usize) -> Result<&Self> {
        self.policy.write().set_min_entries(min_entries)?;
        Ok(self)
    }

    /// Sets the maximum number of entries to keep.
    pub fn set_max_entries(&self, max_entries: usize) -> Result<&Self> {
        self.policy.write().set_max_entries(Some(max_entries))?;
        Ok(self)
    }

    /// Removes the entry count limit.
    pub fn clear_max_entries(&self) -> &Self {
        self.policy.write().max_entries = None;
        self
    }

    /// Sets the maximum time since last usage (inclusive) before eviction.
    pub fn set_usage_expiration(&self, usage_expiration: Duration) -> Result<&Self> {
        self.policy
            .write()
            .set_usage_expiration(Some(usage_expiration))?;
        Ok(self)
    }

    /// Disables usage expiration.
    pub fn clear_usage_expiration(&self) -> &Self {
        self.policy.write().usage_expiration = None;
        self
    }

    // == Get ==
    /// Returns the value stored for the key, marking it as used now.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let now = self.clock.now();
        let seq = table.next_seq();

        match table.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now, seq);
                let value = entry.value.clone();
                table.stats.record_hit();
                Some(value)
            }
            None => {
                table.stats.record_miss();
                None
            }
        }
    }

    // == Put ==
    /// Stores the value, then applies the eviction policy.
    ///
    /// Returns the previously stored value. The new entry itself can be
    /// evicted by the same call, e.g. with `max_entries` of zero.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let previous = {
            let mut table = self.table.lock();
            let now = self.clock.now();
            let seq = table.next_seq();
            table
                .entries
                .insert(key, CacheEntry::new(value, now, seq))
                .map(|old| old.value)
        };

        self.maintain();

        previous
    }

    // == Remove ==
    /// Removes the entry for the key, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.lock().entries.remove(key).map(|old| old.value)
    }

    // == Clear ==
    /// Removes all entries.
    pub fn clear(&self) {
        self.table.lock().entries.clear();
    }

    // == Maintain ==
    /// Applies the eviction policy, removing expired or excessive entries.
    ///
    /// Returns the number of evicted entries.
    pub fn maintain(&self) -> usize {
        let policy = self.policy();
        if policy.max_entries.is_none() && policy.usage_expiration.is_none() {
            return 0;
        }

        let mut guard = self.table.lock();
        let table = &mut *guard;
        let now = self.clock.now();

        let mut ranked: Vec<(Duration, Reverse<u64>, K)> = table
            .entries
            .iter()
            .map(|(key, entry)| (entry.age(now), Reverse(entry.usage_seq), key.clone()))
            .collect();
        ranked.sort_by_key(|(age, seq, _)| (*age, *seq));

        let mut evicted = 0;
        for (index, (age, _, key)) in ranked.into_iter().enumerate() {
            match policy.verdict(index, age) {
                Verdict::Keep => continue,
                Verdict::EvictCapacity => table.stats.record_capacity_eviction(),
                Verdict::EvictExpired => table.stats.record_expiration_eviction(),
            }
            table.entries.remove(&key);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                "Maintenance evicted {} entries, {} remaining",
                evicted,
                table.entries.len()
            );
        }

        evicted
    }

    // == Inspection ==
    /// Checks for a key without marking it as used.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.lock().entries.contains_key(key)
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let table = self.table.lock();
        let mut stats = table.stats.clone();
        stats.total_entries = table.entries.len();
        stats
    }

    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }
}

impl<K, V> Default for EvictionCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn manual_cache() -> (Arc<ManualClock>, EvictionCache<String, u32>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = EvictionCache::with_clock(clock.clone());
        (clock, cache)
    }

    fn tick(clock: &ManualClock) {
        clock.advance(Duration::from_millis(1));
    }

    #[test]
    fn test_cache_new() {
        let cache: EvictionCache<String, String> = EvictionCache::new();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.policy(), EvictionPolicy::default());
    }

    #[test]
    fn test_put_and_get() {
        let (_, cache) = manual_cache();

        assert_eq!(cache.put("key1".to_string(), 1), None);

        assert_eq!(cache.get("key1"), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_returns_previous() {
        let (_, cache) = manual_cache();

        cache.put("key1".to_string(), 1);
        let previous = cache.put("key1".to_string(), 2);

        assert_eq!(previous, Some(1));
        assert_eq!(cache.get("key1"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_missing_has_no_side_effects() {
        let (_, cache) = manual_cache();

        assert_eq!(cache.get("missing"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let (_, cache) = manual_cache();

        cache.put("key1".to_string(), 1);

        assert_eq!(cache.remove("key1"), Some(1));
        assert_eq!(cache.remove("key1"), None);
        assert_eq!(cache.get("key1"), None);
    }

    #[test]
    fn test_clear() {
        let (_, cache) = manual_cache();

        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_max_entries_scenario() {
        let (clock, cache) = manual_cache();
        cache.set_max_entries(3).unwrap();

        cache.put("m".to_string(), 200);
        tick(&clock);
        cache.put("z".to_string(), 1);
        tick(&clock);
        cache.put("a".to_string(), 500);
        tick(&clock);
        cache.put("n".to_string(), 100);

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_key("m"));
        assert!(cache.contains_key("z"));
        assert!(cache.contains_key("a"));
        assert!(cache.contains_key("n"));
    }

    #[test]
    fn test_get_refreshes_usage_for_capacity() {
        let (clock, cache) = manual_cache();
        cache.set_max_entries(3).unwrap();

        cache.put("key1".to_string(), 1);
        tick(&clock);
        cache.put("key2".to_string(), 2);
        tick(&clock);
        cache.put("key3".to_string(), 3);
        tick(&clock);

        // key1 becomes most recently used, key2 is now the oldest
        cache.get("key1");
        tick(&clock);
        cache.put("key4".to_string(), 4);

        assert!(cache.contains_key("key1"));
        assert!(!cache.contains_key("key2"));
        assert!(cache.contains_key("key3"));
        assert!(cache.contains_key("key4"));
    }

    #[test]
    fn test_same_instant_prefers_latest_usage() {
        let (_, cache) = manual_cache();
        cache.set_max_entries(2).unwrap();

        cache.put("first".to_string(), 1);
        cache.put("second".to_string(), 2);
        cache.put("third".to_string(), 3);

        assert!(!cache.contains_key("first"));
        assert!(cache.contains_key("second"));
        assert!(cache.contains_key("third"));
    }

    #[test]
    fn test_usage_expiration() {
        let (clock, cache) = manual_cache();
        cache.set_usage_expiration(Duration::from_secs(60)).unwrap();

        cache.put("stale".to_string(), 1);
        cache.put("fresh".to_string(), 2);

        clock.advance(Duration::from_secs(45));
        cache.get("fresh");
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.maintain(), 1);
        assert!(!cache.contains_key("stale"));
        assert!(cache.contains_key("fresh"));
    }

    #[test]
    fn test_expiration_boundary_is_kept() {
        let (clock, cache) = manual_cache();
        cache.set_usage_expiration(Duration::from_secs(60)).unwrap();

        cache.put("key".to_string(), 1);
        clock.advance(Duration::from_secs(60));

        assert_eq!(cache.maintain(), 0);

        clock.advance(Duration::from_millis(1));

        assert_eq!(cache.maintain(), 1);
    }

    #[test]
    fn test_min_entries_protect_expired() {
        let (clock, cache) = manual_cache();
        cache
            .set_usage_expiration(Duration::from_secs(10))
            .unwrap()
            .set_min_entries(2)
            .unwrap();

        cache.put("a".to_string(), 1);
        tick(&clock);
        cache.put("b".to_string(), 2);
        tick(&clock);
        cache.put("c".to_string(), 3);

        clock.advance(Duration::from_secs(3600));

        assert_eq!(cache.maintain(), 1);
        assert!(!cache.contains_key("a"));
        assert!(cache.contains_key("b"));
        assert!(cache.contains_key("c"));
    }

    #[test]
    fn test_put_with_zero_max_evicts_new_entry() {
        let (_, cache) = manual_cache();
        cache.set_max_entries(0).unwrap();

        assert_eq!(cache.put("key".to_string(), 1), None);

        assert!(cache.is_empty());
    }

    #[test]
    fn test_policy_change_needs_maintain() {
        let (clock, cache) = manual_cache();

        for i in 0..5 {
            cache.put(format!("key{}", i), i);
            tick(&clock);
        }

        cache.set_max_entries(2).unwrap();
        assert_eq!(cache.len(), 5);

        assert_eq!(cache.maintain(), 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key("key3"));
        assert!(cache.contains_key("key4"));
    }

    #[test]
    fn test_remove_does_not_maintain() {
        let (clock, cache) = manual_cache();

        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.set_usage_expiration(Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(5));

        cache.remove("a");

        assert!(cache.contains_key("b"));
    }

    #[test]
    fn test_invalid_policy_rejected_without_change() {
        let (_, cache) = manual_cache();
        cache.set_min_entries(3).unwrap();

        assert!(cache.set_max_entries(2).is_err());
        assert!(cache.set_usage_expiration(Duration::ZERO).is_err());
        assert_eq!(cache.policy().max_entries, None);
        assert_eq!(cache.policy().usage_expiration, None);
    }

    #[test]
    fn test_clear_limits() {
        let (_, cache) = manual_cache();
        cache
            .set_max_entries(1)
            .unwrap()
            .set_usage_expiration(Duration::from_secs(1))
            .unwrap();

        cache.clear_max_entries().clear_usage_expiration();

        assert_eq!(cache.policy(), EvictionPolicy::default());
    }

    #[test]
    fn test_stats() {
        let (clock, cache) = manual_cache();
        cache.set_max_entries(1).unwrap();

        cache.put("a".to_string(), 1);
        tick(&clock);
        cache.put("b".to_string(), 2);
        cache.get("b");
        cache.get("a");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.capacity_evictions, 1);
        assert_eq!(stats.expiration_evictions, 0);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache: Arc<EvictionCache<String, usize>> = Arc::new(EvictionCache::new());
        cache.set_max_entries(50).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("{}-{}", worker, i);
                        cache.put(key.clone(), i);
                        cache.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 50);
    }
}
