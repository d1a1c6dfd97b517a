//! LRU result cache with time-to-live expiry.
//!
//! [`ResultCache`] stores serialized simulator results keyed by
//! [`CacheKey`], a digest of `(simulation_id, canonical parameters)`.
//! Capacity is bounded: inserting a new key into a full cache evicts the
//! least-recently-used entries first. Entries also expire a fixed time
//! after insertion; an expired entry is removed the moment a lookup finds
//! it, and [`ResultCache::cleanup_expired`] sweeps the rest.
//!
//! All operations take a single short-lived lock and do no I/O under it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use simgate_types::ParameterSet;
use tokio::time::Instant;
use tracing::debug;

/// Cache key: a 128-bit digest of the simulation id and canonical
/// parameters, plus the simulation id it was derived from.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    sim_id: Arc<str>,
    digest: [u8; 16],
}

impl CacheKey {
    /// Derive the key for `params` against `sim_id`.
    ///
    /// Parameter sets that are equal as mappings yield equal keys
    /// regardless of the order their entries were supplied in.
    pub fn new(sim_id: &str, params: &ParameterSet) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sim_id.as_bytes());
        hasher.update(b":");
        hasher.update(params.canonical().as_bytes());
        let full = hasher.finalize();

        let mut digest = [0_u8; 16];
        for (dst, src) in digest.iter_mut().zip(full.iter()) {
            *dst = *src;
        }
        Self {
            sim_id: Arc::from(sim_id),
            digest,
        }
    }

    /// Simulation this key belongs to.
    pub fn sim_id(&self) -> &str {
        &self.sim_id
    }

    /// Raw digest bytes.
    pub const fn digest(&self) -> &[u8; 16] {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.digest {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({}:{self})", self.sim_id)
    }
}

/// A stored result with its bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    created_at: Instant,
    access_count: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored (expired ones included until swept).
    pub size: usize,
    /// Capacity.
    pub max_size: usize,
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// `hits / (hits + misses)` as a percentage, two decimals.
    pub hit_rate_percent: f64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Configured time-to-live.
    pub ttl_seconds: u64,
}

struct CacheInner<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe LRU cache with TTL expiry.
pub struct ResultCache<V> {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache holding at most `max_size` entries for `ttl` each.
    ///
    /// A zero `max_size` is treated as 1.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            ttl,
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.ttl
    }

    /// Look up a result, promoting it to most-recently-used on a hit.
    ///
    /// An expired entry is deleted and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.peek(key) {
            None => {
                inner.misses = inner.misses.saturating_add(1);
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            inner.entries.pop(key);
            inner.misses = inner.misses.saturating_add(1);
            return None;
        }

        let data = inner.entries.get_mut(key).map(|entry| {
            entry.access_count = entry.access_count.saturating_add(1);
            entry.data.clone()
        });
        inner.hits = inner.hits.saturating_add(1);
        data
    }

    /// Store a result.
    ///
    /// Inserting a new key into a full cache first evicts
    /// least-recently-used entries until there is room. Re-setting an
    /// existing key replaces and promotes it without evicting anything.
    pub fn set(&self, key: CacheKey, data: V) {
        let entry = CacheEntry {
            data,
            created_at: Instant::now(),
            access_count: 0,
        };
        let mut inner = self.lock();

        if !inner.entries.contains(&key) {
            let mut evicted = 0_u64;
            while inner.entries.len() >= self.max_size {
                if inner.entries.pop_lru().is_none() {
                    break;
                }
                evicted = evicted.saturating_add(1);
            }
            if evicted > 0 {
                inner.evictions = inner.evictions.saturating_add(evicted);
                debug!(evicted, "cache evicted least-recently-used entries");
            }
        }
        inner.entries.put(key, entry);
    }

    /// Remove every entry belonging to `sim_id`. Returns how many were
    /// removed.
    pub fn invalidate(&self, sim_id: &str) -> usize {
        let mut inner = self.lock();
        let doomed: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.sim_id() == sim_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        doomed.len()
    }

    /// Remove every expired entry without reordering the survivors.
    /// Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let doomed: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        doomed.len()
    }

    /// Drop all entries. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate_percent: percent(inner.hits, inner.hits.saturating_add(inner.misses)),
            evictions: inner.evictions,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

/// `part / total` as a percentage rounded to two decimals; 0 when
/// `total` is 0.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use proptest::prelude::*;
    use simgate_types::ParamValue;

    use super::*;
    use crate::simulator::{ParamSpec, ParameterSchema};

    fn key(sim: &str, n: i64) -> CacheKey {
        CacheKey::new(sim, &ParameterSet::new().with("n", n))
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_set_returns_value() {
        let cache = ResultCache::new(10, Duration::from_secs(300));
        cache.set(key("rc", 1), "state");
        assert_eq!(cache.get(&key("rc", 1)), Some("state"));
        assert_eq!(cache.get(&key("rc", 2)), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate_percent, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResultCache::new(10, Duration::from_secs(300));
        cache.set(key("rc", 1), 1);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key("rc", 1)), Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&key("rc", 1)), None);
        // The expired entry was deleted by the lookup.
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn least_recently_used_is_evicted() {
        let cache = ResultCache::new(3, Duration::from_secs(300));
        cache.set(key("rc", 1), 1);
        cache.set(key("rc", 2), 2);
        cache.set(key("rc", 3), 3);
        // Touch key 1 so key 2 becomes least recently used.
        assert_eq!(cache.get(&key("rc", 1)), Some(1));
        cache.set(key("rc", 4), 4);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&key("rc", 2)), None);
        assert_eq!(cache.get(&key("rc", 1)), Some(1));
        assert_eq!(cache.get(&key("rc", 3)), Some(3));
        assert_eq!(cache.get(&key("rc", 4)), Some(4));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resetting_existing_key_does_not_evict() {
        let cache = ResultCache::new(2, Duration::from_secs(300));
        cache.set(key("rc", 1), 1);
        cache.set(key("rc", 2), 2);
        cache.set(key("rc", 1), 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("rc", 1)), Some(10));
        assert_eq!(cache.get(&key("rc", 2)), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_only_expired() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.set(key("rc", 1), 1);
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.set(key("rc", 2), 2);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("rc", 2)), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_targets_one_simulation() {
        let cache = ResultCache::new(10, Duration::from_secs(300));
        cache.set(key("rc", 1), 1);
        cache.set(key("rc", 2), 2);
        cache.set(key("dc_motor", 1), 3);

        assert_eq!(cache.invalidate("rc"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("dc_motor", 1)), Some(3));
    }

    #[test]
    fn key_display_is_hex_digest() {
        let k = key("rc", 1);
        let shown = k.to_string();
        assert_eq!(shown.len(), 32);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(k.sim_id(), "rc");
    }

    #[test]
    fn percent_rounds_to_two_decimals() {
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(0, 0), 0.0);
    }

    fn scalar() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            any::<bool>().prop_map(ParamValue::from),
            any::<i64>().prop_map(ParamValue::from),
            (-1e6_f64..1e6).prop_map(ParamValue::from),
            "[a-z]{0,8}".prop_map(ParamValue::from),
        ]
    }

    /// Any scalar a client can send, floats across their whole finite
    /// range.
    fn any_scalar() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            any::<i64>().prop_map(ParamValue::from),
            any::<f64>().prop_filter("finite", |v| v.is_finite()).prop_map(ParamValue::from),
            ".*".prop_map(ParamValue::from),
            any::<bool>().prop_map(ParamValue::from),
        ]
    }

    /// A different value of the same kind. Floats move by one unit in the
    /// last place, the smallest change a client could make.
    fn perturb(value: &ParamValue) -> ParamValue {
        match value {
            ParamValue::Bool(b) => ParamValue::Bool(!b),
            ParamValue::Int(i) => ParamValue::Int(i.wrapping_add(1)),
            ParamValue::Float(f) => ParamValue::Float(f64::from_bits(f.to_bits() ^ 1)),
            ParamValue::Text(t) => ParamValue::Text(format!("{t}x")),
        }
    }

    #[test]
    fn int_and_float_keys_follow_canonical_form() {
        let as_int = ParameterSet::new().with("freq", 1);
        let as_float = ParameterSet::new().with("freq", 1.0);
        // Raw sets keep the client's numeric type.
        assert_ne!(as_int.canonical(), as_float.canonical());
        assert_ne!(CacheKey::new("rc", &as_int), CacheKey::new("rc", &as_float));

        // A declared slider normalizes both to a float before keying.
        let schema = ParameterSchema::new()
            .param(ParamSpec::slider("freq", "Frequency", 0.0, 10.0, 1.0));
        let int_key = CacheKey::new("rc", &schema.validate(&as_int).unwrap());
        let float_key = CacheKey::new("rc", &schema.validate(&as_float).unwrap());
        assert_eq!(int_key, float_key);
    }

    #[test]
    fn nearby_floats_key_differently() {
        let sum = ParameterSet::new().with("x", 0.1 + 0.2);
        let literal = ParameterSet::new().with("x", 0.3);
        assert_ne!(CacheKey::new("rc", &sum), CacheKey::new("rc", &literal));
        assert_eq!(
            CacheKey::new("rc", &literal),
            CacheKey::new("rc", &ParameterSet::new().with("x", 0.3))
        );
    }

    proptest! {
        #[test]
        fn key_ignores_insertion_order(
            entries in proptest::collection::btree_map("[a-z_]{1,8}", scalar(), 1..8)
        ) {
            let forward: ParameterSet = entries.clone().into_iter().collect();
            let reverse: ParameterSet = entries.into_iter().rev().collect();
            prop_assert_eq!(CacheKey::new("sim", &forward), CacheKey::new("sim", &reverse));
        }

        #[test]
        fn perturbing_one_value_changes_key(
            entries in proptest::collection::btree_map("[a-z_]{1,8}", any_scalar(), 1..8)
        ) {
            let base: ParameterSet = entries.clone().into_iter().collect();
            let (first, value) = entries.iter().next().unwrap();
            let perturbed = base.clone().with(first.clone(), perturb(value));
            prop_assert_ne!(CacheKey::new("sim", &base), CacheKey::new("sim", &perturbed));
            prop_assert_ne!(CacheKey::new("sim", &base), CacheKey::new("other", &base));
        }
    }
}
