//! A thread-safe TTL cache for on-demand reads that sit outside the
//! watch stream (currently: per-pod resource metrics; spec.md §4.4).
//! Not on the critical path of live updates.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// `get_or_compute(key, ttl, producer) -> value`, keyed by a
/// caller-supplied string only (spec.md §9 Open Questions: no
/// kwarg-ordering key composition -- that's left to the caller).
///
/// Eviction is lazy: entries past their TTL are treated as absent on
/// read and recomputed. At-most-one-inflight-per-key is provided via a
/// per-key async lock, a recommended (non-mandatory) refinement over
/// plain lazy recomputation.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    inflight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), inflight: DashMap::new() }
    }

    fn fresh(&self, key: &str) -> Option<V> {
        self.entries.get(key).filter(|entry| entry.expires_at > Instant::now()).map(|entry| entry.value.clone())
    }

    /// Return the cached value for `key` if present and unexpired,
    /// otherwise run `producer` to compute and store a fresh one.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.fresh(key) {
            return value;
        }

        let lock = self.inflight.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone();
        let _guard = lock.lock().await;

        // Re-check: another caller may have just computed it while we
        // waited for the inflight lock.
        if let Some(value) = self.fresh(key) {
            return value;
        }

        let value = producer().await;
        self.entries.insert(key.to_string(), Entry { value: value.clone(), expires_at: Instant::now() + ttl });
        value
    }

    /// Evict a single key regardless of its TTL.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Evict every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn caches_within_ttl() {
        let cache: TtlCache<u32> = TtlCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_compute("k", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    42
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recomputes_after_ttl_expires() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.get_or_compute("k", Duration::from_millis(10), || async { 1 }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let value = cache.get_or_compute("k", Duration::from_secs(60), || async { 2 }).await;
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.get_or_compute("k", Duration::from_secs(60), || async { 1 }).await;
        cache.invalidate("k");
        let value = cache.get_or_compute("k", Duration::from_secs(60), || async { 2 }).await;
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn invalidate_prefix_clears_matching_keys_only() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.get_or_compute("pod:a/p1", Duration::from_secs(60), || async { 1 }).await;
        cache.get_or_compute("pod:a/p2", Duration::from_secs(60), || async { 2 }).await;
        cache.get_or_compute("ns:a", Duration::from_secs(60), || async { 3 }).await;
        cache.invalidate_prefix("pod:");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let cache: TtlCache<u32> = TtlCache::new();
        let a = cache.get_or_compute("a", Duration::from_secs(60), || async { 1 }).await;
        let b = cache.get_or_compute("b", Duration::from_secs(60), || async { 2 }).await;
        assert_eq!((a, b), (1, 2));
    }
}
