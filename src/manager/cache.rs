/*!
 * Decision Cache
 * Short-TTL cache of authorization decisions, keyed by
 * (context, capability type, resource, operation)
 */

use crate::core::types::ContextId;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cache key for authorization lookups
///
/// Carries the full query strings: two distinct queries can never share a
/// slot, so a cached answer for one resource/operation is never served for
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    context_id: ContextId,
    capability_type: String,
    resource: Option<Box<str>>,
    operation: Option<Box<str>>,
}

impl CacheKey {
    fn new(
        context_id: ContextId,
        capability_type: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> Self {
        Self {
            context_id,
            capability_type: capability_type.to_string(),
            resource: resource.map(Into::into),
            operation: operation.map(Into::into),
        }
    }
}

struct CachedDecision {
    allowed: bool,
    expires_at: Instant,
}

/// TTL'd authorization decision cache
///
/// Invalidation is targeted by (context, capability type); a full flush only
/// happens on explicit `clear`. The TTL bounds how long a revoked or expired
/// token can still be honored.
///
/// # Performance
/// - Cache-line aligned to prevent false sharing of the hit/miss counters
#[repr(C, align(64))]
pub struct DecisionCache {
    cache: DashMap<CacheKey, CachedDecision, RandomState>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            cache: DashMap::with_capacity_and_hasher(max_size, RandomState::new()),
            max_size,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached decision if present and within TTL
    pub fn get(
        &self,
        context_id: ContextId,
        capability_type: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> Option<bool> {
        let key = CacheKey::new(context_id, capability_type, resource, operation);

        if let Some(entry) = self.cache.get(&key) {
            if entry.expires_at > Instant::now() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.allowed);
            }
            // Expired, remove it
            drop(entry);
            self.cache.remove(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a decision
    pub fn put(
        &self,
        context_id: ContextId,
        capability_type: &str,
        resource: Option<&str>,
        operation: Option<&str>,
        allowed: bool,
    ) {
        // Simple size limit - remove an arbitrary entry if full
        if self.cache.len() >= self.max_size {
            if let Some(entry) = self.cache.iter().next() {
                let key = entry.key().clone();
                drop(entry);
                self.cache.remove(&key);
            }
        }

        let key = CacheKey::new(context_id, capability_type, resource, operation);
        self.cache.insert(
            key,
            CachedDecision {
                allowed,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry for one (context, capability type) pair
    pub fn invalidate(&self, context_id: ContextId, capability_type: &str) {
        self.cache
            .retain(|k, _| !(k.context_id == context_id && k.capability_type == capability_type));
    }

    /// Drop every entry for a context
    pub fn invalidate_context(&self, context_id: ContextId) {
        self.cache.retain(|k, _| k.context_id != context_id);
    }

    /// Clear the whole cache
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        // 10K entries, 5 second TTL
        Self::new(10_000, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_cache_hit() {
        let cache = DecisionCache::new(100, Duration::from_secs(10));
        let ctx = Uuid::new_v4();

        cache.put(ctx, "file", Some("a.txt"), Some("read"), true);
        assert_eq!(cache.get(ctx, "file", Some("a.txt"), Some("read")), Some(true));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_cache_miss_on_different_query() {
        let cache = DecisionCache::new(100, Duration::from_secs(10));
        let ctx = Uuid::new_v4();

        cache.put(ctx, "file", Some("a.txt"), Some("read"), true);
        assert_eq!(cache.get(ctx, "file", Some("b.txt"), Some("read")), None);
        assert_eq!(cache.get(ctx, "file", Some("a.txt"), Some("write")), None);
        assert_eq!(cache.get(ctx, "file", None, None), None);
        assert_eq!(cache.misses(), 3);
    }

    #[test]
    fn test_distinct_queries_never_share_a_slot() {
        let cache = DecisionCache::new(100, Duration::from_secs(10));
        let ctx = Uuid::new_v4();

        cache.put(ctx, "file", Some("allowed.txt"), Some("read"), true);
        // An unseen query must never be answered from another query's entry
        assert_eq!(
            cache.get(ctx, "file", Some("forbidden.bin"), Some("read")),
            None
        );

        cache.put(ctx, "file", Some("forbidden.bin"), Some("read"), false);
        assert_eq!(
            cache.get(ctx, "file", Some("allowed.txt"), Some("read")),
            Some(true)
        );
        assert_eq!(
            cache.get(ctx, "file", Some("forbidden.bin"), Some("read")),
            Some(false)
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_expiry() {
        let cache = DecisionCache::new(100, Duration::from_millis(10));
        let ctx = Uuid::new_v4();

        cache.put(ctx, "file", None, None, true);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(ctx, "file", None, None), None);
    }

    #[test]
    fn test_targeted_invalidation() {
        let cache = DecisionCache::new(100, Duration::from_secs(10));
        let ctx_a = Uuid::new_v4();
        let ctx_b = Uuid::new_v4();

        cache.put(ctx_a, "file", None, None, false);
        cache.put(ctx_a, "network", None, None, true);
        cache.put(ctx_b, "file", None, None, true);

        cache.invalidate(ctx_a, "file");

        assert_eq!(cache.get(ctx_a, "file", None, None), None);
        assert_eq!(cache.get(ctx_a, "network", None, None), Some(true));
        assert_eq!(cache.get(ctx_b, "file", None, None), Some(true));
    }

    #[test]
    fn test_invalidate_context() {
        let cache = DecisionCache::new(100, Duration::from_secs(10));
        let ctx = Uuid::new_v4();

        cache.put(ctx, "file", None, None, true);
        cache.put(ctx, "network", None, None, true);
        cache.invalidate_context(ctx);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_bound() {
        let cache = DecisionCache::new(2, Duration::from_secs(10));
        let ctx = Uuid::new_v4();

        cache.put(ctx, "a", None, None, true);
        cache.put(ctx, "b", None, None, true);
        cache.put(ctx, "c", None, None, true);
        assert!(cache.len() <= 2);
    }
}
