/*!
 * Capability Manager
 * Process-wide orchestrator for capability checks: context registry,
 * decision cache, statistics, and scoped-context helpers
 */

use crate::capability::constraint::{CapabilityConstraint, ResourcePatterns};
use crate::capability::context::{CapabilityContext, CapabilitySummary};
use crate::capability::token::CapabilityToken;
use crate::core::errors::{CapabilityError, CapabilityResult};
use crate::core::types::ContextId;
use crate::manager::cache::DecisionCache;
use crate::manager::scope::{self, ContextGuard};
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Manager configuration knobs
///
/// The cache TTL bounds how long a revoked token can still be honored; the
/// default keeps revocation prompt while avoiding a context-tree walk on
/// every check in a tight loop.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
            cache_capacity: 10_000,
        }
    }
}

#[derive(Default)]
struct ManagerCounters {
    contexts_created: AtomicU64,
    contexts_destroyed: AtomicU64,
    capability_checks: AtomicU64,
}

/// Central capability manager
///
/// Holds only weak references to contexts: the caller (usually through a
/// [`ContextGuard`]) owns the strong reference, so a context is reclaimed as
/// soon as its scope exits. Registry entries are cleaned up eagerly on guard
/// teardown and lazily on lookup miss.
#[derive(Clone)]
pub struct CapabilityManager {
    registry: Arc<DashMap<ContextId, Weak<CapabilityContext>, RandomState>>,
    cache: Arc<DecisionCache>,
    counters: Arc<ManagerCounters>,
}

impl CapabilityManager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        debug!("initializing capability manager");
        Self {
            registry: Arc::new(DashMap::with_hasher(RandomState::new())),
            cache: Arc::new(DecisionCache::new(config.cache_capacity, config.cache_ttl)),
            counters: Arc::new(ManagerCounters::default()),
        }
    }

    /// Create and register a context; the returned Arc is the only strong
    /// owner the manager hands out
    pub fn create_context(
        &self,
        name: impl Into<String>,
        parent: Option<&Arc<CapabilityContext>>,
    ) -> Arc<CapabilityContext> {
        let context = CapabilityContext::new(name, parent.map(Arc::clone));
        self.registry
            .insert(context.context_id(), Arc::downgrade(&context));
        self.counters
            .contexts_created
            .fetch_add(1, Ordering::Relaxed);
        debug!("created context {} ({})", context.name(), context.context_id());
        context
    }

    /// Resolve a live context by id
    ///
    /// A dead registry entry (context already reclaimed) is removed lazily
    /// and counted as destroyed.
    pub fn get_context(&self, context_id: ContextId) -> Option<Arc<CapabilityContext>> {
        let upgraded = self
            .registry
            .get(&context_id)
            .and_then(|entry| entry.upgrade());
        if upgraded.is_none() {
            self.reap_context(context_id);
        }
        upgraded
    }

    /// Remove a dead registry entry, keeping the destroyed counter and the
    /// cache consistent with the guard teardown path
    fn reap_context(&self, context_id: ContextId) {
        if self.registry.remove(&context_id).is_some() {
            self.counters
                .contexts_destroyed
                .fetch_add(1, Ordering::Relaxed);
            self.cache.invalidate_context(context_id);
            debug!("reaped dead context {}", context_id);
        }
    }

    /// Install a context as this thread's current context
    pub fn enter(&self, context: Arc<CapabilityContext>) -> ContextGuard {
        ContextGuard::new(context, self.clone())
    }

    /// Scoped acquisition: create a context, seed it with tokens, and make it
    /// current until the guard drops
    pub fn capability_context(
        &self,
        name: impl Into<String>,
        tokens: Vec<CapabilityToken>,
        parent: Option<&Arc<CapabilityContext>>,
    ) -> ContextGuard {
        let context = self.create_context(name, parent);
        for token in tokens {
            context.add_capability(token);
        }
        self.enter(context)
    }

    /// Scoped context holding a single file token
    pub fn file_capability_context(
        &self,
        patterns: &[&str],
        operations: &[&str],
    ) -> CapabilityResult<ContextGuard> {
        let token = CapabilityToken::file(patterns.iter().copied(), operations.iter().copied())?;
        Ok(self.capability_context("file", vec![token], None))
    }

    /// Scoped context holding a single network token
    pub fn network_capability_context(&self, hosts: &[&str], ports: &[u16]) -> ContextGuard {
        let token = CapabilityToken::network(hosts.iter().copied(), ports.iter().copied());
        self.capability_context("network", vec![token], None)
    }

    /// Check whether the current context can perform an operation
    ///
    /// Never raises: no current context, no satisfying token, and a stale
    /// token all answer `false`. Results are cached per
    /// (context, type, resource, operation) with the configured TTL.
    pub fn has_capability(
        &self,
        capability_type: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> bool {
        self.counters
            .capability_checks
            .fetch_add(1, Ordering::Relaxed);

        let Some(context) = scope::current_context() else {
            return false;
        };
        let context_id = context.context_id();

        if let Some(cached) = self
            .cache
            .get(context_id, capability_type, resource, operation)
        {
            return cached;
        }

        let allowed = context
            .with_capability(capability_type, |token| token.satisfies(resource, operation))
            .unwrap_or(false);

        self.cache
            .put(context_id, capability_type, resource, operation, allowed);
        allowed
    }

    /// Consume one use of a capability from the current context
    ///
    /// Mutates the owning token's usage state, so the cached decisions for
    /// the owning and current contexts are invalidated afterward (the quota
    /// may now be exhausted).
    pub fn use_capability(
        &self,
        capability_type: &str,
        resource: &str,
        operation: &str,
    ) -> CapabilityResult<()> {
        self.counters
            .capability_checks
            .fetch_add(1, Ordering::Relaxed);

        let context = scope::current_context().ok_or(CapabilityError::NoActiveContext)?;

        match context
            .with_capability_mut(capability_type, |token| token.use_token(resource, operation))
        {
            None => Err(CapabilityError::NotFound {
                capability_type: capability_type.to_string(),
            }),
            Some((owner_id, result)) => {
                self.cache.invalidate(owner_id, capability_type);
                if owner_id != context.context_id() {
                    self.cache
                        .invalidate(context.context_id(), capability_type);
                }
                if let Err(ref err) = result {
                    debug!("use_capability({}) denied: {}", capability_type, err);
                }
                result
            }
        }
    }

    /// Grant a token to this thread's current context
    pub fn add_capability_to_current_context(
        &self,
        token: CapabilityToken,
    ) -> CapabilityResult<()> {
        let context = scope::current_context().ok_or(CapabilityError::NoActiveContext)?;
        self.add_capability(&context, token);
        Ok(())
    }

    /// Grant a token to a specific context
    ///
    /// The cache slice for that (context, type) is dropped synchronously, so
    /// the grant is visible to the next check before this call returns.
    pub fn add_capability(&self, context: &Arc<CapabilityContext>, token: CapabilityToken) {
        let capability_type = token.capability_type.clone();
        context.add_capability(token);
        self.cache
            .invalidate(context.context_id(), &capability_type);
        // Descendants inherit through the walk, so their cached answers for
        // this type are stale too
        self.invalidate_descendants(context, &capability_type);
        info!(
            "granted {} capability to context {}",
            capability_type,
            context.name()
        );
    }

    fn invalidate_descendants(&self, context: &Arc<CapabilityContext>, capability_type: &str) {
        for child_id in context.child_ids() {
            if let Some(child) = self.get_context(child_id) {
                self.cache.invalidate(child_id, capability_type);
                self.invalidate_descendants(&child, capability_type);
            }
        }
    }

    /// Drop every cached decision
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("decision cache cleared");
    }

    /// Remove expired tokens from every live context
    ///
    /// Returns the number of tokens removed. Dead registry entries found
    /// along the way are reaped.
    pub fn cleanup_expired_tokens(&self) -> usize {
        let mut removed = 0;
        let mut dead = Vec::new();

        for entry in self.registry.iter() {
            match entry.value().upgrade() {
                Some(context) => {
                    for capability_type in context.remove_expired_tokens() {
                        self.cache
                            .invalidate(context.context_id(), &capability_type);
                        removed += 1;
                    }
                }
                None => dead.push(*entry.key()),
            }
        }
        for context_id in dead {
            self.reap_context(context_id);
        }

        if removed > 0 {
            info!("removed {} expired capability tokens", removed);
        }
        removed
    }

    /// Snapshot of manager statistics
    pub fn get_statistics(&self) -> ManagerStats {
        let active_contexts = self
            .registry
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count();

        ManagerStats {
            contexts_created: self.counters.contexts_created.load(Ordering::Relaxed),
            contexts_destroyed: self.counters.contexts_destroyed.load(Ordering::Relaxed),
            capability_checks: self.counters.capability_checks.load(Ordering::Relaxed),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            active_contexts,
            cache_entries: self.cache.len(),
            cache_hit_rate: self.cache.hit_rate(),
        }
    }

    /// Read-only debug view: current context chain plus visible capabilities
    pub fn get_debug_info(&self) -> DebugInfo {
        let current = scope::current_context();

        let mut chain = Vec::new();
        let mut cursor = current.clone();
        while let Some(context) = cursor {
            chain.push(ContextDescriptor {
                context_id: context.context_id(),
                name: context.name().to_string(),
                own_capability_types: {
                    let mut types = context.own_capability_types();
                    types.sort();
                    types
                },
            });
            cursor = context.parent().cloned();
        }

        DebugInfo {
            context_chain: chain,
            capabilities: current
                .map(|context| context.visible_capabilities())
                .unwrap_or_default(),
            statistics: self.get_statistics(),
        }
    }

    /// Guard teardown hook: unregister and drop cached decisions
    pub(crate) fn on_context_released(&self, context_id: ContextId) {
        if self.registry.remove(&context_id).is_some() {
            self.counters
                .contexts_destroyed
                .fetch_add(1, Ordering::Relaxed);
        } else {
            warn!("released context {} was not registered", context_id);
        }
        self.cache.invalidate_context(context_id);
        debug!("context {} released", context_id);
    }
}

impl Default for CapabilityManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ManagerStats {
    pub contexts_created: u64,
    pub contexts_destroyed: u64,
    pub capability_checks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub active_contexts: usize,
    pub cache_entries: usize,
    pub cache_hit_rate: f64,
}

/// One entry of the current context chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextDescriptor {
    pub context_id: ContextId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub own_capability_types: Vec<String>,
}

/// Read-only introspection surface for tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DebugInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_chain: Vec<ContextDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilitySummary>,
    pub statistics: ManagerStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_current_context_answers_false() {
        let manager = CapabilityManager::new();
        assert!(!manager.has_capability("file", None, None));
    }

    #[test]
    fn test_scoped_context_lifecycle() {
        let manager = CapabilityManager::new();
        let context_id;
        {
            let guard = manager.capability_context(
                "scope",
                vec![CapabilityToken::new("file", CapabilityConstraint::new())],
                None,
            );
            context_id = guard.context_id();
            assert!(manager.has_capability("file", None, None));
            assert!(manager.get_context(context_id).is_some());
        }
        // Guard dropped: context deactivated and reclaimed
        assert!(!manager.has_capability("file", None, None));
        assert!(manager.get_context(context_id).is_none());

        let stats = manager.get_statistics();
        assert_eq!(stats.contexts_created, 1);
        assert_eq!(stats.contexts_destroyed, 1);
        assert_eq!(stats.active_contexts, 0);
    }

    #[test]
    fn test_weak_registry_reclamation() {
        let manager = CapabilityManager::new();
        let context = manager.create_context("short-lived", None);
        let context_id = context.context_id();

        assert!(manager.get_context(context_id).is_some());
        drop(context);
        // The manager held only a weak reference
        assert!(manager.get_context(context_id).is_none());
    }

    #[test]
    fn test_reaped_contexts_are_counted() {
        let manager = CapabilityManager::new();

        // Lazy reap on lookup miss
        let context = manager.create_context("first", None);
        let context_id = context.context_id();
        drop(context);
        assert!(manager.get_context(context_id).is_none());

        let stats = manager.get_statistics();
        assert_eq!(stats.contexts_created, 1);
        assert_eq!(stats.contexts_destroyed, 1);

        // Reap during the expired-token sweep
        let context = manager.create_context("second", None);
        drop(context);
        manager.cleanup_expired_tokens();

        let stats = manager.get_statistics();
        assert_eq!(stats.contexts_created, 2);
        assert_eq!(stats.contexts_destroyed, 2);
        assert_eq!(stats.active_contexts, 0);
    }

    #[test]
    fn test_use_capability_without_context_errors() {
        let manager = CapabilityManager::new();
        let err = manager.use_capability("file", "a.txt", "read").unwrap_err();
        assert_eq!(err, CapabilityError::NoActiveContext);
    }

    #[test]
    fn test_add_capability_requires_context() {
        let manager = CapabilityManager::new();
        let token = CapabilityToken::new("file", CapabilityConstraint::new());
        let err = manager.add_capability_to_current_context(token).unwrap_err();
        assert_eq!(err, CapabilityError::NoActiveContext);
    }

    #[test]
    fn test_grant_visible_despite_cached_false() {
        let manager = CapabilityManager::new();
        let _guard = manager.capability_context("scope", vec![], None);

        // Prime the cache with a negative answer
        assert!(!manager.has_capability("file", Some("a.txt"), Some("read")));

        let token = CapabilityToken::new("file", CapabilityConstraint::new());
        manager.add_capability_to_current_context(token).unwrap();

        // The grant invalidated the cached false within the same TTL window
        assert!(manager.has_capability("file", Some("a.txt"), Some("read")));
    }

    #[test]
    fn test_statistics_track_cache() {
        let manager = CapabilityManager::new();
        let _guard = manager.capability_context(
            "scope",
            vec![CapabilityToken::new("file", CapabilityConstraint::new())],
            None,
        );

        assert!(manager.has_capability("file", None, None)); // miss
        assert!(manager.has_capability("file", None, None)); // hit

        let stats = manager.get_statistics();
        assert_eq!(stats.capability_checks, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!(stats.cache_hit_rate > 0.0);
    }

    #[test]
    fn test_cleanup_expired_tokens() {
        let manager = CapabilityManager::new();
        let context = manager.create_context("scope", None);
        let mut token = CapabilityToken::new("file", CapabilityConstraint::new());
        token.constraints.revoke_now();
        context.add_capability(token);
        context.add_capability(CapabilityToken::new("network", CapabilityConstraint::new()));

        assert_eq!(manager.cleanup_expired_tokens(), 1);
        assert!(!context.has_own_capability("file"));
        assert!(context.has_own_capability("network"));
    }

    #[test]
    fn test_debug_info_reports_chain() {
        let manager = CapabilityManager::new();
        let parent_guard = manager.capability_context(
            "outer",
            vec![CapabilityToken::new("file", CapabilityConstraint::new())],
            None,
        );
        let child_guard = manager.capability_context(
            "inner",
            vec![CapabilityToken::new("network", CapabilityConstraint::new())],
            Some(parent_guard.context()),
        );

        let info = manager.get_debug_info();
        assert_eq!(info.context_chain.len(), 2);
        assert_eq!(info.context_chain[0].name, "inner");
        assert_eq!(info.context_chain[1].name, "outer");
        assert_eq!(info.capabilities.len(), 2);

        drop(child_guard);
        let info = manager.get_debug_info();
        assert_eq!(info.context_chain.len(), 1);
    }
}
