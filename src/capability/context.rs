/*!
 * Capability Contexts
 * Scoped, hierarchical bags of at-most-one-token-per-type with
 * inheritance lookup toward the root
 */

use crate::capability::token::CapabilityToken;
use crate::core::types::ContextId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// A scope in which a set of capabilities is active
///
/// Contexts form a tree: the parent link is set at creation and immutable,
/// which makes the relation acyclic by construction. Capability lookup walks
/// from the context toward the root; the closest token of a type wins.
#[derive(Debug)]
pub struct CapabilityContext {
    context_id: ContextId,
    name: String,
    parent: Option<Arc<CapabilityContext>>,
    tokens: RwLock<HashMap<String, CapabilityToken>>,
    children: RwLock<Vec<ContextId>>,
}

impl CapabilityContext {
    /// Create a context, linking it under `parent` if given
    pub fn new(name: impl Into<String>, parent: Option<Arc<CapabilityContext>>) -> Arc<Self> {
        let context = Arc::new(Self {
            context_id: Uuid::new_v4(),
            name: name.into(),
            parent,
            tokens: RwLock::new(HashMap::new()),
            children: RwLock::new(Vec::new()),
        });
        if let Some(ref parent) = context.parent {
            parent.children.write().push(context.context_id);
        }
        context
    }

    /// Create a child context whose parent is `self`
    pub fn create_child(self: &Arc<Self>, name: impl Into<String>) -> Arc<CapabilityContext> {
        CapabilityContext::new(name, Some(Arc::clone(self)))
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<CapabilityContext>> {
        self.parent.as_ref()
    }

    /// Identifiers of children spawned from this context (append-only)
    pub fn child_ids(&self) -> Vec<ContextId> {
        self.children.read().clone()
    }

    /// Install a token, replacing any existing token of the same type
    ///
    /// Returns the replaced token, if any. Callers that route through the
    /// manager get the matching cache invalidation for free.
    pub fn add_capability(&self, token: CapabilityToken) -> Option<CapabilityToken> {
        self.tokens
            .write()
            .insert(token.capability_type.clone(), token)
    }

    /// True if this context itself holds a token of the type (no inheritance)
    pub fn has_own_capability(&self, capability_type: &str) -> bool {
        self.tokens.read().contains_key(capability_type)
    }

    /// Capability types held by this context itself
    pub fn own_capability_types(&self) -> Vec<String> {
        self.tokens.read().keys().cloned().collect()
    }

    /// Apply `f` to the closest token of the type, walking toward the root
    pub fn with_capability<R>(
        &self,
        capability_type: &str,
        f: impl FnOnce(&CapabilityToken) -> R,
    ) -> Option<R> {
        {
            let tokens = self.tokens.read();
            if let Some(token) = tokens.get(capability_type) {
                return Some(f(token));
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.with_capability(capability_type, f))
    }

    /// Mutably apply `f` to the closest token of the type
    ///
    /// Returns the owning context's id alongside the result so the caller
    /// can invalidate cached decisions for the right scope.
    pub fn with_capability_mut<R>(
        &self,
        capability_type: &str,
        f: impl FnOnce(&mut CapabilityToken) -> R,
    ) -> Option<(ContextId, R)> {
        {
            let mut tokens = self.tokens.write();
            if let Some(token) = tokens.get_mut(capability_type) {
                return Some((self.context_id, f(token)));
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.with_capability_mut(capability_type, f))
    }

    /// Drop expired tokens held by this context itself
    ///
    /// Returns the capability types that were removed.
    pub fn remove_expired_tokens(&self) -> Vec<String> {
        let mut tokens = self.tokens.write();
        let expired: Vec<String> = tokens
            .iter()
            .filter(|(_, token)| token.is_expired())
            .map(|(ty, _)| ty.clone())
            .collect();
        for ty in &expired {
            tokens.remove(ty);
        }
        expired
    }

    /// Read-only view of every capability type visible from this context
    ///
    /// Closest scope wins: a type held here shadows the same type held by
    /// an ancestor.
    pub fn visible_capabilities(&self) -> Vec<CapabilitySummary> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut summaries = Vec::new();
        let mut inherited = false;

        let mut current: Option<&CapabilityContext> = Some(self);
        while let Some(context) = current {
            let tokens = context.tokens.read();
            for (ty, token) in tokens.iter() {
                if seen.insert(ty.clone()) {
                    summaries.push(CapabilitySummary {
                        capability_type: ty.clone(),
                        resource_patterns: token.constraints.resource_patterns().to_vec(),
                        allowed_operations: {
                            let mut ops: Vec<String> =
                                token.constraints.allowed_operations().iter().cloned().collect();
                            ops.sort();
                            ops
                        },
                        usage_count: token.usage_count(),
                        max_usage_count: token.constraints.max_usage_count(),
                        expires_at: token.constraints.expires_at(),
                        from_context: context.name.clone(),
                        inherited,
                    });
                }
            }
            drop(tokens);
            current = context.parent.as_deref();
            inherited = true;
        }

        summaries.sort_by(|a, b| a.capability_type.cmp(&b.capability_type));
        summaries
    }
}

/// Introspection record for one visible capability type
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapabilitySummary {
    pub capability_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_operations: Vec<String>,
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usage_count: Option<u64>,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
    pub from_context: String,
    pub inherited: bool,
}
