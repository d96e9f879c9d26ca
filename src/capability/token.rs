/*!
 * Capability Tokens
 * Unforgeable, constraint-bearing permission objects with tamper-evident
 * identity fields
 */

use crate::capability::constraint::{CapabilityConstraint, ResourcePatterns};
use crate::core::errors::{CapabilityError, CapabilityResult};
use crate::core::types::TokenId;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A capability token for one capability type (e.g. `file`, `network`)
///
/// Identity fields (`token_id`, `created_at`, `capability_type`) are covered
/// by a checksum computed once at creation: mutating any of them makes the
/// token permanently invalid. Constraints are deliberately excluded so that
/// legitimate tightening (emergency revocation via expiry) never trips the
/// check.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapabilityToken {
    token_id: TokenId,
    /// Immutable type tag; public only so tampering is observable in tests.
    /// Legitimate code never writes this field.
    pub capability_type: String,
    #[serde_as(as = "TimestampSeconds<i64>")]
    created_at: SystemTime,
    pub constraints: CapabilityConstraint,
    usage_count: u64,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used_at: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    created_by: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    checksum: u64,
}

impl CapabilityToken {
    /// Create a token for a capability type with the given constraints
    #[must_use]
    pub fn new(capability_type: impl Into<String>, constraints: CapabilityConstraint) -> Self {
        let capability_type = capability_type.into();
        let token_id = Uuid::new_v4();
        let created_at = SystemTime::now();
        let checksum = compute_checksum(&token_id, created_at, &capability_type);

        Self {
            token_id,
            capability_type,
            created_at,
            constraints,
            usage_count: 0,
            last_used_at: None,
            created_by: String::new(),
            description: String::new(),
            checksum,
        }
    }

    /// Attach provenance metadata
    #[must_use]
    pub fn with_provenance(
        mut self,
        created_by: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.created_by = created_by.into();
        self.description = description.into();
        self
    }

    /// File capability restricted to glob patterns and operation verbs
    pub fn file<P, O, S, T>(patterns: P, operations: O) -> CapabilityResult<Self>
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
        O: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let constraints = CapabilityConstraint::new()
            .with_resource_patterns(ResourcePatterns::new(patterns)?)
            .with_operations(operations);
        Ok(Self::new("file", constraints))
    }

    /// Network capability restricted to a host/port allow-list
    #[must_use]
    pub fn network<H, S, P>(hosts: H, ports: P) -> Self
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
        P: IntoIterator<Item = u16>,
    {
        let constraints = CapabilityConstraint::new()
            .with_allowed_hosts(hosts)
            .with_allowed_ports(ports);
        Self::new("network", constraints)
    }

    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn last_used_at(&self) -> Option<SystemTime> {
        self.last_used_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Uses left before the quota is exhausted, if a quota is set
    pub fn remaining_uses(&self) -> Option<u64> {
        self.constraints
            .max_usage_count()
            .map(|max| max.saturating_sub(self.usage_count))
    }

    /// Recompute and compare the identity checksum
    #[must_use]
    pub fn validate_integrity(&self) -> bool {
        compute_checksum(&self.token_id, self.created_at, &self.capability_type) == self.checksum
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.constraints.is_expired()
    }

    /// Integrity holds, not expired, quota not exhausted
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if !self.validate_integrity() {
            return false;
        }
        if self.is_expired() {
            return false;
        }
        match self.constraints.max_usage_count() {
            Some(max) => self.usage_count < max,
            None => true,
        }
    }

    #[must_use]
    pub fn matches_resource(&self, resource: &str) -> bool {
        self.constraints.matches_resource(resource)
    }

    #[must_use]
    pub fn allows_operation(&self, operation: &str) -> bool {
        self.constraints.allows_operation(operation)
    }

    /// Full check: valid AND resource matches AND operation allowed
    #[must_use]
    pub fn can_access_resource(&self, resource: &str, operation: &str) -> bool {
        self.is_valid() && self.matches_resource(resource) && self.allows_operation(operation)
    }

    /// Check against an optionally-qualified query; `None` skips that axis
    #[must_use]
    pub fn satisfies(&self, resource: Option<&str>, operation: Option<&str>) -> bool {
        self.is_valid()
            && resource.map_or(true, |r| self.matches_resource(r))
            && operation.map_or(true, |op| self.allows_operation(op))
    }

    /// Consume one use of the token
    ///
    /// Re-validates the full constraint set; on success increments the usage
    /// counter and stamps `last_used_at`. The usage counter never exceeds the
    /// quota.
    pub fn use_token(&mut self, resource: &str, operation: &str) -> CapabilityResult<()> {
        if !self.validate_integrity() {
            return Err(CapabilityError::IntegrityViolation {
                token_id: self.token_id,
            });
        }
        if self.is_expired() {
            return Err(CapabilityError::Expired {
                token_id: self.token_id,
            });
        }
        if let Some(max) = self.constraints.max_usage_count() {
            if self.usage_count >= max {
                return Err(CapabilityError::QuotaExceeded {
                    token_id: self.token_id,
                    limit: max,
                });
            }
        }
        if !self.matches_resource(resource) {
            return Err(CapabilityError::ResourceMismatch {
                resource: resource.to_string(),
            });
        }
        if !self.allows_operation(operation) {
            return Err(CapabilityError::OperationNotAllowed {
                operation: operation.to_string(),
            });
        }

        self.usage_count += 1;
        self.last_used_at = Some(SystemTime::now());
        Ok(())
    }
}

/// Checksum over the identity fields only; timestamps truncated to whole
/// seconds so the value survives serialization round-trips.
fn compute_checksum(token_id: &TokenId, created_at: SystemTime, capability_type: &str) -> u64 {
    let created_secs = created_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut hasher = DefaultHasher::new();
    token_id.hash(&mut hasher);
    created_secs.hash(&mut hasher);
    capability_type.hash(&mut hasher);
    hasher.finish()
}
