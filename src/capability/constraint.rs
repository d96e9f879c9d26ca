/*!
 * Capability Constraints
 * Restriction sets attached to capability tokens: resource patterns,
 * operation verbs, quotas, expiry, and network allow-lists
 */

use crate::core::errors::{CapabilityError, CapabilityResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Glob patterns selecting the resources a token may touch
///
/// Empty pattern set means unconstrained. Patterns are compiled once at
/// construction; deserialization recompiles them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ResourcePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ResourcePatterns {
    /// Compile a pattern list
    pub fn new<I, S>(patterns: I) -> CapabilityResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|e| CapabilityError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| CapabilityError::InvalidPattern {
            pattern: patterns.join(","),
            reason: e.to_string(),
        })?;
        Ok(Self { patterns, set })
    }

    /// Unconstrained pattern set (matches everything)
    pub fn unconstrained() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if unconstrained or any pattern matches
    #[must_use]
    pub fn matches(&self, resource: &str) -> bool {
        self.patterns.is_empty() || self.set.is_match(resource)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ResourcePatterns {
    fn default() -> Self {
        Self::unconstrained()
    }
}

impl TryFrom<Vec<String>> for ResourcePatterns {
    type Error = CapabilityError;

    fn try_from(patterns: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(patterns)
    }
}

impl From<ResourcePatterns> for Vec<String> {
    fn from(patterns: ResourcePatterns) -> Self {
        patterns.patterns
    }
}

/// Restriction set owned by exactly one capability token
///
/// Constraints only ever narrow effective permission. In-place mutation is
/// limited to the narrowing operations (`revoke_now`, the `tighten_*`
/// family); everything else is set at construction through the builder.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapabilityConstraint {
    #[serde(default, skip_serializing_if = "ResourcePatterns::is_empty")]
    resource_patterns: ResourcePatterns,
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    allowed_operations: HashSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_usage_count: Option<u64>,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_cpu_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    allowed_hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    allowed_ports: Vec<u16>,
}

impl CapabilityConstraint {
    /// Unconstrained (most permissive) constraint
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resource_patterns(mut self, patterns: ResourcePatterns) -> Self {
        self.resource_patterns = patterns;
        self
    }

    #[must_use]
    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_max_usage_count(mut self, count: u64) -> Self {
        self.max_usage_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_max_cpu_time(mut self, seconds: f64) -> Self {
        self.max_cpu_time = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_allowed_ports<I: IntoIterator<Item = u16>>(mut self, ports: I) -> Self {
        self.allowed_ports = ports.into_iter().collect();
        self
    }

    /// True if the pattern set is empty or any pattern matches
    #[must_use]
    pub fn matches_resource(&self, resource: &str) -> bool {
        self.resource_patterns.matches(resource)
    }

    /// True if the operation set is empty or contains the verb
    #[must_use]
    pub fn allows_operation(&self, operation: &str) -> bool {
        self.allowed_operations.is_empty() || self.allowed_operations.contains(operation)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= SystemTime::now(),
            None => false,
        }
    }

    /// True if the host allow-list is empty or the host matches an entry
    ///
    /// Entries are exact hostnames, `*`, or wildcard domains like
    /// `*.example.com` (which matches `api.example.com` but not
    /// `example.com` itself).
    #[must_use]
    pub fn allows_host(&self, host: &str) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|pattern| host_matches(host, pattern))
    }

    /// True if the port allow-list is empty or contains the port
    #[must_use]
    pub fn allows_port(&self, port: u16) -> bool {
        self.allowed_ports.is_empty() || self.allowed_ports.contains(&port)
    }

    /// Administrative revoke: force expiry into the past immediately
    pub fn revoke_now(&mut self) {
        self.expires_at = Some(UNIX_EPOCH);
    }

    /// Narrow the expiry; a later timestamp than the current one is ignored
    pub fn tighten_expiry(&mut self, expires_at: SystemTime) {
        match self.expires_at {
            Some(current) if current <= expires_at => {}
            _ => self.expires_at = Some(expires_at),
        }
    }

    /// Narrow the usage quota; a looser quota than the current one is ignored
    pub fn tighten_usage(&mut self, max_usage_count: u64) {
        match self.max_usage_count {
            Some(current) if current <= max_usage_count => {}
            _ => self.max_usage_count = Some(max_usage_count),
        }
    }

    /// Replace the resource patterns with a narrower set
    pub fn tighten_patterns(&mut self, patterns: ResourcePatterns) {
        self.resource_patterns = patterns;
    }

    pub fn resource_patterns(&self) -> &[String] {
        self.resource_patterns.as_slice()
    }

    pub fn allowed_operations(&self) -> &HashSet<String> {
        &self.allowed_operations
    }

    pub fn max_usage_count(&self) -> Option<u64> {
        self.max_usage_count
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    pub fn max_memory(&self) -> Option<u64> {
        self.max_memory
    }

    pub fn max_cpu_time(&self) -> Option<f64> {
        self.max_cpu_time
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    pub fn allowed_ports(&self) -> &[u16] {
        &self.allowed_ports
    }
}

fn host_matches(host: &str, pattern: &str) -> bool {
    if pattern == "*" || pattern == host {
        return true;
    }

    // Wildcard domain matching (e.g., "*.example.com")
    // Matches "api.example.com" but not "example.com" itself
    if let Some(domain) = pattern.strip_prefix('*') {
        host.ends_with(domain) && host.len() > domain.len()
    } else {
        host == pattern
    }
}
