/*!
 * Error Types
 * Centralized error handling with thiserror and serde support
 */

use crate::core::types::{Pid, TokenId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capability operation result
///
/// # Must Use
/// Authorization failures must be handled to preserve the security boundary
#[must_use = "capability operations can fail and must be handled"]
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Monitor operation result
///
/// # Must Use
/// Monitoring failures can leave a process unwatched and must be handled
#[must_use = "monitor operations can fail and must be handled"]
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors raised by the capability authorization layer
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum CapabilityError {
    #[error("no capability of type {capability_type:?} reachable from the current context")]
    NotFound { capability_type: String },

    #[error("capability token {token_id} has expired")]
    Expired { token_id: TokenId },

    #[error("capability token {token_id} exhausted its usage quota of {limit}")]
    QuotaExceeded { token_id: TokenId, limit: u64 },

    #[error("resource {resource:?} does not match any allowed pattern")]
    ResourceMismatch { resource: String },

    #[error("operation {operation:?} is not permitted by the constraint")]
    OperationNotAllowed { operation: String },

    #[error("capability token {token_id} failed its integrity check")]
    IntegrityViolation { token_id: TokenId },

    #[error("no active capability context on this thread")]
    NoActiveContext,

    #[error("invalid resource pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors raised by the resource monitor control surface
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum MonitorError {
    #[error("process {0} not found")]
    ProcessNotFound(Pid),

    #[error("already monitoring process {0}")]
    AlreadyMonitoring(Pid),

    #[error("no process is being monitored")]
    NotMonitoring,

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err.to_string())
    }
}

/// Resource dimension tracked by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    CpuTimeout,
    FileHandles,
    Threads,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Memory => write!(f, "memory"),
            ResourceKind::CpuTimeout => write!(f, "cpu_timeout"),
            ResourceKind::FileHandles => write!(f, "file_handles"),
            ResourceKind::Threads => write!(f, "threads"),
        }
    }
}

/// Hard resource ceiling breach
///
/// Raised inside the monitor's own control flow, never surfaced to the
/// monitored program: the process is terminated and the violation is kept
/// for the launcher to inspect afterward.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[error("{resource} limit exceeded: {current} > {limit}")]
pub struct ResourceLimitExceeded {
    pub resource: ResourceKind,
    pub limit: f64,
    pub current: f64,
}

impl ResourceLimitExceeded {
    pub fn new(resource: ResourceKind, limit: f64, current: f64) -> Self {
        Self {
            resource,
            limit,
            current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Memory.to_string(), "memory");
        assert_eq!(ResourceKind::CpuTimeout.to_string(), "cpu_timeout");
    }

    #[test]
    fn test_limit_exceeded_message() {
        let err = ResourceLimitExceeded::new(ResourceKind::CpuTimeout, 10.0, 15.0);
        assert_eq!(err.to_string(), "cpu_timeout limit exceeded: 15 > 10");
    }

    #[test]
    fn test_capability_error_serde_tag() {
        let err = CapabilityError::NoActiveContext;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("no_active_context"));
    }
}
