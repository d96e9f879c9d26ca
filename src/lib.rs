/*!
 * Sandbox Core Library
 * Capability-based authorization and resource enforcement for untrusted code
 *
 * Two decoupled enforcement paths: the capability layer answers "may this
 * operation happen", and the resource monitor terminates the process when it
 * exceeds its budgets regardless of what authorization says.
 */

pub mod capability;
pub mod core;
pub mod manager;
pub mod monitor;

// Re-exports
pub use capability::{
    CapabilityConstraint, CapabilityContext, CapabilitySummary, CapabilityToken, ResourcePatterns,
};
pub use core::errors::{
    CapabilityError, CapabilityResult, MonitorError, MonitorResult, ResourceKind,
    ResourceLimitExceeded,
};
pub use core::types::{ContextId, Pid, TokenId};
pub use manager::{CapabilityManager, ContextGuard, DebugInfo, ManagerConfig, ManagerStats};
pub use monitor::{MonitorConfig, ResourceLimits, ResourceMonitor, UsageSample, UsageSummary};
