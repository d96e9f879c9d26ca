/*!
 * Core Module
 * Shared types and error taxonomy
 */

pub mod errors;
pub mod types;

pub use errors::{
    CapabilityError, CapabilityResult, MonitorError, MonitorResult, ResourceKind,
    ResourceLimitExceeded,
};
pub use types::{ContextId, Pid, TokenId};
