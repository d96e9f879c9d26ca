/*!
 * Capability Manager
 * Authorization orchestration: registry, cache, scoped contexts
 */

pub mod cache;
#[allow(clippy::module_inception)]
pub mod manager;
pub mod scope;

pub use cache::DecisionCache;
pub use manager::{CapabilityManager, ContextDescriptor, DebugInfo, ManagerConfig, ManagerStats};
pub use scope::ContextGuard;
