/*!
 * Capability Model
 * Tokens, constraints, and scoped contexts
 */

pub mod constraint;
pub mod context;
pub mod token;

pub use constraint::{CapabilityConstraint, ResourcePatterns};
pub use context::{CapabilityContext, CapabilitySummary};
pub use token::CapabilityToken;
