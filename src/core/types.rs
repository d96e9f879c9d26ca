/*!
 * Core Types
 * Common identifier types used across the sandbox core
 */

use uuid::Uuid;

/// OS process ID type
pub type Pid = u32;

/// Unique identifier of a capability token
pub type TokenId = Uuid;

/// Unique identifier of a capability context
pub type ContextId = Uuid;
