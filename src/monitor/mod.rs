/*!
 * Resource Monitoring
 * Polling, limit enforcement, and usage reporting for live processes
 */

pub mod limits;
#[allow(clippy::module_inception)]
pub mod monitor;
pub mod probe;
pub mod usage;

pub use limits::ResourceLimits;
pub use monitor::{MonitorConfig, ResourceMonitor};
pub use probe::ProcessProbe;
pub use usage::{format_bytes, UsageSample, UsageSummary};
