/*!
 * Resource Limits
 * Hard ceilings enforced against a monitored process
 */

use crate::core::errors::{ResourceKind, ResourceLimitExceeded};
use crate::monitor::usage::UsageSample;
use serde::{Deserialize, Serialize};

/// Resource ceilings for one monitored process
///
/// `None` means unlimited for that dimension. `file_size_limit` is carried
/// as configuration for the file bridges; the monitor itself cannot observe
/// individual write sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_handles: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<u32>,
}

impl ResourceLimits {
    /// Unlimited in every dimension
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            memory_limit: None,
            cpu_timeout: None,
            file_size_limit: None,
            max_file_handles: None,
            max_threads: None,
        }
    }

    /// Balanced defaults for untrusted code
    #[must_use]
    pub fn standard() -> Self {
        Self {
            memory_limit: Some(512 * 1024 * 1024), // 512 MB
            cpu_timeout: Some(60.0),               // 1 minute wall clock
            file_size_limit: Some(10 * 1024 * 1024),
            max_file_handles: Some(256),
            max_threads: Some(32),
        }
    }

    #[must_use]
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_cpu_timeout(mut self, seconds: f64) -> Self {
        self.cpu_timeout = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_file_size_limit(mut self, bytes: u64) -> Self {
        self.file_size_limit = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_max_file_handles(mut self, handles: u32) -> Self {
        self.max_file_handles = Some(handles);
        self
    }

    #[must_use]
    pub fn with_max_threads(mut self, threads: u32) -> Self {
        self.max_threads = Some(threads);
        self
    }

    /// Compare one usage sample against every configured ceiling
    pub fn check(&self, sample: &UsageSample) -> Result<(), ResourceLimitExceeded> {
        if let Some(limit) = self.memory_limit {
            if sample.memory > limit {
                return Err(ResourceLimitExceeded::new(
                    ResourceKind::Memory,
                    limit as f64,
                    sample.memory as f64,
                ));
            }
        }
        if let Some(limit) = self.cpu_timeout {
            if sample.elapsed_time > limit {
                return Err(ResourceLimitExceeded::new(
                    ResourceKind::CpuTimeout,
                    limit,
                    sample.elapsed_time,
                ));
            }
        }
        if let Some(limit) = self.max_file_handles {
            if sample.file_handles > limit {
                return Err(ResourceLimitExceeded::new(
                    ResourceKind::FileHandles,
                    limit as f64,
                    sample.file_handles as f64,
                ));
            }
        }
        if let Some(limit) = self.max_threads {
            if sample.num_threads > limit {
                return Err(ResourceLimitExceeded::new(
                    ResourceKind::Threads,
                    limit as f64,
                    sample.num_threads as f64,
                ));
            }
        }
        Ok(())
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}
