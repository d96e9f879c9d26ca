/*!
 * Usage Samples
 * Time-ordered resource usage records and their summary/report forms
 */

use serde::{Deserialize, Serialize};

/// One poll of a monitored process's resource consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UsageSample {
    /// Resident set size in bytes
    pub memory: u64,
    /// CPU usage since the previous sample, percent of one core
    pub cpu_percent: f64,
    /// Open file handle count
    pub file_handles: u32,
    /// Thread count
    pub num_threads: u32,
    /// Wall-clock seconds since monitoring started
    pub elapsed_time: f64,
}

/// Aggregated view over a sample history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UsageSummary {
    pub current_memory: u64,
    pub peak_memory: u64,
    pub average_memory: u64,
    pub current_cpu: f64,
    pub peak_cpu: f64,
    pub average_cpu: f64,
    pub file_handles: u32,
    pub num_threads: u32,
    pub elapsed_time: f64,
    pub samples: usize,
}

impl UsageSummary {
    /// Human-readable usage report
    pub fn format_report(&self) -> String {
        format!(
            "Resource usage over {} samples ({}):\n  \
             memory:  current {}, peak {}, average {}\n  \
             cpu:     current {}, peak {}, average {}\n  \
             handles: {} open files, {} threads",
            self.samples,
            format_seconds(self.elapsed_time),
            format_bytes(self.current_memory),
            format_bytes(self.peak_memory),
            format_bytes(self.average_memory),
            format_percent(self.current_cpu),
            format_percent(self.peak_cpu),
            format_percent(self.average_cpu),
            self.file_handles,
            self.num_threads,
        )
    }
}

/// Summarize a history; `None` when no samples were collected yet
pub fn summarize(history: &[UsageSample]) -> Option<UsageSummary> {
    let last = history.last()?;
    let count = history.len() as u64;

    let total_memory: u64 = history.iter().map(|s| s.memory).sum();
    let total_cpu: f64 = history.iter().map(|s| s.cpu_percent).sum();

    Some(UsageSummary {
        current_memory: last.memory,
        peak_memory: history.iter().map(|s| s.memory).max().unwrap_or(0),
        average_memory: total_memory / count,
        current_cpu: last.cpu_percent,
        peak_cpu: history
            .iter()
            .map(|s| s.cpu_percent)
            .fold(0.0_f64, f64::max),
        average_cpu: total_cpu / count as f64,
        file_handles: last.file_handles,
        num_threads: last.num_threads,
        elapsed_time: last.elapsed_time,
        samples: history.len(),
    })
}

/// Format a byte count with B/KB/MB/GB units
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn format_seconds(value: f64) -> String {
    format!("{:.1}s", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(memory: u64, cpu: f64, elapsed: f64) -> UsageSample {
        UsageSample {
            memory,
            cpu_percent: cpu,
            file_handles: 8,
            num_threads: 2,
            elapsed_time: elapsed,
        }
    }

    #[test]
    fn test_empty_history() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_summary_aggregates() {
        let history = vec![
            sample(100, 10.0, 0.1),
            sample(300, 30.0, 0.2),
            sample(200, 20.0, 0.3),
        ];
        let summary = summarize(&history).unwrap();

        assert_eq!(summary.current_memory, 200);
        assert_eq!(summary.peak_memory, 300);
        assert_eq!(summary.average_memory, 200);
        assert_eq!(summary.current_cpu, 20.0);
        assert_eq!(summary.peak_cpu, 30.0);
        assert_eq!(summary.average_cpu, 20.0);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.elapsed_time, 0.3);
    }

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_report_contains_units() {
        let summary = summarize(&[sample(2048, 12.5, 1.5)]).unwrap();
        let report = summary.format_report();
        assert!(report.contains("2.0 KB"));
        assert!(report.contains("12.5%"));
        assert!(report.contains("1.5s"));
    }
}
