/*!
 * Process Probe
 * OS-level sampling and termination of a live process (procfs on Linux)
 */

use crate::core::errors::{MonitorError, MonitorResult};
use crate::core::types::Pid;
use crate::monitor::usage::UsageSample;
use log::debug;
use std::time::{Duration, Instant};

/// Linux USER_HZ; /proc CPU times are reported in these ticks
#[cfg(target_os = "linux")]
const CLK_TCK: f64 = 100.0;

#[cfg(target_os = "linux")]
const PAGE_SIZE: u64 = 4096;

/// Samples one OS process's resource consumption
///
/// Owned by the monitor's poll thread; CPU percent is derived from the tick
/// delta between consecutive samples.
#[derive(Debug)]
pub struct ProcessProbe {
    pid: Pid,
    started_at: Instant,
    #[cfg(target_os = "linux")]
    last_cpu: Option<(u64, Instant)>,
}

impl ProcessProbe {
    /// Attach to a process, verifying it exists
    pub fn attach(pid: Pid) -> MonitorResult<Self> {
        if !process_exists(pid) {
            return Err(MonitorError::ProcessNotFound(pid));
        }
        Ok(Self {
            pid,
            started_at: Instant::now(),
            #[cfg(target_os = "linux")]
            last_cpu: None,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Collect one usage sample
    ///
    /// Fails only when the process itself is gone; a sub-metric the OS
    /// denies access to degrades to zero instead of aborting the sample.
    pub fn sample(&mut self) -> MonitorResult<UsageSample> {
        let elapsed_time = self.started_at.elapsed().as_secs_f64();

        #[cfg(target_os = "linux")]
        {
            let stat = read_proc_stat(self.pid)?;
            let now = Instant::now();
            let cpu_percent = match self.last_cpu {
                Some((last_ticks, last_at)) => {
                    let dt = now.duration_since(last_at).as_secs_f64();
                    if dt > 0.0 {
                        (stat.cpu_ticks.saturating_sub(last_ticks) as f64 / CLK_TCK) / dt * 100.0
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
            self.last_cpu = Some((stat.cpu_ticks, now));

            Ok(UsageSample {
                memory: stat.rss_pages * PAGE_SIZE,
                cpu_percent,
                file_handles: count_file_handles(self.pid),
                num_threads: stat.num_threads,
                elapsed_time,
            })
        }

        #[cfg(not(target_os = "linux"))]
        {
            // No procfs: liveness check only, metrics degrade to zero
            if !process_exists(self.pid) {
                return Err(MonitorError::ProcessNotFound(self.pid));
            }
            Ok(UsageSample {
                memory: 0,
                cpu_percent: 0.0,
                file_handles: 0,
                num_threads: 0,
                elapsed_time,
            })
        }
    }
}

#[cfg(target_os = "linux")]
struct ProcStat {
    cpu_ticks: u64,
    num_threads: u32,
    rss_pages: u64,
}

/// Parse /proc/<pid>/stat
///
/// The comm field may contain spaces and parentheses, so fields are taken
/// from after the last ')'. In the tail, 0-indexed field N corresponds to
/// overall field N+3: utime=14, stime=15, num_threads=20, rss=24.
#[cfg(target_os = "linux")]
fn read_proc_stat(pid: Pid) -> MonitorResult<ProcStat> {
    let raw = std::fs::read_to_string(format!("/proc/{}/stat", pid)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MonitorError::ProcessNotFound(pid)
        } else {
            MonitorError::Io(e.to_string())
        }
    })?;

    let tail = raw
        .rfind(')')
        .map(|pos| &raw[pos + 1..])
        .ok_or_else(|| MonitorError::Io(format!("malformed stat for PID {}", pid)))?;
    let fields: Vec<&str> = tail.split_whitespace().collect();
    if fields.len() < 22 {
        return Err(MonitorError::Io(format!("truncated stat for PID {}", pid)));
    }

    let utime: u64 = fields[11].parse().unwrap_or(0);
    let stime: u64 = fields[12].parse().unwrap_or(0);

    Ok(ProcStat {
        cpu_ticks: utime + stime,
        num_threads: fields[17].parse().unwrap_or(0),
        rss_pages: fields[21].parse().unwrap_or(0),
    })
}

/// Count entries in /proc/<pid>/fd; degrades to zero on access denial
#[cfg(target_os = "linux")]
fn count_file_handles(pid: Pid) -> u32 {
    match std::fs::read_dir(format!("/proc/{}/fd", pid)) {
        Ok(entries) => entries.count() as u32,
        Err(e) => {
            debug!("file handle count unavailable for PID {}: {}", pid, e);
            0
        }
    }
}

/// True if a process with this PID exists
///
/// EPERM means the process exists but belongs to someone else.
#[cfg(unix)]
pub fn process_exists(pid: Pid) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    match kill(nix::unistd::Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn process_exists(_pid: Pid) -> bool {
    false
}

/// Two-phase termination: SIGTERM, bounded grace wait, then SIGKILL
///
/// A process that exits on its own during the grace window (or was already
/// gone) counts as success.
#[cfg(unix)]
pub fn terminate(pid: Pid, grace: Duration) -> MonitorResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};

    let target = nix::unistd::Pid::from_raw(pid as i32);

    match kill(target, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(()),
        Err(e) => return Err(MonitorError::Io(e.to_string())),
    }

    let deadline = Instant::now() + grace;
    while process_exists(pid) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    if process_exists(pid) {
        debug!("PID {} survived SIGTERM, escalating to SIGKILL", pid);
        match kill(target, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(MonitorError::Io(e.to_string())),
        }
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn terminate(_pid: Pid, _grace: Duration) -> MonitorResult<()> {
    Err(MonitorError::Io(
        "process termination not supported on this platform".to_string(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_attach_to_missing_process() {
        // PIDs above the default pid_max cannot exist
        let err = ProcessProbe::attach(4_194_304 + 1).unwrap_err();
        assert!(matches!(err, MonitorError::ProcessNotFound(_)));
    }

    #[test]
    fn test_attach_to_self() {
        let probe = ProcessProbe::attach(std::process::id());
        assert!(probe.is_ok());
    }

    #[test]
    fn test_sample_own_process() {
        let mut probe = ProcessProbe::attach(std::process::id()).unwrap();
        let sample = probe.sample().unwrap();
        assert!(sample.elapsed_time >= 0.0);
        #[cfg(target_os = "linux")]
        {
            assert!(sample.memory > 0);
            assert!(sample.num_threads >= 1);
        }
    }

    #[test]
    fn test_terminate_already_gone_is_success() {
        let result = terminate(4_194_304 + 1, Duration::from_millis(50));
        assert!(result.is_ok());
    }

    #[test]
    fn test_terminate_live_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        terminate(pid, Duration::from_millis(500)).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!process_exists(pid));
    }
}
