/*!
 * Resource Monitor
 * Watches a live OS process on a background thread and enforces hard
 * resource ceilings by terminating it
 */

use crate::core::errors::{MonitorError, MonitorResult, ResourceLimitExceeded};
use crate::core::types::Pid;
use crate::monitor::limits::ResourceLimits;
use crate::monitor::probe::{self, ProcessProbe};
use crate::monitor::usage::{self, UsageSample, UsageSummary};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Monitor configuration knobs
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between samples; interruptible by the stop signal
    pub poll_interval: Duration,
    /// How long a SIGTERM'd process gets before SIGKILL
    pub grace_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_millis(500),
        }
    }
}

#[derive(Default)]
struct MonitorState {
    history: Mutex<Vec<UsageSample>>,
    violation: Mutex<Option<ResourceLimitExceeded>>,
}

struct Worker {
    pid: Pid,
    stop_tx: flume::Sender<()>,
    handle: JoinHandle<()>,
}

/// Per-process resource enforcement
///
/// `idle -> monitoring -> idle`; re-entrant after `stop_monitoring` or
/// `reset_monitoring`. Enforcement is independent of the capability layer:
/// a breach terminates the process no matter what authorization says.
pub struct ResourceMonitor {
    limits: ResourceLimits,
    config: MonitorConfig,
    state: Arc<MonitorState>,
    worker: Option<Worker>,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self::with_config(limits, MonitorConfig::default())
    }

    pub fn with_config(limits: ResourceLimits, config: MonitorConfig) -> Self {
        Self {
            limits,
            config,
            state: Arc::new(MonitorState::default()),
            worker: None,
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Attach to a process and start the polling loop
    pub fn start_monitoring(&mut self, pid: Pid) -> MonitorResult<()> {
        if let Some(worker) = &self.worker {
            if !worker.handle.is_finished() {
                return Err(MonitorError::AlreadyMonitoring(worker.pid));
            }
            // Previous loop already exited (breach or process death); reap it
            self.join_worker();
        }

        let probe = ProcessProbe::attach(pid)?;
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let state = Arc::clone(&self.state);
        let limits = self.limits.clone();
        let poll_interval = self.config.poll_interval;
        let grace_period = self.config.grace_period;

        let handle = std::thread::Builder::new()
            .name(format!("resmon-{}", pid))
            .spawn(move || poll_loop(probe, stop_rx, state, limits, poll_interval, grace_period))
            .map_err(|e| MonitorError::Io(e.to_string()))?;

        self.worker = Some(Worker {
            pid,
            stop_tx,
            handle,
        });
        info!("started monitoring PID {}", pid);
        Ok(())
    }

    /// Signal the polling loop and join it; no thread lingers after return
    pub fn stop_monitoring(&mut self) -> MonitorResult<()> {
        if self.worker.is_none() {
            return Err(MonitorError::NotMonitoring);
        }
        self.join_worker();
        Ok(())
    }

    /// Stop (if running) and discard history and any recorded violation
    pub fn reset_monitoring(&mut self) {
        self.join_worker();
        self.state.history.lock().clear();
        *self.state.violation.lock() = None;
    }

    pub fn is_monitoring(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// Aggregated usage; `None` before the first sample
    pub fn get_usage(&self) -> Option<UsageSummary> {
        usage::summarize(&self.state.history.lock())
    }

    /// Copy of the sample history (never the live list)
    pub fn get_usage_history(&self) -> Vec<UsageSample> {
        self.state.history.lock().clone()
    }

    /// The breach that terminated the process, if one happened
    pub fn last_violation(&self) -> Option<ResourceLimitExceeded> {
        self.state.violation.lock().clone()
    }

    /// Human-readable usage summary
    pub fn format_usage_report(&self) -> String {
        match self.get_usage() {
            Some(summary) => summary.format_report(),
            None => "no samples collected".to_string(),
        }
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                warn!("monitor thread for PID {} panicked", worker.pid);
            }
            info!("stopped monitoring PID {}", worker.pid);
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.join_worker();
    }
}

fn poll_loop(
    mut probe: ProcessProbe,
    stop_rx: flume::Receiver<()>,
    state: Arc<MonitorState>,
    limits: ResourceLimits,
    poll_interval: Duration,
    grace_period: Duration,
) {
    let pid = probe.pid();
    loop {
        match probe.sample() {
            Ok(sample) => {
                let breach = limits.check(&sample);
                state.history.lock().push(sample);

                if let Err(violation) = breach {
                    warn!("PID {} breached limits: {}", pid, violation);
                    *state.violation.lock() = Some(violation);
                    if let Err(e) = probe::terminate(pid, grace_period) {
                        warn!("failed to terminate PID {}: {}", pid, e);
                    }
                    break;
                }
            }
            Err(e) => {
                debug!("sampling ended for PID {}: {}", pid, e);
                break;
            }
        }

        // Interruptible sleep: a stop signal (or a dropped sender) wakes us
        match stop_rx.recv_timeout(poll_interval) {
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
}
