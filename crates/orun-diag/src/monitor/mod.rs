//! Long-running diagnostic collector with an explicit lifecycle.
//!
//! ```text
//! Disabled ──(any op)──▶ Disabled
//! Starting ──spawn ok──▶ Running ──stop──▶ Stopped
//!     └──spawn err──▶ Failed
//! ```
//!
//! The collector runs as leader of its own process group; stopping it signals the whole group.
//! An optional deadline arms a watchdog that terminates the group once the allocation runs out.
use std::time::{Duration, Instant};

use orun_exec::{ProcConfig, util::{exit_code, kill_graceful, signal_group}};
use orun_model::{MonitorKind, MonitorState};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of a running collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorHandle {
    /// Process-group leader.
    pub pid: u32,
    pub started_at: Instant,
}

pub struct BackgroundMonitor {
    kind: MonitorKind,
    config: Option<ProcConfig>,
    grace: Duration,
    deadline: Option<Duration>,
    state: MonitorState,
    child: Option<Child>,
    handle: Option<MonitorHandle>,
    watchdog: Option<CancellationToken>,
}

impl BackgroundMonitor {
    /// A monitor that will run `config` once started.
    pub fn new(kind: MonitorKind, config: ProcConfig) -> Self {
        Self {
            kind,
            config: Some(config),
            grace: Duration::from_secs(5),
            deadline: None,
            state: MonitorState::Starting,
            child: None,
            handle: None,
            watchdog: None,
        }
    }

    /// A monitor whose enable flag is off.
    pub fn disabled(kind: MonitorKind) -> Self {
        Self {
            kind,
            config: None,
            grace: Duration::from_secs(5),
            deadline: None,
            state: MonitorState::Disabled,
            child: None,
            handle: None,
            watchdog: None,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Terminate the collector after `deadline` even if nobody stops it.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn handle(&self) -> Option<MonitorHandle> {
        self.handle
    }

    /// Spawn the collector. Failures move the monitor to `Failed` and are only logged.
    ///
    /// Must be called within a tokio runtime when a deadline is set.
    pub fn start(&mut self) -> MonitorState {
        if self.state != MonitorState::Starting || self.child.is_some() {
            return self.state;
        }
        let Some(cfg) = &self.config else {
            self.state = MonitorState::Disabled;
            return self.state;
        };

        let spawned = cfg.spawn().and_then(|child| {
            child
                .id()
                .map(|pid| (child, pid))
                .ok_or_else(|| orun_exec::ExecError::Spawn {
                    program: cfg.program.clone(),
                    reason: "exited before its pid could be read".into(),
                })
        });
        match spawned {
            Ok((child, pid)) => {
                self.handle = Some(MonitorHandle {
                    pid,
                    started_at: Instant::now(),
                });
                self.child = Some(child);
                self.state = MonitorState::Running;
                if let Some(deadline) = self.deadline {
                    self.watchdog = Some(arm_watchdog(self.kind, pid, deadline, self.grace));
                }
                info!(target: "orun.diag.monitor", kind = self.kind.as_str(), pid, "monitor started");
            }
            Err(e) => {
                self.state = MonitorState::Failed;
                warn!(target: "orun.diag.monitor", kind = self.kind.as_str(), error = %e, "monitor failed to start; continuing without it");
            }
        }
        self.state
    }

    /// Terminate the collector group and reap it. Idempotent.
    pub async fn stop(&mut self) -> MonitorState {
        if let Some(token) = self.watchdog.take() {
            token.cancel();
        }
        let Some(mut child) = self.child.take() else {
            if !self.state.is_terminal() {
                self.state = MonitorState::Stopped;
            }
            return self.state;
        };

        match kill_graceful(&mut child, self.grace).await {
            Ok(status) => {
                debug!(target: "orun.diag.monitor", kind = self.kind.as_str(), code = exit_code(status), "monitor reaped");
            }
            Err(e) => {
                warn!(target: "orun.diag.monitor", kind = self.kind.as_str(), error = %e, "monitor could not be reaped");
            }
        }
        self.state = MonitorState::Stopped;
        info!(target: "orun.diag.monitor", kind = self.kind.as_str(), "monitor stopped");
        self.state
    }

    /// Send SIGTERM to a live collector group without waiting.
    pub fn terminate_now(&mut self) {
        if let Some(token) = self.watchdog.take() {
            token.cancel();
        }
        if let (Some(handle), true) = (self.handle, self.child.is_some()) {
            let _ = signal_group(handle.pid, libc::SIGTERM);
        }
    }
}

impl Drop for BackgroundMonitor {
    fn drop(&mut self) {
        if self.state.is_live() && self.child.is_some() {
            debug!(target: "orun.diag.monitor", kind = self.kind.as_str(), "monitor dropped while running; terminating");
            self.terminate_now();
        }
    }
}

fn arm_watchdog(
    kind: MonitorKind,
    pid: u32,
    deadline: Duration,
    grace: Duration,
) -> CancellationToken {
    let token = CancellationToken::new();
    let disarmed = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = disarmed.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                warn!(target: "orun.diag.monitor", kind = kind.as_str(), pid, "allocation deadline reached; terminating monitor");
                let _ = signal_group(pid, libc::SIGTERM);
                tokio::select! {
                    _ = disarmed.cancelled() => {}
                    _ = tokio::time::sleep(grace) => {
                        let _ = signal_group(pid, libc::SIGKILL);
                    }
                }
            }
        }
    });
    token
}
