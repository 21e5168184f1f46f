use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use orun_core::{CommandLine, LogLayout, Platform, system};
use orun_exec::{Output, ProcConfig};
use orun_model::{JobContext, MonitorKind, MonitorState};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    monitor::BackgroundMonitor,
    postmortem::PostMortem,
    snapshot::{SnapshotPhase, SnapshotProbe},
};

/// How the worker group ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobExit {
    /// Workers ran to completion (successfully or not).
    Completed { code: i32 },
    /// Workers were torn down by a termination signal.
    Interrupted { code: i32 },
}

impl JobExit {
    pub fn code(&self) -> i32 {
        match self {
            JobExit::Completed { code } | JobExit::Interrupted { code } => *code,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, JobExit::Interrupted { .. })
    }
}

/// Lifecycle callbacks around the worker group.
#[async_trait]
pub trait JobHooks: Send + Sync {
    /// Runs before any worker is spawned.
    async fn start(&self);
    /// Runs once the workers are gone. Only the first call has an effect.
    async fn finish(&self, exit: JobExit);
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Kernel-log collector; `None` disables the monitor regardless of the job flag.
    pub kernel_log: Option<CommandLine>,
    /// Resource snapshot command, also used for the post-mortem.
    pub snapshot: Option<CommandLine>,
    pub snapshot_timeout: Duration,
    pub post_mortem_delay: Duration,
    pub grace: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            kernel_log: Some(CommandLine::new("dmesg").arg("--follow").arg("--ctime")),
            snapshot: Some(crate::snapshot::default_command()),
            snapshot_timeout: Duration::from_secs(60),
            post_mortem_delay: Duration::from_secs(90),
            grace: Duration::from_secs(5),
        }
    }
}

/// Owns every diagnostic collector of one job.
pub struct Diagnostics {
    kernel_log: Mutex<BackgroundMonitor>,
    snapshot: Option<SnapshotProbe>,
    post_mortem: Option<PostMortem>,
    finished: AtomicBool,
    finish_runs: AtomicUsize,
}

impl Diagnostics {
    pub fn new(
        ctx: &JobContext,
        platform: &Platform,
        layout: &LogLayout,
        cfg: &DiagnosticsConfig,
    ) -> Self {
        let kernel_log = match (&cfg.kernel_log, ctx.kernel_log_monitor.is_enabled()) {
            (Some(cmd), true) => {
                let remaining = ctx.remaining_at(system::now_unix());
                let proc = ProcConfig::from_command(&platform.per_node(ctx, cmd, remaining))
                    .with_stdout(Output::Append(layout.monitor_log(MonitorKind::KernelLog)))
                    .with_stderr(Output::Append(layout.monitor_log(MonitorKind::KernelLog)));
                BackgroundMonitor::new(MonitorKind::KernelLog, proc)
                    .with_grace(cfg.grace)
                    .with_deadline(remaining)
            }
            _ => BackgroundMonitor::disabled(MonitorKind::KernelLog),
        };

        let snapshot_cmd = cfg
            .snapshot
            .as_ref()
            .filter(|_| ctx.memory_snapshot.is_enabled());
        let snapshot = snapshot_cmd.map(|cmd| {
            let log = layout.monitor_log(MonitorKind::ResourceSnapshot);
            SnapshotProbe::new(platform, ctx, cmd, log).with_timeout(cfg.snapshot_timeout)
        });
        let post_mortem = snapshot_cmd.map(|cmd| {
            PostMortem::new(platform, ctx, cmd, cfg.post_mortem_delay, layout.post_mortem_log())
        });

        Self {
            kernel_log: Mutex::new(kernel_log),
            snapshot,
            post_mortem,
            finished: AtomicBool::new(false),
            finish_runs: AtomicUsize::new(0),
        }
    }

    /// Nothing enabled; hooks are no-ops.
    pub fn disabled() -> Self {
        Self {
            kernel_log: Mutex::new(BackgroundMonitor::disabled(MonitorKind::KernelLog)),
            snapshot: None,
            post_mortem: None,
            finished: AtomicBool::new(false),
            finish_runs: AtomicUsize::new(0),
        }
    }

    pub async fn kernel_log_state(&self) -> MonitorState {
        self.kernel_log.lock().await.state()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Number of times the cleanup body actually ran.
    pub fn finish_runs(&self) -> usize {
        self.finish_runs.load(Ordering::Acquire)
    }
}

#[async_trait]
impl JobHooks for Diagnostics {
    #[instrument(level = "debug", skip(self), target = "orun.diag")]
    async fn start(&self) {
        if let Some(probe) = &self.snapshot {
            probe.take(SnapshotPhase::PreLaunch).await;
        }
        let state = self.kernel_log.lock().await.start();
        debug!(target: "orun.diag", ?state, "kernel-log monitor");
    }

    #[instrument(level = "debug", skip(self), target = "orun.diag")]
    async fn finish(&self, exit: JobExit) {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(target: "orun.diag", "cleanup already ran");
            return;
        }
        self.finish_runs.fetch_add(1, Ordering::AcqRel);
        info!(
            target: "orun.diag",
            code = exit.code(),
            interrupted = exit.is_interrupted(),
            "running job cleanup"
        );

        // Must precede the monitor stop and the post-launch snapshot.
        if exit.is_interrupted()
            && let Some(pm) = &self.post_mortem
        {
            pm.schedule().await;
        }
        self.kernel_log.lock().await.stop().await;
        if let Some(probe) = &self.snapshot {
            probe.take(SnapshotPhase::PostLaunch).await;
        }
    }
}

impl Drop for Diagnostics {
    fn drop(&mut self) {
        if !self.is_finished() {
            warn!(target: "orun.diag", "diagnostics dropped before cleanup");
            self.kernel_log.get_mut().terminate_now();
        }
    }
}
