use std::{fmt, io::Write, path::PathBuf, time::Duration};

use orun_core::{CommandLine, Platform};
use orun_exec::{
    Output, ProcConfig,
    util::{exit_code, kill_graceful},
};
use orun_model::JobContext;
use tokio::io::AsyncReadExt;
use tracing::{info, instrument, warn};

use crate::error::DiagError;

/// Marker prefix of the separator line written before each snapshot.
pub const SEPARATOR_PREFIX: &str = "### orun snapshot:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    PreLaunch,
    PostLaunch,
}

impl SnapshotPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPhase::PreLaunch => "pre-launch",
            SnapshotPhase::PostLaunch => "post-launch",
        }
    }

    /// Line that opens this phase in the snapshot log.
    pub fn separator(&self) -> String {
        format!("{SEPARATOR_PREFIX} {}", self.as_str())
    }
}

impl fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot resource snapshot taken on every node and appended to a log.
#[derive(Debug, Clone)]
pub struct SnapshotProbe {
    command: CommandLine,
    log: PathBuf,
    timeout: Duration,
    label_locally: bool,
}

impl SnapshotProbe {
    /// `command` is run through the platform's per-node launcher.
    pub fn new(
        platform: &Platform,
        ctx: &JobContext,
        command: &CommandLine,
        log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: platform.per_node(ctx, command, None),
            log: log.into(),
            timeout: Duration::from_secs(60),
            label_locally: !platform.labels_output(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take the snapshot, logging any failure instead of returning it.
    pub async fn take(&self, phase: SnapshotPhase) {
        match self.try_take(phase).await {
            Ok(lines) => {
                info!(target: "orun.diag.snapshot", %phase, lines, log = %self.log.display(), "snapshot recorded")
            }
            Err(e) => warn!(target: "orun.diag.snapshot", %phase, error = %e, "snapshot failed"),
        }
    }

    /// Take the snapshot and return the number of lines appended.
    #[instrument(level = "debug", skip(self), fields(command = %self.command.program))]
    pub async fn try_take(&self, phase: SnapshotPhase) -> Result<usize, DiagError> {
        let mut log = orun_exec::proc::open_append(&self.log)?;
        writeln!(log, "{}", phase.separator())?;

        let cfg = ProcConfig::from_command(&self.command)
            .with_stdout(Output::Piped)
            .with_stderr(Output::Append(self.log.clone()));
        let mut child = cfg.spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DiagError::Io("snapshot stdout was not captured".into()))?;

        let collect = async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((buf, status))
        };
        let collected = tokio::time::timeout(self.timeout, collect).await;
        let (buf, status) = match collected {
            Ok(done) => done?,
            Err(_) => {
                let _ = kill_graceful(&mut child, Duration::from_secs(1)).await;
                return Err(DiagError::Timeout {
                    what: "snapshot",
                    after: self.timeout,
                });
            }
        };

        let text = String::from_utf8_lossy(&buf);
        let mut lines = 0;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if self.label_locally {
                writeln!(log, "0: {line}")?;
            } else {
                writeln!(log, "{line}")?;
            }
            lines += 1;
        }

        let code = exit_code(status);
        if code != 0 {
            return Err(DiagError::ExitCode {
                what: "snapshot",
                code,
            });
        }
        Ok(lines)
    }
}

/// Default snapshot command: this binary's `mem-probe` subcommand on each node.
pub fn default_command() -> CommandLine {
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "orun".to_string());
    CommandLine::new(exe).arg("mem-probe")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> JobContext {
        JobContext::new("7", 1, 1)
    }

    #[tokio::test]
    async fn appends_labelled_lines_after_separator() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("job_7.snapshot.log");
        let cmd = CommandLine::new("sh")
            .arg("-c")
            .arg("echo 'nid001 | 10MiB | 0MiB | 90MiB | 100MiB'");

        let probe = SnapshotProbe::new(&Platform::Local, &ctx(), &cmd, &log);
        assert_eq!(probe.try_take(SnapshotPhase::PreLaunch).await.unwrap(), 1);
        assert_eq!(probe.try_take(SnapshotPhase::PostLaunch).await.unwrap(), 1);

        let text = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            text,
            "### orun snapshot: pre-launch\n\
             0: nid001 | 10MiB | 0MiB | 90MiB | 100MiB\n\
             ### orun snapshot: post-launch\n\
             0: nid001 | 10MiB | 0MiB | 90MiB | 100MiB\n"
        );
    }

    #[tokio::test]
    async fn slow_probe_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CommandLine::new("sleep").arg("30");
        let probe = SnapshotProbe::new(&Platform::Local, &ctx(), &cmd, dir.path().join("s.log"))
            .with_timeout(Duration::from_millis(200));

        let err = probe.try_take(SnapshotPhase::PreLaunch).await.unwrap_err();
        assert!(matches!(err, DiagError::Timeout { what: "snapshot", .. }));
    }

    #[tokio::test]
    async fn failing_probe_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CommandLine::new("sh").arg("-c").arg("exit 9");
        let probe = SnapshotProbe::new(&Platform::Local, &ctx(), &cmd, dir.path().join("s.log"));

        let err = probe.try_take(SnapshotPhase::PostLaunch).await.unwrap_err();
        assert!(matches!(err, DiagError::ExitCode { code: 9, .. }));
        // `take` swallows the same failure.
        probe.take(SnapshotPhase::PostLaunch).await;
    }

    #[test]
    fn slurm_probe_runs_per_node() {
        let cmd = CommandLine::new("orun").arg("mem-probe");
        let ctx = JobContext::new("7", 2, 4);
        let probe = SnapshotProbe::new(&Platform::slurm(), &ctx, &cmd, "/tmp/x");
        assert_eq!(probe.command.program, "srun");
        assert!(!probe.label_locally);
        assert!(probe.command.args.contains(&"--label".to_string()));
    }
}
