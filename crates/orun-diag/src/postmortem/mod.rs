//! Deferred snapshot submitted as a separate batch job.
//!
//! When the main job is torn down by a signal the nodes may still hold stale state.
//! The post-mortem job lands on the same nodes once the allocation is released and records a snapshot into the `.mem` log.
use std::{path::PathBuf, time::Duration};

use orun_core::{CommandLine, Platform};
use orun_exec::{
    Output, ProcConfig,
    util::{exit_code, kill_graceful},
};
use orun_model::JobContext;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::DiagError;

#[derive(Debug, Clone)]
pub struct PostMortem {
    submission: Option<CommandLine>,
    timeout: Duration,
}

impl PostMortem {
    /// `command` is the snapshot to run once the job window has passed `delay`.
    pub fn new(
        platform: &Platform,
        ctx: &JobContext,
        command: &CommandLine,
        delay: Duration,
        output: impl Into<PathBuf>,
    ) -> Self {
        let output = output.into();
        Self {
            submission: platform.deferred_submission(ctx, command, delay, &output),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The submission command, if the platform has a batch scheduler.
    pub fn submission(&self) -> Option<&CommandLine> {
        self.submission.as_ref()
    }

    /// Submit and forget; failures are logged.
    pub async fn schedule(&self) {
        match self.submit().await {
            Ok(Some(id)) => info!(target: "orun.diag.postmortem", job = %id, "post-mortem snapshot scheduled"),
            Ok(None) => debug!(target: "orun.diag.postmortem", "no batch scheduler; post-mortem skipped"),
            Err(e) => warn!(target: "orun.diag.postmortem", error = %e, "post-mortem submission failed"),
        }
    }

    /// Submit the deferred job. Returns the scheduler's job id, or `None` where no scheduler exists.
    pub async fn submit(&self) -> Result<Option<String>, DiagError> {
        let Some(cmd) = &self.submission else {
            return Ok(None);
        };

        let mut child = ProcConfig::from_command(cmd)
            .with_stdout(Output::Piped)
            .spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DiagError::Io("submission stdout was not captured".into()))?;

        let collect = async {
            let mut out = String::new();
            stdout.read_to_string(&mut out).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out, status))
        };
        let collected = tokio::time::timeout(self.timeout, collect).await;
        let (out, status) = match collected {
            Ok(done) => done?,
            Err(_) => {
                let _ = kill_graceful(&mut child, Duration::from_secs(1)).await;
                return Err(DiagError::Timeout {
                    what: "post-mortem submission",
                    after: self.timeout,
                });
            }
        };

        let code = exit_code(status);
        if code != 0 {
            return Err(DiagError::ExitCode {
                what: "post-mortem submission",
                code,
            });
        }
        // `--parsable` prints `<id>` or `<id>;<cluster>`.
        let id = out.trim().split(';').next().unwrap_or_default().to_string();
        Ok(Some(id))
    }
}
