//! Worker process group with aggregate exit status.
use std::time::Duration;

use tokio::{process::Child, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::ExecError,
    proc::ProcConfig,
    util::{exit_code, kill_graceful},
};

/// How one member of the group ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberExit {
    pub code: i32,
    /// `true` if the group terminated this member (cancellation or a failing sibling).
    pub terminated: bool,
}

/// Result of running the whole group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    /// Aggregate code: the first member to fail on its own, otherwise `0`.
    /// When the group was interrupted and no member failed on its own, the code of the terminated members.
    pub exit_code: i32,
    /// At least one member was terminated because of external cancellation.
    pub interrupted: bool,
    /// Per-member exits in member order.
    pub members: Vec<MemberExit>,
}

impl GroupOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A set of processes started together and stopped together.
pub struct WorkerGroup {
    members: Vec<ProcConfig>,
    grace: Duration,
    kill_on_bad_exit: bool,
}

impl WorkerGroup {
    /// Members are killed if the group is dropped while they still run.
    pub fn new(members: Vec<ProcConfig>) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|m| m.with_kill_on_drop(true))
                .collect(),
            grace: Duration::from_secs(10),
            kill_on_bad_exit: true,
        }
    }

    /// Time between SIGTERM and SIGKILL when stopping members.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Terminate the remaining members as soon as one exits non-zero.
    pub fn with_kill_on_bad_exit(mut self, enabled: bool) -> Self {
        self.kill_on_bad_exit = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Spawn every member and wait for all of them.
    ///
    /// Cancelling `cancel` terminates the group; the call still returns only after every member has been reaped.
    /// A member that cannot be spawned aborts the launch: already started members are terminated and the spawn error is returned.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<GroupOutcome, ExecError> {
        let children = self.spawn_all().await?;
        info!(target: "orun.exec.group", members = children.len(), "worker group started");

        let stop = cancel.child_token();
        let mut set = JoinSet::new();
        for (idx, mut child) in children.into_iter().enumerate() {
            let stop = stop.clone();
            let external = cancel.clone();
            let grace = self.grace;
            set.spawn(async move {
                let (exit, by_signal) = tokio::select! {
                    status = child.wait() => {
                        let exit = status.map(|s| MemberExit {
                            code: exit_code(s),
                            terminated: false,
                        });
                        (exit, false)
                    }
                    _ = stop.cancelled() => {
                        let by_signal = external.is_cancelled();
                        let exit = kill_graceful(&mut child, grace)
                            .await
                            .map(|s| MemberExit {
                                code: exit_code(s),
                                terminated: true,
                            });
                        (exit, by_signal)
                    }
                };
                (idx, exit, by_signal)
            });
        }

        let mut exits: Vec<Option<MemberExit>> = vec![None; set.len()];
        let mut first_failure: Option<i32> = None;
        let mut interrupted = false;
        let mut wait_error: Option<ExecError> = None;
        while let Some(joined) = set.join_next().await {
            let joined = joined
                .map_err(|e| ExecError::Wait(e.to_string()))
                .and_then(|(idx, exit, by_signal)| {
                    exit.map(|exit| (idx, exit, by_signal))
                        .map_err(|e| ExecError::Wait(e.to_string()))
                });
            let (idx, exit, by_signal) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(target: "orun.exec.group", error = %e, "lost track of a member; stopping group");
                    stop.cancel();
                    wait_error.get_or_insert(e);
                    continue;
                }
            };

            interrupted |= by_signal;
            if exit.code != 0 && !exit.terminated {
                debug!(target: "orun.exec.group", member = idx, code = exit.code, "member failed");
                if first_failure.is_none() {
                    first_failure = Some(exit.code);
                    if self.kill_on_bad_exit {
                        stop.cancel();
                    }
                }
            }
            exits[idx] = Some(exit);
        }
        if let Some(e) = wait_error {
            return Err(e);
        }

        let members: Vec<MemberExit> = exits.into_iter().flatten().collect();
        let exit_code = match first_failure {
            Some(code) => code,
            None if interrupted => members
                .iter()
                .find(|m| m.code != 0)
                .map(|m| m.code)
                .unwrap_or(0),
            None => 0,
        };

        if exit_code == 0 {
            info!(target: "orun.exec.group", "worker group finished");
        } else {
            warn!(target: "orun.exec.group", exit_code, interrupted, "worker group failed");
        }
        Ok(GroupOutcome {
            exit_code,
            interrupted,
            members,
        })
    }

    async fn spawn_all(&self) -> Result<Vec<Child>, ExecError> {
        let mut children = Vec::with_capacity(self.members.len());
        for member in &self.members {
            match member.spawn() {
                Ok(child) => children.push(child),
                Err(e) => {
                    warn!(target: "orun.exec.group", error = %e, "spawn failed; tearing down group");
                    for mut child in children {
                        let _ = kill_graceful(&mut child, self.grace).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(children)
    }
}
