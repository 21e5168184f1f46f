use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::Stdio,
};

use orun_core::CommandLine;
use orun_model::WorkerEnv;
use tokio::process::{Child, Command};
use tracing::trace;

use crate::error::ExecError;

/// Where a child's output stream goes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Output {
    /// Share the orchestrator's stream (ends up in the platform job log).
    #[default]
    Inherit,
    /// Discard.
    Null,
    /// Capture through a pipe on the returned child.
    Piped,
    /// Append to a plain-text file, creating it and its directory if needed.
    Append(PathBuf),
}

impl Output {
    fn to_stdio(&self) -> Result<Stdio, ExecError> {
        match self {
            Output::Inherit => Ok(Stdio::inherit()),
            Output::Null => Ok(Stdio::null()),
            Output::Piped => Ok(Stdio::piped()),
            Output::Append(path) => Ok(Stdio::from(open_append(path)?)),
        }
    }
}

pub fn open_append(path: &Path) -> Result<std::fs::File, ExecError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| ExecError::Output(format!("{}: {e}", parent.display())))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ExecError::Output(format!("{}: {e}", path.display())))
}

/// Process configuration.
#[derive(Clone, Debug)]
pub struct ProcConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Layered on top of the inherited environment.
    pub env: WorkerEnv,
    pub cwd: Option<PathBuf>,
    pub stdout: Output,
    pub stderr: Output,
    /// Start the child as leader of a fresh process group so the whole tree can be signalled at once.
    pub own_group: bool,
    /// SIGKILL the child if its handle is dropped before it was reaped.
    pub kill_on_drop: bool,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            env: WorkerEnv::new(),
            cwd: None,
            stdout: Output::Inherit,
            stderr: Output::Inherit,
            own_group: true,
            kill_on_drop: false,
        }
    }
}

impl ProcConfig {
    pub fn from_command(cmd: &CommandLine) -> Self {
        Self {
            program: cmd.program.clone(),
            args: cmd.args.clone(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: WorkerEnv) -> Self {
        self.env = env;
        self
    }

    pub fn with_stdout(mut self, out: Output) -> Self {
        self.stdout = out;
        self
    }

    pub fn with_stderr(mut self, out: Output) -> Self {
        self.stderr = out;
        self
    }

    pub fn with_kill_on_drop(mut self, enabled: bool) -> Self {
        self.kill_on_drop = enabled;
        self
    }

    /// Build the tokio command without spawning it.
    pub fn command(&self) -> Result<Command, ExecError> {
        if self.program.trim().is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in self.env.resolved() {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(self.stdout.to_stdio()?);
        cmd.stderr(self.stderr.to_stdio()?);
        cmd.kill_on_drop(self.kill_on_drop);

        #[cfg(unix)]
        if self.own_group {
            cmd.process_group(0);
        }
        Ok(cmd)
    }

    pub fn spawn(&self) -> Result<Child, ExecError> {
        trace!(target: "orun.exec.proc", program = %self.program, args = ?self.args, "spawn");
        self.command()?.spawn().map_err(|e| ExecError::Spawn {
            program: self.program.clone(),
            reason: e.to_string(),
        })
    }
}
