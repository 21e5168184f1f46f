//! Per-task shim run by the collective launcher: `orun rank -- <worker...>`.
//!
//! Reads the task identity from the launcher's variables, exports it in the worker's
//! vocabulary and replaces itself with the worker.
use std::process::Command;

use orun_core::{CommandLine, rank};
use orun_exec::ExecError;
use orun_model::RankIdentity;
use tracing::debug;

use crate::error::LaunchError;

/// Worker command with the rank identity layered on top of the inherited environment.
pub fn command(worker: &CommandLine, id: &RankIdentity) -> Command {
    let mut cmd = Command::new(&worker.program);
    cmd.args(&worker.args);
    for (k, v) in id.to_env().resolved() {
        cmd.env(k, v);
    }
    cmd
}

/// Resolve the identity and exec the worker. Only returns on failure.
pub fn exec<F>(worker: &CommandLine, lookup: F) -> Result<i32, LaunchError>
where
    F: Fn(&str) -> Option<String>,
{
    let id = rank::from_platform(lookup)?;
    debug!(target: "orun.launch.rank", rank = id.rank, local_rank = id.local_rank, "exec worker");
    let mut cmd = command(worker, &id);

    let spawn_err = |e: std::io::Error| {
        LaunchError::Exec(ExecError::Spawn {
            program: worker.program.clone(),
            reason: e.to_string(),
        })
    };

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        Err(spawn_err(cmd.exec()))
    }
    #[cfg(not(unix))]
    {
        let status = cmd.status().map_err(spawn_err)?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, ffi::OsStr};

    use super::*;

    #[test]
    fn command_exports_identity() {
        let id = RankIdentity {
            rank: 5,
            world_size: 8,
            local_rank: 1,
            local_world_size: 4,
            node_rank: 1,
        };
        let worker = CommandLine::new("python").arg("train.py");
        let cmd = command(&worker, &id);

        assert_eq!(cmd.get_program(), OsStr::new("python"));
        let envs: HashMap<_, _> = cmd
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect();
        assert_eq!(envs["RANK"], "5");
        assert_eq!(envs["WORLD_SIZE"], "8");
        assert_eq!(envs["LOCAL_RANK"], "1");
        assert_eq!(envs["NODE_RANK"], "1");
    }

    #[test]
    fn missing_identity_is_a_configuration_error() {
        let err = exec(&CommandLine::new("true"), |_| None).unwrap_err();
        assert!(matches!(err, LaunchError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
