use orun_exec::ExecError;
use orun_model::ConfigError;
use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG: i32 = 2;
/// Exit code when the worker group could not be spawned.
pub const EXIT_SPAWN: i32 = 127;
/// Exit code of a job cancelled before any worker started (`128 + SIGTERM`).
pub const EXIT_INTERRUPTED: i32 = 143;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("worker launch failed: {0}")]
    Exec(#[from] ExecError),
}

impl LaunchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Config(_) => EXIT_CONFIG,
            LaunchError::Exec(_) => EXIT_SPAWN,
        }
    }
}
