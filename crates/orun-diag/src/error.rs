use std::time::Duration;

use orun_exec::ExecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
    #[error("{what} exited with code {code}")]
    ExitCode { what: &'static str, code: i32 },
    #[error("io error: {0}")]
    Io(String),
    #[error("malformed line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl From<std::io::Error> for DiagError {
    fn from(e: std::io::Error) -> Self {
        DiagError::Io(e.to_string())
    }
}
