use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("missing program")]
    MissingProgram,
    #[error("spawn failed for {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("wait failed: {0}")]
    Wait(String),
    #[error("output redirection failed: {0}")]
    Output(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
