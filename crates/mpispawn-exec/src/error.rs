use mpispawn_core::RuntimeError;
use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn {program} failed: {reason}")]
    Spawn { program: String, reason: String },
    #[error("wait failed: {0}")]
    Wait(String),
    #[error("missing program")]
    MissingProgram,
    #[error("{var}: invalid value '{value}'")]
    InvalidAmbient { var: &'static str, value: String },
    #[error("rank {rank} is outside a group of {size}")]
    RankOutOfRange { rank: usize, size: usize },
    #[error("unknown process group {0}")]
    UnknownGroup(u64),
    #[error("io error: {0}")]
    Io(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for RuntimeError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Cancelled => RuntimeError::Cancelled,
            ExecError::UnknownGroup(id) => RuntimeError::UnknownGroup(id),
            ExecError::Wait(_) | ExecError::Io(_) => RuntimeError::Gather(e.to_string()),
            other => RuntimeError::Spawn(other.to_string()),
        }
    }
}
