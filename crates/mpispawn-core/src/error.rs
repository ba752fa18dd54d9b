use thiserror::Error;

use crate::runtime::RuntimeError;

/// Category of a fatal condition.
///
/// Everything except `Launch` and `Completion` is detected before the first spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing command-line arguments.
    Usage,
    /// Arguments that are well-formed on their own but contradict each other.
    Consistency,
    /// Universe size cannot be determined from the environment.
    Environment,
    /// A process group failed to start.
    Launch,
    /// Results of a started group could not be collected.
    Completion,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing required argument {arg}")]
    MissingArgument { arg: &'static str },

    #[error("argument {arg}: expected one argument")]
    MissingValue { arg: &'static str },

    #[error("argument {arg}: invalid value '{value}' is not {expected}")]
    InvalidValue {
        arg: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("argument -nW: shouldn't be specified as a tuple and for each command")]
    TupleAndPerCommand,

    #[error("argument -nW: specified for some commands but not all")]
    PartialPerCommand,

    #[error(
        "argument -nW: sum of COMM_WORLD sizes is {total}, which is greater than MPI_UNIVERSE size {universe}"
    )]
    UniverseExceeded { total: usize, universe: usize },

    #[error("number of COMM_WORLD sizes: {sizes} is not equal to the number of commands: {commands}")]
    CommandCountMismatch { sizes: usize, commands: usize },

    #[error("MPI Universe size is 1")]
    UniverseUnknown,

    #[error("environment variable {var}: invalid value '{value}' is not a positive int")]
    InvalidEnvironment { var: &'static str, value: String },

    #[error("failed to execute {command}")]
    LaunchFailed { command: String },

    #[error("failed to execute {command} (task {task}): {source}")]
    Spawn {
        task: usize,
        command: String,
        #[source]
        source: RuntimeError,
    },

    #[error("gathering results of task {task} failed: {source}")]
    Gather {
        task: usize,
        #[source]
        source: RuntimeError,
    },

    #[error("disconnecting from task {task} failed: {source}")]
    Disconnect {
        task: usize,
        #[source]
        source: RuntimeError,
    },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::MissingArgument { .. }
            | CoreError::MissingValue { .. }
            | CoreError::InvalidValue { .. } => ErrorKind::Usage,
            CoreError::TupleAndPerCommand
            | CoreError::PartialPerCommand
            | CoreError::UniverseExceeded { .. }
            | CoreError::CommandCountMismatch { .. } => ErrorKind::Consistency,
            CoreError::UniverseUnknown | CoreError::InvalidEnvironment { .. } => {
                ErrorKind::Environment
            }
            CoreError::LaunchFailed { .. } | CoreError::Spawn { .. } => ErrorKind::Launch,
            CoreError::Gather { .. } | CoreError::Disconnect { .. } => ErrorKind::Completion,
        }
    }
}
