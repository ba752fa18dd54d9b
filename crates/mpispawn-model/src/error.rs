use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid world size '{0}': expected a positive int or a tuple of positive ints")]
    InvalidWorldSize(String),
    #[error("world size must be greater than zero")]
    ZeroWorldSize,
    #[error("command must contain at least a program")]
    EmptyCommand,
}
