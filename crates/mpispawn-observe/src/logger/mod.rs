//! Diagnostic logging for the launcher and the wrapper.
//!
//! Everything goes to stderr: stdout belongs to `--print-commands` output and
//! to the spawned programs.

use tracing::debug;

mod config;
mod error;
mod format;
mod sink;

pub use config::{LOG_ENV, LOG_FORMAT_ENV, LoggerConfig};
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the global subscriber described by `cfg`.
///
/// Fails with [`LoggerError::AlreadyInitialized`] on a second call.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    sink::install(cfg)?;
    debug!(
        target: "mpispawn.observe",
        format = %cfg.format,
        filter = %cfg.level,
        "logger initialized"
    );
    Ok(())
}
