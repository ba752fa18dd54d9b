use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Log filter variable, `EnvFilter` syntax.
pub const LOG_ENV: &str = "MPISPAWN_LOG";
/// Output format variable: `text`, `json` or `journald`.
pub const LOG_FORMAT_ENV: &str = "MPISPAWN_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "warn".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by [`LOG_ENV`] and [`LOG_FORMAT_ENV`].
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(level) = lookup(LOG_ENV).filter(|s| !s.trim().is_empty()) {
            cfg.level = level;
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let cfg = LoggerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "warn");
    }

    #[test]
    fn environment_overrides() {
        let cfg = LoggerConfig::from_lookup(|k| match k {
            LOG_ENV => Some("mpispawn=debug".into()),
            LOG_FORMAT_ENV => Some("json".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "mpispawn=debug");
    }

    #[test]
    fn bad_format_is_an_error() {
        let res = LoggerConfig::from_lookup(|k| (k == LOG_FORMAT_ENV).then(|| "xml".to_string()));
        assert!(matches!(res, Err(LoggerError::InvalidFormat(_))));
    }
}
