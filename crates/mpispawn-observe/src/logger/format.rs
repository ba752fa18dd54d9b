use std::{fmt, str::FromStr};

use crate::logger::error::LoggerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggerFormat {
    #[default]
    Text,
    Json,
    Journald,
}

impl LoggerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Journald => "journald",
        }
    }

    /// Whether this build can actually emit the format.
    pub fn is_available(self) -> bool {
        match self {
            Self::Text | Self::Json => true,
            Self::Journald => cfg!(all(target_os = "linux", feature = "journald")),
        }
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Self::Text,
            "json" => Self::Json,
            "journald" | "journal" => Self::Journald,
            _ => return Err(LoggerError::InvalidFormat(s.to_string())),
        };
        if format.is_available() {
            Ok(format)
        } else {
            Err(LoggerError::JournaldUnavailable)
        }
    }
}
