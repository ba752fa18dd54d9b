use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = filter(&cfg.level)?;
    let output = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(timer())
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(timer())
            .boxed(),
        LoggerFormat::Journald => journald()?,
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("already") {
                LoggerError::AlreadyInitialized
            } else {
                LoggerError::Setup(msg)
            }
        })
}

pub(crate) fn filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|e| LoggerError::InvalidFilter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

fn timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald() -> Result<BoxedLayer, LoggerError> {
    tracing_journald::layer()
        .map(|l| l.with_syslog_identifier("mpispawn".to_string()).boxed())
        .map_err(|e| LoggerError::Setup(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}
