use std::{path::Path, time::Duration};

use anyhow::{Context, bail};
use mpispawn_core::WrapperCommand;
use mpispawn_core::orchestrator::WRAPPER_PROGRAM;
use mpispawn_observe::LoggerConfig;

/// Wrapper program, optionally followed by fixed arguments (shell syntax).
pub const WRAPPER_ENV: &str = "MPISPAWN_WRAPPER";
/// Gather deadline in milliseconds.
pub const GATHER_TIMEOUT_ENV: &str = "MPISPAWN_GATHER_TIMEOUT_MS";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub logger: LoggerConfig,
    pub wrapper: WrapperCommand,
    pub gather_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let exe = std::env::current_exe().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), exe.as_deref())
    }

    pub fn from_lookup<F>(lookup: F, current_exe: Option<&Path>) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let logger = LoggerConfig::from_lookup(&lookup)?;

        let wrapper = match lookup(WRAPPER_ENV) {
            Some(raw) => parse_wrapper(&raw)?,
            None => default_wrapper(current_exe),
        };

        let gather_timeout = lookup(GATHER_TIMEOUT_ENV)
            .map(|raw| parse_timeout(&raw))
            .transpose()?;

        Ok(Self {
            logger,
            wrapper,
            gather_timeout,
        })
    }
}

fn parse_wrapper(raw: &str) -> anyhow::Result<WrapperCommand> {
    let words = shlex::split(raw).with_context(|| format!("{WRAPPER_ENV}: cannot split '{raw}'"))?;
    let Some((program, args)) = words.split_first() else {
        bail!("{WRAPPER_ENV}: empty wrapper command");
    };
    Ok(WrapperCommand::new(program.as_str()).with_args(args.iter().cloned()))
}

/// Sibling of the running executable when installed side by side, else a `PATH` lookup.
fn default_wrapper(current_exe: Option<&Path>) -> WrapperCommand {
    current_exe
        .and_then(Path::parent)
        .map(|dir| dir.join(WRAPPER_PROGRAM))
        .filter(|p| p.is_file())
        .map(|p| WrapperCommand::new(p.to_string_lossy()))
        .unwrap_or_default()
}

fn parse_timeout(raw: &str) -> anyhow::Result<Duration> {
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{GATHER_TIMEOUT_ENV}: invalid value '{raw}'"))?;
    if ms == 0 {
        bail!("{GATHER_TIMEOUT_ENV}: must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}
