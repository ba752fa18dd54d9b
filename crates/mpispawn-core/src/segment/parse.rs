use mpispawn_model::{Command, LaunchFlags};
use tracing::trace;

use crate::error::CoreError;
use crate::segment::grammar::{PRIMARY, SUBSEQUENT, parse};

/// First segment after parsing; `world_size` is still the raw `-nW` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrimary {
    pub universe_size: Option<usize>,
    pub world_size: String,
    pub command: Vec<String>,
    pub leftover: Vec<String>,
    pub flags: LaunchFlags,
}

/// A segment after the first `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSubsequent {
    pub world_size: Option<usize>,
    pub command: Vec<String>,
    pub leftover: Vec<String>,
}

fn full_command(command: &[String], leftover: &[String]) -> Result<Command, CoreError> {
    Command::new(command.iter().cloned())
        .map(|cmd| cmd.extended(leftover))
        .map_err(|_| CoreError::MissingArgument { arg: "command" })
}

impl ParsedPrimary {
    /// Command with leftover tokens appended.
    pub fn full_command(&self) -> Result<Command, CoreError> {
        full_command(&self.command, &self.leftover)
    }
}

impl ParsedSubsequent {
    pub fn full_command(&self) -> Result<Command, CoreError> {
        full_command(&self.command, &self.leftover)
    }
}

fn positive_int(arg: &'static str, value: &str) -> Result<usize, CoreError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CoreError::InvalidValue {
            arg,
            value: value.to_string(),
            expected: "a positive int",
        })
}

pub fn parse_primary<S: AsRef<str>>(tokens: &[S]) -> Result<ParsedPrimary, CoreError> {
    let args = parse(tokens, &PRIMARY)?;

    let universe_size = args
        .value("-nU")
        .map(|v| positive_int("-nU", v))
        .transpose()?;
    let world_size = args
        .value("-nW")
        .ok_or(CoreError::MissingArgument { arg: "-nW" })?
        .to_string();

    let flags = LaunchFlags {
        wrapper: args.flag("--wrapper"),
        propagate_errcodes: args.flag("--propagate-errcodes"),
        print_commands: args.flag("--print-commands"),
        check_spawn: args.flag("--check-spawn"),
        help: args.flag("--help"),
    };

    trace!(target: "mpispawn.core.segment", ?universe_size, %world_size, command = ?args.positional, leftover = ?args.leftover, "primary segment parsed");
    Ok(ParsedPrimary {
        universe_size,
        world_size,
        command: args.positional,
        leftover: args.leftover,
        flags,
    })
}

pub fn parse_subsequent<S: AsRef<str>>(tokens: &[S]) -> Result<ParsedSubsequent, CoreError> {
    let args = parse(tokens, &SUBSEQUENT)?;
    let world_size = args
        .value("-nW")
        .map(|v| positive_int("-nW", v))
        .transpose()?;

    trace!(target: "mpispawn.core.segment", ?world_size, command = ?args.positional, leftover = ?args.leftover, "segment parsed");
    Ok(ParsedSubsequent {
        world_size,
        command: args.positional,
        leftover: args.leftover,
    })
}
