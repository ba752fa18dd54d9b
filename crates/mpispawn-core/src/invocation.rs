use mpispawn_model::{Command, JobPlan, LaunchFlags, Task};
use tracing::debug;

use crate::{
    error::CoreError,
    plan::build_plan,
    resolve::resolve,
    segment::{
        PRIMARY, SHORT_CIRCUIT, SUBSEQUENT, parse, parse_primary, parse_subsequent, split_segments,
    },
};

/// What a single invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Help,
    CheckSpawn(JobPlan),
    PrintCommands(JobPlan),
    Launch(JobPlan),
}

/// Usage for the primary segment followed by usage for subsequent segments.
pub fn render_help() -> String {
    format!(
        "{}\nsubsequent commands:\n\n{}",
        PRIMARY.render_help(),
        SUBSEQUENT.render_help()
    )
}

/// Single echo task run through the wrapper, with exit-code propagation forced on.
pub fn check_spawn_plan() -> JobPlan {
    let echo = Command::new(["echo", "Spawn successful"])
        .and_then(|cmd| Task::new(1, cmd))
        .map(|task| vec![task])
        .unwrap_or_default();
    JobPlan {
        tasks: echo,
        universe_size: 1,
        flags: LaunchFlags {
            wrapper: true,
            propagate_errcodes: true,
            check_spawn: true,
            ..Default::default()
        },
    }
}

/// Turn the full `argv` into an [`Action`].
///
/// `ambient` is the size of the invoking group, `env_universe` the raw `MPIEXEC_UNIVERSE_SIZE`.
/// Every validation happens here, so a returned plan is safe to launch as a whole.
pub fn interpret<S: AsRef<str>>(
    argv: &[S],
    ambient: usize,
    env_universe: Option<&str>,
) -> Result<Action, CoreError> {
    let segments = split_segments(argv);
    let (first, rest) = segments
        .split_first()
        .ok_or(CoreError::MissingArgument { arg: "command" })?;

    let short = parse(first, &SHORT_CIRCUIT)?;
    if short.flag("--help") {
        return Ok(Action::Help);
    }
    if short.flag("--check-spawn") {
        return Ok(Action::CheckSpawn(check_spawn_plan()));
    }

    let primary = parse_primary(first)?;
    let subsequent = rest
        .iter()
        .map(|seg| parse_subsequent(seg))
        .collect::<Result<Vec<_>, _>>()?;

    let resolution = resolve(&primary, &subsequent, ambient, env_universe)?;

    let mut commands = Vec::with_capacity(subsequent.len() + 1);
    commands.push(primary.full_command()?);
    for seg in &subsequent {
        commands.push(seg.full_command()?);
    }

    let plan = build_plan(
        &resolution.sizes,
        commands,
        resolution.universe_size,
        primary.flags,
    )?;
    debug!(target: "mpispawn.core.plan", plan = %serde_json::to_string(&plan).unwrap_or_default(), "resolved plan");

    if plan.flags.print_commands {
        Ok(Action::PrintCommands(plan))
    } else {
        Ok(Action::Launch(plan))
    }
}
