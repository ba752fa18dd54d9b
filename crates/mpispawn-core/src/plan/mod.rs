//! Pairing of resolved sizes with commands, and rendering of the resulting plan.
use mpispawn_model::{Command, JobPlan, LaunchFlags, Task};
use tracing::debug;

use crate::error::CoreError;

/// Build the ordered task list.
///
/// A single command is repeated for every size; otherwise there must be exactly one command per size.
pub fn build_tasks(sizes: &[usize], commands: Vec<Command>) -> Result<Vec<Task>, CoreError> {
    let commands = if commands.len() == 1 && sizes.len() > 1 {
        vec![commands[0].clone(); sizes.len()]
    } else if commands.len() != sizes.len() {
        return Err(CoreError::CommandCountMismatch {
            sizes: sizes.len(),
            commands: commands.len(),
        });
    } else {
        commands
    };

    sizes
        .iter()
        .zip(commands)
        .map(|(n, cmd)| {
            Task::new(*n, cmd).map_err(|_| CoreError::InvalidValue {
                arg: "-nW",
                value: n.to_string(),
                expected: "a positive int",
            })
        })
        .collect()
}

pub fn build_plan(
    sizes: &[usize],
    commands: Vec<Command>,
    universe_size: usize,
    flags: LaunchFlags,
) -> Result<JobPlan, CoreError> {
    let tasks = build_tasks(sizes, commands)?;
    debug!(target: "mpispawn.core.plan", tasks = tasks.len(), universe_size, "plan built");
    Ok(JobPlan {
        tasks,
        universe_size,
        flags,
    })
}

/// Shell-quoted form of a command, falling back to plain joining for tokens `shlex` refuses.
pub fn quote_command(command: &Command) -> String {
    shlex::try_join(command.tokens().iter().map(String::as_str))
        .unwrap_or_else(|_| command.tokens().join(" "))
}

/// One `mpiexec` line per task, equivalent to launching it as a standalone job.
pub fn render_commands(plan: &JobPlan) -> Vec<String> {
    plan.iter()
        .map(|t| format!("mpiexec -n {} {}", t.world_size(), quote_command(t.command())))
        .collect()
}
