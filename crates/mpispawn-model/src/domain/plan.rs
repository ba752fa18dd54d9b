use serde::{Deserialize, Serialize};

use crate::Task;

/// Global switches taken from the primary segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchFlags {
    /// Route every task through the wrapper program.
    pub wrapper: bool,
    /// Report the highest child exit code instead of plain success.
    pub propagate_errcodes: bool,
    /// Print the plan as `mpiexec` lines instead of launching it.
    pub print_commands: bool,
    pub check_spawn: bool,
    pub help: bool,
}

impl LaunchFlags {
    /// Whether child exit codes have to be collected after spawning.
    #[inline]
    pub fn needs_gather(&self) -> bool {
        self.wrapper || self.propagate_errcodes
    }
}

/// Fully resolved launch plan.
///
/// Tasks are ordered: the primary segment first, then subsequent segments left to right.
/// The sum of all task sizes never exceeds `universe_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPlan {
    pub tasks: Vec<Task>,
    pub universe_size: usize,
    pub flags: LaunchFlags,
}

impl JobPlan {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Total number of processes the plan will start.
    pub fn total_world_size(&self) -> usize {
        self.tasks.iter().map(Task::world_size).sum()
    }
}
