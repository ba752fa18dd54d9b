use serde::{Deserialize, Serialize};

/// Lifecycle of one task inside the spawn orchestrator.
///
/// ```text
/// Unsubmitted -> SpawnRequested -> Launched | LaunchFailed
/// Launched -> AwaitingCompletion | Detached
/// AwaitingCompletion -> Completed(status)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    /// Task is part of the plan but no spawn was issued yet.
    Unsubmitted,
    /// Spawn call issued, waiting for the group to start.
    SpawnRequested,
    /// Every process of the group started.
    Launched,
    /// At least one process of the group failed to start.
    LaunchFailed,
    /// Exit codes are being gathered from the group.
    AwaitingCompletion,
    /// Group left running without collecting its result.
    Detached,
    /// Group reported its highest exit code.
    Completed(i32),
}

impl TaskState {
    /// Returns `true` if the task won't transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::LaunchFailed | TaskState::Detached | TaskState::Completed(_)
        )
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_become(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Unsubmitted, SpawnRequested)
                | (SpawnRequested, Launched)
                | (SpawnRequested, LaunchFailed)
                | (Launched, AwaitingCompletion)
                | (Launched, Detached)
                | (AwaitingCompletion, Completed(_))
        )
    }
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Unsubmitted
    }
}
