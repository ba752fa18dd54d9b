use std::{sync::Arc, time::Duration};

use mpispawn_model::{Command, JobPlan, SpawnEnv, Task, TaskState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::CoreError,
    plan::quote_command,
    runtime::{GroupHandle, NOT_LAUNCHED, ROOT, Runtime, RuntimeError, SPAWN_SUCCESS, SpawnRequest},
};

/// Default wrapper program name, looked up on `PATH`.
pub const WRAPPER_PROGRAM: &str = "mpispawn-wrapper";

/// Program (and fixed leading arguments) that tasks run under in wrapper mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WrapperCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for WrapperCommand {
    fn default() -> Self {
        Self::new(WRAPPER_PROGRAM)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub wrapper: WrapperCommand,
    /// Upper bound for a single gather; `None` waits forever.
    pub gather_timeout: Option<Duration>,
}

/// Outcome of running a [`JobPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnResult {
    pub groups: Vec<GroupHandle>,
    pub states: Vec<TaskState>,
    /// Highest gathered value, or `0` when nothing was gathered.
    pub status: i32,
    pub propagate: bool,
}

impl SpawnResult {
    /// Value the process should exit with: the aggregate only when propagation was requested.
    pub fn exit_status(&self) -> i32 {
        if self.propagate { self.status } else { 0 }
    }

    /// Per task, whether its group got past the spawn.
    pub fn launch_ok(&self) -> Vec<bool> {
        self.states
            .iter()
            .map(|s| {
                !matches!(
                    s,
                    TaskState::Unsubmitted | TaskState::SpawnRequested | TaskState::LaunchFailed
                )
            })
            .collect()
    }
}

fn advance(state: &mut TaskState, next: TaskState) {
    debug_assert!(state.can_become(next), "{state:?} -> {next:?}");
    *state = next;
}

/// Issues one dynamic spawn per task and aggregates the results.
pub struct Orchestrator {
    runtime: Arc<dyn Runtime>,
    options: SpawnOptions,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn Runtime>, options: SpawnOptions) -> Self {
        Self {
            runtime,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort outstanding gathers when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Program and argument vector actually handed to the runtime for `task`.
    pub fn launch_argv(&self, task: &Task, wrapper: bool) -> (String, Vec<String>) {
        let cmd = task.command();
        if wrapper {
            let mut args = self.options.wrapper.args.clone();
            args.extend(cmd.tokens().iter().cloned());
            (self.options.wrapper.program.clone(), args)
        } else {
            (cmd.program().to_string(), cmd.args().to_vec())
        }
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(runtime = self.runtime.name(), tasks = plan.len(), procs = plan.total_world_size())
    )]
    pub async fn run(&self, plan: &JobPlan) -> Result<SpawnResult, CoreError> {
        let num_jobs = plan.len();
        let mut states = vec![TaskState::Unsubmitted; num_jobs];
        let mut groups = Vec::with_capacity(num_jobs);

        for (idx, task) in plan.iter().enumerate() {
            let (program, args) = self.launch_argv(task, plan.flags.wrapper);
            let req = SpawnRequest {
                program,
                args,
                count: task.world_size(),
                env: SpawnEnv::for_group(plan.universe_size, task.world_size(), num_jobs, idx),
            };
            let mut errcodes = vec![NOT_LAUNCHED; task.world_size()];

            advance(&mut states[idx], TaskState::SpawnRequested);
            info!(
                target: "mpispawn.core.spawn",
                task = idx,
                size = task.world_size(),
                command = %quote_command(task.command()),
                "spawning task"
            );

            let group = self
                .runtime
                .spawn(&req, &mut errcodes)
                .await
                .map_err(|source| CoreError::Spawn {
                    task: idx,
                    command: launched_command(&req),
                    source,
                })?;

            if errcodes.iter().any(|c| *c != SPAWN_SUCCESS) {
                advance(&mut states[idx], TaskState::LaunchFailed);
                warn!(
                    target: "mpispawn.core.spawn",
                    task = idx,
                    ?errcodes,
                    "process group failed to launch"
                );
                return Err(CoreError::LaunchFailed {
                    command: launched_command(&req),
                });
            }

            advance(&mut states[idx], TaskState::Launched);
            debug!(target: "mpispawn.core.spawn", task = idx, group = group.id(), "task launched");
            groups.push(group);
        }

        let mut status = 0;
        if plan.flags.needs_gather() && self.runtime.rank() == ROOT {
            for (idx, group) in groups.iter().enumerate() {
                advance(&mut states[idx], TaskState::AwaitingCompletion);
                let values = self
                    .gather_one(group)
                    .await
                    .map_err(|source| CoreError::Gather { task: idx, source })?;

                let group_status = values.iter().copied().fold(0, i32::max);
                status = status.max(group_status);
                advance(&mut states[idx], TaskState::Completed(group_status));
                debug!(target: "mpispawn.core.spawn", task = idx, ?values, "task completed");

                self.runtime
                    .disconnect(group)
                    .await
                    .map_err(|source| CoreError::Disconnect { task: idx, source })?;
            }
        } else {
            for state in states.iter_mut() {
                advance(state, TaskState::Detached);
            }
            debug!(target: "mpispawn.core.spawn", "tasks detached");
        }

        debug_assert!(states.iter().all(TaskState::is_terminal));
        info!(target: "mpispawn.core.spawn", status, "all tasks handled");
        Ok(SpawnResult {
            groups,
            states,
            status,
            propagate: plan.flags.propagate_errcodes,
        })
    }

    async fn gather_one(&self, group: &GroupHandle) -> Result<Vec<i32>, RuntimeError> {
        let token = self.cancel.child_token();
        let gather = self.runtime.gather(group, &token);
        tokio::pin!(gather);

        let Some(limit) = self.options.gather_timeout else {
            return gather.await;
        };

        tokio::select! {
            res = &mut gather => res,
            _ = tokio::time::sleep(limit) => {
                warn!(
                    target: "mpispawn.core.spawn",
                    group = group.id(),
                    ?limit,
                    "gather deadline reached; cancelling"
                );
                token.cancel();
                match gather.await {
                    Err(RuntimeError::Cancelled) => Err(RuntimeError::Timeout(limit)),
                    other => other,
                }
            }
        }
    }
}

fn launched_command(req: &SpawnRequest) -> String {
    let tokens = std::iter::once(req.program.clone()).chain(req.args.iter().cloned());
    match Command::new(tokens) {
        Ok(cmd) => quote_command(&cmd),
        Err(_) => req.program.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::{FakeCall, FakeRuntime};
    use mpispawn_model::LaunchFlags;

    fn plan(sizes: &[usize], flags: LaunchFlags) -> JobPlan {
        let tasks = sizes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let cmd = Command::new([format!("prog{i}"), "arg".into()]).unwrap();
                Task::new(*n, cmd).unwrap()
            })
            .collect();
        JobPlan {
            tasks,
            universe_size: sizes.iter().sum(),
            flags,
        }
    }

    fn orchestrator(rt: &Arc<FakeRuntime>) -> Orchestrator {
        Orchestrator::new(rt.clone(), SpawnOptions::default())
    }

    #[tokio::test]
    async fn spawns_tasks_in_order_and_detaches() {
        let rt = Arc::new(FakeRuntime::new());
        let res = orchestrator(&rt).run(&plan(&[1, 2, 3], LaunchFlags::default())).await.unwrap();

        let spawned = rt.spawned();
        assert_eq!(spawned.len(), 3);
        assert_eq!(
            spawned.iter().map(|r| (r.program.as_str(), r.count)).collect::<Vec<_>>(),
            vec![("prog0", 1), ("prog1", 2), ("prog2", 3)]
        );
        assert_eq!(spawned[1].args, vec!["arg"]);
        assert_eq!(spawned[2].env.get(SpawnEnv::JOB_ID), Some("2"));
        assert_eq!(spawned[2].env.get(SpawnEnv::NUM_JOBS), Some("3"));

        assert!(rt.calls().iter().all(|c| matches!(c, FakeCall::Spawn(_))));
        assert_eq!(res.states, vec![TaskState::Detached; 3]);
        assert_eq!(res.launch_ok(), vec![true; 3]);
        assert_eq!(res.groups.len(), 3);
        assert_eq!(res.exit_status(), 0);
    }

    #[tokio::test]
    async fn wrapper_mode_prefixes_wrapper_program() {
        let rt = Arc::new(FakeRuntime::new());
        let opts = SpawnOptions {
            wrapper: WrapperCommand::new("python").with_args(["wrapper.py"]),
            ..Default::default()
        };
        let flags = LaunchFlags {
            wrapper: true,
            ..Default::default()
        };
        Orchestrator::new(rt.clone(), opts).run(&plan(&[2], flags)).await.unwrap();

        let req = &rt.spawned()[0];
        assert_eq!(req.program, "python");
        assert_eq!(req.args, vec!["wrapper.py", "prog0", "arg"]);
    }

    #[tokio::test]
    async fn propagation_returns_highest_code() {
        let rt = Arc::new(
            FakeRuntime::new()
                .with_exit_codes(0, vec![0])
                .with_exit_codes(1, vec![3, 7])
                .with_exit_codes(2, vec![2, 0, 1]),
        );
        let flags = LaunchFlags {
            propagate_errcodes: true,
            ..Default::default()
        };
        let res = orchestrator(&rt).run(&plan(&[1, 2, 3], flags)).await.unwrap();

        assert_eq!(res.status, 7);
        assert_eq!(res.exit_status(), 7);
        assert_eq!(
            res.states,
            vec![TaskState::Completed(0), TaskState::Completed(7), TaskState::Completed(2)]
        );
        let calls = rt.calls();
        assert_eq!(calls[3], FakeCall::Gather(0));
        assert_eq!(calls[4], FakeCall::Disconnect(0));
        assert_eq!(calls.last(), Some(&FakeCall::Disconnect(2)));
    }

    #[tokio::test]
    async fn wrapper_without_propagation_masks_status() {
        let rt = Arc::new(FakeRuntime::new().with_exit_codes(0, vec![5]));
        let flags = LaunchFlags {
            wrapper: true,
            ..Default::default()
        };
        let res = orchestrator(&rt).run(&plan(&[1], flags)).await.unwrap();
        assert_eq!(res.status, 5);
        assert_eq!(res.exit_status(), 0);
    }

    #[tokio::test]
    async fn negative_codes_never_lower_success() {
        let rt = Arc::new(FakeRuntime::new().with_exit_codes(0, vec![-4]));
        let flags = LaunchFlags {
            propagate_errcodes: true,
            ..Default::default()
        };
        let res = orchestrator(&rt).run(&plan(&[1], flags)).await.unwrap();
        assert_eq!(res.exit_status(), 0);
    }

    #[tokio::test]
    async fn non_root_rank_does_not_gather() {
        let rt = Arc::new(FakeRuntime::new().with_world(4, 2).with_exit_codes(0, vec![9]));
        let flags = LaunchFlags {
            propagate_errcodes: true,
            ..Default::default()
        };
        let res = orchestrator(&rt).run(&plan(&[1], flags)).await.unwrap();
        assert_eq!(res.exit_status(), 0);
        assert!(!rt.calls().iter().any(|c| matches!(c, FakeCall::Gather(_))));
    }

    #[tokio::test]
    async fn launch_failure_stops_before_next_task() {
        let rt = Arc::new(FakeRuntime::new().failing_launch(1));
        let err = orchestrator(&rt)
            .run(&plan(&[1, 2, 3], LaunchFlags::default()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to execute prog1 arg");
        assert_eq!(rt.spawned().len(), 2);
        assert!(!rt.calls().iter().any(|c| matches!(c, FakeCall::Disconnect(_))));
    }

    #[tokio::test]
    async fn spawn_error_is_a_launch_error() {
        let rt = Arc::new(FakeRuntime::new().erroring_spawn(0));
        let err = orchestrator(&rt).run(&plan(&[1], LaunchFlags::default())).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Spawn { task: 0, ref command, .. } if command == "prog0 arg"
        ));
        assert!(err.to_string().starts_with("failed to execute prog0 arg"));
        assert_eq!(err.kind(), crate::ErrorKind::Launch);
    }

    #[tokio::test]
    async fn spawn_error_names_the_wrapped_command() {
        let rt = Arc::new(FakeRuntime::new().erroring_spawn(0));
        let flags = LaunchFlags {
            wrapper: true,
            ..Default::default()
        };
        let err = orchestrator(&rt).run(&plan(&[2], flags)).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Spawn { ref command, .. } if command == "mpispawn-wrapper prog0 arg"
        ));
    }

    #[tokio::test]
    async fn disconnect_failure_is_reported_as_such() {
        let rt = Arc::new(FakeRuntime::new().failing_disconnect(0));
        let flags = LaunchFlags {
            propagate_errcodes: true,
            ..Default::default()
        };
        let err = orchestrator(&rt).run(&plan(&[1, 1], flags)).await.unwrap_err();

        assert!(matches!(err, CoreError::Disconnect { task: 0, .. }));
        assert!(err.to_string().starts_with("disconnecting from task 0 failed"));
        assert_eq!(err.kind(), crate::ErrorKind::Completion);
        assert!(!rt.calls().contains(&FakeCall::Gather(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn gather_timeout_is_a_completion_error() {
        let rt = Arc::new(FakeRuntime::new().hanging_gather(0));
        let opts = SpawnOptions {
            gather_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let flags = LaunchFlags {
            propagate_errcodes: true,
            ..Default::default()
        };
        let err = Orchestrator::new(rt.clone(), opts).run(&plan(&[1], flags)).await.unwrap_err();

        assert!(matches!(
            err,
            CoreError::Gather {
                task: 0,
                source: RuntimeError::Timeout(_)
            }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Completion);
    }

    #[tokio::test]
    async fn cancellation_aborts_gather() {
        let rt = Arc::new(FakeRuntime::new().hanging_gather(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let flags = LaunchFlags {
            wrapper: true,
            ..Default::default()
        };
        let err = orchestrator(&rt)
            .with_cancel(cancel)
            .run(&plan(&[1], flags))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Gather {
                source: RuntimeError::Cancelled,
                ..
            }
        ));
    }
}
