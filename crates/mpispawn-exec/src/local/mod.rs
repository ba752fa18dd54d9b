//! Process-group backend built on local OS processes.
//!
//! A group is a set of children started by the coordinating rank. Gathering a
//! group waits for every child and reports its exit code; other ranks take
//! part in the collective calls without starting anything.
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mpispawn_core::{
    GroupHandle, Runtime, RuntimeError, SpawnRequest,
    runtime::{ROOT, SPAWN_SUCCESS},
};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::{ExecError, ExecResult},
    util::{cmd_program, exit_code, kill_graceful},
};

/// Variables consulted, in order, for the size of the invoking group.
pub const SIZE_VARS: [&str; 3] = ["OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "SLURM_NTASKS"];
/// Variables consulted, in order, for the rank of this process.
pub const RANK_VARS: [&str; 3] = ["OMPI_COMM_WORLD_RANK", "PMI_RANK", "SLURM_PROCID"];

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Size and rank of the group this process was started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ambient {
    pub world_size: usize,
    pub rank: usize,
}

impl Default for Ambient {
    fn default() -> Self {
        Self {
            world_size: 1,
            rank: ROOT,
        }
    }
}

impl Ambient {
    pub fn from_env() -> ExecResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the first present variable of each list; absent means a singleton group.
    pub fn from_lookup<F>(lookup: F) -> ExecResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let world_size = first_number(&lookup, &SIZE_VARS)?.unwrap_or(1);
        let rank = first_number(&lookup, &RANK_VARS)?.unwrap_or(ROOT);
        if world_size == 0 {
            return Err(ExecError::InvalidAmbient {
                var: SIZE_VARS[0],
                value: "0".into(),
            });
        }
        if rank >= world_size {
            return Err(ExecError::RankOutOfRange {
                rank,
                size: world_size,
            });
        }
        Ok(Self { world_size, rank })
    }
}

fn first_number<F>(lookup: &F, vars: &[&'static str]) -> ExecResult<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some((var, raw)) = vars.iter().find_map(|v| lookup(v).map(|raw| (*v, raw))) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ExecError::InvalidAmbient { var, value: raw })
}

#[derive(Default)]
struct Groups {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Vec<Child>>>,
}

impl Groups {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Vec<Child>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, children: Vec<Child>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, children);
        id
    }

    fn take(&self, id: u64) -> ExecResult<Vec<Child>> {
        self.lock()
            .get_mut(&id)
            .map(std::mem::take)
            .ok_or(ExecError::UnknownGroup(id))
    }

    fn remove(&self, id: u64) -> ExecResult<Vec<Child>> {
        self.lock().remove(&id).ok_or(ExecError::UnknownGroup(id))
    }
}

/// [`Runtime`] that starts each group member as a child process of this one.
pub struct LocalRuntime {
    ambient: Ambient,
    grace: Duration,
    groups: Groups,
}

impl LocalRuntime {
    pub fn new(ambient: Ambient) -> Self {
        Self {
            ambient,
            grace: DEFAULT_GRACE,
            groups: Groups::default(),
        }
    }

    pub fn from_env() -> ExecResult<Self> {
        Ambient::from_env().map(Self::new)
    }

    /// How long a cancelled child gets between SIGTERM and SIGKILL.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn start(&self, req: &SpawnRequest, errcodes: &mut [i32]) -> ExecResult<Vec<Child>> {
        if req.program.is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let mut children = Vec::with_capacity(req.count);
        for (rank, slot) in errcodes.iter_mut().enumerate().take(req.count) {
            let env = req.env.with_rank(rank);
            trace!(
                target: "mpispawn.exec.local",
                program = %req.program,
                args = ?req.args,
                rank,
                "spawn"
            );
            match cmd_program(&req.program, &req.args, &env).spawn() {
                Ok(child) => {
                    *slot = SPAWN_SUCCESS;
                    children.push(child);
                }
                Err(e) => {
                    warn!(
                        target: "mpispawn.exec.local",
                        program = %req.program,
                        rank,
                        error = %e,
                        "failed to start process"
                    );
                    *slot = e.raw_os_error().filter(|c| *c != SPAWN_SUCCESS).unwrap_or(1);
                }
            }
        }
        Ok(children)
    }

    async fn wait_all(
        &self,
        children: &mut [Child],
        cancel: &CancellationToken,
    ) -> ExecResult<Vec<i32>> {
        let mut codes = Vec::with_capacity(children.len());
        for idx in 0..children.len() {
            tokio::select! {
                status = children[idx].wait() => {
                    let status = status.map_err(|e| ExecError::Wait(e.to_string()))?;
                    codes.push(exit_code(status));
                }
                _ = cancel.cancelled() => {
                    debug!(
                        target: "mpispawn.exec.local",
                        remaining = children.len() - idx,
                        "cancelled; terminating group"
                    );
                    for child in &mut children[idx..] {
                        let _ = kill_graceful(child, self.grace).await;
                    }
                    return Err(ExecError::Cancelled);
                }
            }
        }
        Ok(codes)
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    fn name(&self) -> &'static str {
        "local"
    }

    fn world_size(&self) -> usize {
        self.ambient.world_size
    }

    fn rank(&self) -> usize {
        self.ambient.rank
    }

    async fn spawn(
        &self,
        req: &SpawnRequest,
        errcodes: &mut [i32],
    ) -> Result<GroupHandle, RuntimeError> {
        let children = if self.ambient.rank == ROOT {
            self.start(req, errcodes)?
        } else {
            errcodes.fill(SPAWN_SUCCESS);
            Vec::new()
        };

        let id = self.groups.insert(children);
        debug!(target: "mpispawn.exec.local", group = id, count = req.count, "group registered");
        Ok(GroupHandle::new(id, req.count))
    }

    async fn gather(
        &self,
        group: &GroupHandle,
        cancel: &CancellationToken,
    ) -> Result<Vec<i32>, RuntimeError> {
        let mut children = self.groups.take(group.id())?;
        let codes = self.wait_all(&mut children, cancel).await?;
        debug!(target: "mpispawn.exec.local", group = group.id(), ?codes, "group finished");
        Ok(codes)
    }

    async fn disconnect(&self, group: &GroupHandle) -> Result<(), RuntimeError> {
        let left = self.groups.remove(group.id())?;
        if !left.is_empty() {
            trace!(
                target: "mpispawn.exec.local",
                group = group.id(),
                left = left.len(),
                "detaching running processes"
            );
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mpispawn_core::runtime::NOT_LAUNCHED;
    use mpispawn_model::SpawnEnv;

    fn req(program: &str, args: &[&str], count: usize) -> SpawnRequest {
        SpawnRequest {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            count,
            env: SpawnEnv::for_group(count, count, 1, 0),
        }
    }

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn ambient_defaults_to_singleton() {
        assert_eq!(Ambient::from_lookup(|_| None).unwrap(), Ambient::default());
    }

    #[test]
    fn ambient_prefers_first_variable() {
        let a = Ambient::from_lookup(lookup(&[
            ("PMI_SIZE", "2"),
            ("OMPI_COMM_WORLD_SIZE", "4"),
            ("SLURM_PROCID", "3"),
        ]))
        .unwrap();
        assert_eq!(a, Ambient { world_size: 4, rank: 3 });
    }

    #[test]
    fn ambient_rejects_garbage_and_bad_rank() {
        let err = Ambient::from_lookup(lookup(&[("SLURM_NTASKS", "many")])).unwrap_err();
        assert!(matches!(err, ExecError::InvalidAmbient { var: "SLURM_NTASKS", .. }));

        let err =
            Ambient::from_lookup(lookup(&[("PMI_SIZE", "2"), ("PMI_RANK", "2")])).unwrap_err();
        assert!(matches!(err, ExecError::RankOutOfRange { rank: 2, size: 2 }));
    }

    #[tokio::test]
    async fn spawn_and_gather_exit_codes() {
        let rt = LocalRuntime::new(Ambient::default());
        let mut codes = vec![NOT_LAUNCHED; 3];
        let group = rt
            .spawn(&req("sh", &["-c", "exit $MPISPAWN_RANK"], 3), &mut codes)
            .await
            .unwrap();
        assert_eq!(codes, vec![0, 0, 0]);
        assert_eq!(group.size(), 3);

        let values = rt.gather(&group, &CancellationToken::new()).await.unwrap();
        assert_eq!(values, vec![0, 1, 2]);
        rt.disconnect(&group).await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_marks_errcodes() {
        let rt = LocalRuntime::new(Ambient::default());
        let mut codes = vec![NOT_LAUNCHED; 2];
        rt.spawn(&req("/nonexistent/mpispawn-test-binary", &[], 2), &mut codes)
            .await
            .unwrap();
        assert!(codes.iter().all(|c| *c != SPAWN_SUCCESS && *c != NOT_LAUNCHED));
    }

    #[tokio::test]
    async fn empty_program_is_a_spawn_error() {
        let rt = LocalRuntime::new(Ambient::default());
        let mut codes = vec![NOT_LAUNCHED; 1];
        let err = rt.spawn(&req("", &[], 1), &mut codes).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn(_)));
    }

    #[tokio::test]
    async fn non_root_rank_starts_nothing() {
        let rt = LocalRuntime::new(Ambient { world_size: 2, rank: 1 });
        let mut codes = vec![NOT_LAUNCHED; 2];
        let group = rt
            .spawn(&req("/nonexistent/mpispawn-test-binary", &[], 2), &mut codes)
            .await
            .unwrap();
        assert_eq!(codes, vec![SPAWN_SUCCESS; 2]);
        assert!(rt.gather(&group, &CancellationToken::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_gather_terminates_children() {
        let rt = LocalRuntime::new(Ambient::default()).with_grace(Duration::from_millis(500));
        let mut codes = vec![NOT_LAUNCHED; 2];
        let group = rt.spawn(&req("sleep", &["30"], 2), &mut codes).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = rt.gather(&group, &cancel).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
    }

    #[tokio::test]
    async fn unknown_group_is_reported() {
        let rt = LocalRuntime::new(Ambient::default());
        let ghost = GroupHandle::new(42, 1);
        assert!(matches!(
            rt.gather(&ghost, &CancellationToken::new()).await,
            Err(RuntimeError::UnknownGroup(42))
        ));
        assert!(matches!(rt.disconnect(&ghost).await, Err(RuntimeError::UnknownGroup(42))));
    }

    #[tokio::test]
    async fn disconnect_twice_fails() {
        let rt = LocalRuntime::new(Ambient::default());
        let mut codes = vec![NOT_LAUNCHED; 1];
        let group = rt.spawn(&req("true", &[], 1), &mut codes).await.unwrap();
        rt.gather(&group, &CancellationToken::new()).await.unwrap();
        rt.disconnect(&group).await.unwrap();
        assert!(rt.disconnect(&group).await.is_err());
    }
}
