//! In-memory [`Runtime`] used to exercise the orchestrator without real processes.
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{GroupHandle, Runtime, RuntimeError, SPAWN_SUCCESS, SpawnRequest};

/// Call observed by a [`FakeRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Spawn(SpawnRequest),
    Gather(u64),
    Disconnect(u64),
}

#[derive(Default)]
struct Inner {
    calls: Vec<FakeCall>,
    next_id: u64,
}

/// Scriptable runtime: group ids are the index of the spawn call.
#[derive(Default)]
pub struct FakeRuntime {
    world_size: usize,
    rank: usize,
    fail_launch: HashSet<u64>,
    error_spawn: HashSet<u64>,
    hang_gather: HashSet<u64>,
    fail_disconnect: HashSet<u64>,
    exit_codes: HashMap<u64, Vec<i32>>,
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            world_size: 1,
            ..Default::default()
        }
    }

    pub fn with_world(mut self, world_size: usize, rank: usize) -> Self {
        self.world_size = world_size;
        self.rank = rank;
        self
    }

    /// The last process of spawn call `group` reports a launch error.
    pub fn failing_launch(mut self, group: u64) -> Self {
        self.fail_launch.insert(group);
        self
    }

    /// Spawn call `group` itself returns an error.
    pub fn erroring_spawn(mut self, group: u64) -> Self {
        self.error_spawn.insert(group);
        self
    }

    /// Gather on `group` never completes unless cancelled.
    pub fn hanging_gather(mut self, group: u64) -> Self {
        self.hang_gather.insert(group);
        self
    }

    /// Disconnect from `group` returns an error.
    pub fn failing_disconnect(mut self, group: u64) -> Self {
        self.fail_disconnect.insert(group);
        self
    }

    /// Values reported by `group` on gather; defaults to zeros.
    pub fn with_exit_codes(mut self, group: u64, codes: Vec<i32>) -> Self {
        self.exit_codes.insert(group, codes);
        self
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Spawn(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    async fn spawn(
        &self,
        req: &SpawnRequest,
        errcodes: &mut [i32],
    ) -> Result<GroupHandle, RuntimeError> {
        let id = {
            let mut inner = self.lock();
            inner.calls.push(FakeCall::Spawn(req.clone()));
            let id = inner.next_id;
            inner.next_id += 1;
            id
        };
        if self.error_spawn.contains(&id) {
            return Err(RuntimeError::Spawn(format!("{}: no such file", req.program)));
        }

        errcodes.fill(SPAWN_SUCCESS);
        if self.fail_launch.contains(&id)
            && let Some(last) = errcodes.last_mut()
        {
            *last = 1;
        }
        Ok(GroupHandle::new(id, req.count))
    }

    async fn gather(
        &self,
        group: &GroupHandle,
        cancel: &CancellationToken,
    ) -> Result<Vec<i32>, RuntimeError> {
        self.lock().calls.push(FakeCall::Gather(group.id()));

        if self.hang_gather.contains(&group.id()) {
            cancel.cancelled().await;
            return Err(RuntimeError::Cancelled);
        }
        Ok(self
            .exit_codes
            .get(&group.id())
            .cloned()
            .unwrap_or_else(|| vec![0; group.size()]))
    }

    async fn disconnect(&self, group: &GroupHandle) -> Result<(), RuntimeError> {
        self.lock().calls.push(FakeCall::Disconnect(group.id()));
        if self.fail_disconnect.contains(&group.id()) {
            return Err(RuntimeError::Disconnect(format!("group {} is gone", group.id())));
        }
        Ok(())
    }
}
