use std::time::Duration;

use async_trait::async_trait;
use mpispawn_model::SpawnEnv;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

/// Rank that performs result collection on behalf of the invoking group.
pub const ROOT: usize = 0;
/// Error-code slot value before the runtime reports on that process.
pub const NOT_LAUNCHED: i32 = -1;
/// Error-code slot value of a process that started.
pub const SPAWN_SUCCESS: i32 = 0;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("gather failed: {0}")]
    Gather(String),
    #[error("disconnect failed: {0}")]
    Disconnect(String),
    #[error("unknown process group {0}")]
    UnknownGroup(u64),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Opaque reference to a spawned process group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupHandle {
    id: u64,
    size: usize,
}

impl GroupHandle {
    pub fn new(id: u64, size: usize) -> Self {
        Self { id, size }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of processes requested for the group.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Everything needed to start one process group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub count: usize,
    pub env: SpawnEnv,
}

/// Dynamic process management primitives of a distributed runtime.
///
/// `spawn` and `gather` are collective over the invoking group: every rank issues them in the same order.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Number of processes in the invoking group.
    fn world_size(&self) -> usize;

    /// Rank of this process inside the invoking group.
    fn rank(&self) -> usize;

    /// Start `req.count` processes.
    ///
    /// `errcodes` has one slot per process, pre-filled with [`NOT_LAUNCHED`];
    /// the runtime writes [`SPAWN_SUCCESS`] or an error code into each slot.
    async fn spawn(
        &self,
        req: &SpawnRequest,
        errcodes: &mut [i32],
    ) -> Result<GroupHandle, RuntimeError>;

    /// Collect one value (the exit code) from every process of `group`.
    ///
    /// Blocks until the whole group has reported or `cancel` fires, in which case the
    /// backend returns [`RuntimeError::Cancelled`].
    async fn gather(
        &self,
        group: &GroupHandle,
        cancel: &CancellationToken,
    ) -> Result<Vec<i32>, RuntimeError>;

    /// Release the connection to `group`.
    async fn disconnect(&self, group: &GroupHandle) -> Result<(), RuntimeError>;
}
