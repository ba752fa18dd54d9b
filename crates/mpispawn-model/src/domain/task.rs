use serde::Serialize;

use crate::{Command, ModelError};

/// One process group to launch: `world_size` copies of `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    world_size: usize,
    command: Command,
}

impl Task {
    pub fn new(world_size: usize, command: Command) -> Result<Self, ModelError> {
        if world_size == 0 {
            return Err(ModelError::ZeroWorldSize);
        }
        Ok(Self {
            world_size,
            command,
        })
    }

    /// Number of processes in the spawned group.
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}
