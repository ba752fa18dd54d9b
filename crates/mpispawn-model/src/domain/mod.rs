mod command;
pub use command::Command;

mod world_size;
pub use world_size::WorldSize;

mod task;
pub use task::Task;

mod plan;
pub use plan::{JobPlan, LaunchFlags};

mod task_state;
pub use task_state::TaskState;

mod spawn_env;
pub use spawn_env::{KeyValue, SpawnEnv};
