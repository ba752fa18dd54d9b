pub mod error;
pub use error::{CoreError, ErrorKind};

pub mod segment;
pub mod resolve;
pub mod plan;

mod invocation;
pub use invocation::{Action, check_spawn_plan, interpret, render_help};

pub mod runtime;
pub use runtime::{GroupHandle, Runtime, RuntimeError, SpawnRequest};

pub mod orchestrator;
pub use orchestrator::{Orchestrator, SpawnOptions, SpawnResult, WrapperCommand};

pub mod prelude {
    pub use crate::orchestrator::{Orchestrator, SpawnOptions, WrapperCommand};
    pub use crate::runtime::{GroupHandle, Runtime, RuntimeError, SpawnRequest};
    pub use crate::{Action, CoreError, ErrorKind, interpret};
}
