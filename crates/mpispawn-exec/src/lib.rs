mod error;
pub use error::{ExecError, ExecResult};

pub mod util;

pub mod local;
pub use local::{Ambient, LocalRuntime};

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::local::{Ambient, LocalRuntime};
}
