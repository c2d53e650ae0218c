pub mod command_executor;
pub mod guard;

pub use command_executor::{
    CommandOutput, CommandRunner, ExecutorError, Invocation, SystemRunner, DEFAULT_TIMEOUT,
    TERM_GRACE,
};
pub use guard::ArgvGuard;
