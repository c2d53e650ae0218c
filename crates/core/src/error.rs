use sysdeck_executor::ExecutorError;
use sysdeck_privilege::PrivilegeError;
use thiserror::Error;

use crate::types::ActionOutcome;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Tool not installed: {0}")]
    ToolMissing(String),

    #[error("{command} exited with code {code}: {stderr}")]
    ExitNonZero {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Another privileged action is in progress")]
    Busy,

    #[error("Unsupported distribution: {0}")]
    Unsupported(String),

    #[error("Probe unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("Cancelled before {0}")]
    Cancelled(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// Attach the step label that produced an executor failure.
    pub fn from_exec(label: &str, err: ExecutorError) -> Self {
        match err {
            ExecutorError::SpawnFailed(cause) => {
                tracing::debug!(%cause, "spawn failed");
                CoreError::ToolMissing(label.to_string())
            }
            ExecutorError::Timeout(_) => CoreError::Timeout(label.to_string()),
            ExecutorError::ExitNonZero { code, stderr } => CoreError::ExitNonZero {
                command: label.to_string(),
                code,
                stderr,
            },
            ExecutorError::InvalidArgv(msg) => CoreError::InvalidRequest(msg),
            ExecutorError::Io(msg) => CoreError::ExitNonZero {
                command: label.to_string(),
                code: -1,
                stderr: msg,
            },
        }
    }

    pub fn from_privilege(label: &str, err: PrivilegeError) -> Self {
        match err {
            PrivilegeError::Exec(inner) => CoreError::from_exec(label, inner),
            other => other.into(),
        }
    }

    /// What the caller shows the user.
    pub fn into_outcome(self) -> ActionOutcome {
        match self {
            CoreError::ToolMissing(tool) => ActionOutcome::Failed(format!("{tool} is not installed")),
            CoreError::ExitNonZero { command, .. } => ActionOutcome::Failed(command),
            CoreError::Timeout(_) => ActionOutcome::Failed("timeout".into()),
            CoreError::PermissionDenied(_) => ActionOutcome::PermissionDenied,
            CoreError::Unsupported(distro) => ActionOutcome::Unsupported(distro),
            other => ActionOutcome::Failed(other.to_string()),
        }
    }
}

impl From<PrivilegeError> for CoreError {
    fn from(err: PrivilegeError) -> Self {
        match err {
            PrivilegeError::Busy => CoreError::Busy,
            PrivilegeError::Denied(reason) => CoreError::PermissionDenied(reason),
            PrivilegeError::ToolMissing(tool) => CoreError::ToolMissing(tool),
            PrivilegeError::Exec(inner) => CoreError::from_exec("privileged command", inner),
        }
    }
}
