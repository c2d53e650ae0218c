use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use zeroize::Zeroizing;

use crate::guard::ArgvGuard;

/// Timeout applied to invocations that don't set one explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Invalid argv: {0}")]
    InvalidArgv(String),
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Exited with code {code}: {stderr}")]
    ExitNonZero { code: i32, stderr: String },
    #[error("IO error: {0}")]
    Io(String),
}

/// One external process invocation: a resolved program plus discrete arguments.
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<Zeroizing<String>>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_stdin(mut self, input: Zeroizing<String>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = limit;
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Space-joined argv, for logs only.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

// stdin may carry a password, keep it out of Debug output
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("argv", &self.argv)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion and capture its output, whatever the exit code.
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecutorError>;

    /// Whether `program` resolves on PATH.
    fn tool_exists(&self, program: &str) -> bool;

    /// Like `run`, but a non-zero exit becomes `ExitNonZero`.
    async fn run_checked(&self, invocation: Invocation) -> Result<CommandOutput, ExecutorError> {
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExecutorError::ExitNonZero {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs invocations as real child processes through tokio.
///
/// Each child is the leader of its own process group, so a terminal Ctrl-C
/// reaches only this process and never interrupts a running command; callers
/// stop multi-step work through their own cancellation between commands.
/// On timeout the whole group gets SIGTERM (sudo relays it to the command it
/// wraps), then SIGKILL if it is still alive after [`TERM_GRACE`].
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

/// How long a timed-out process group gets between SIGTERM and SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

fn signal_group(leader: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(leader) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group we created at spawn.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        tracing::debug!(
            pgid,
            signal,
            error = %std::io::Error::last_os_error(),
            "signalling process group failed"
        );
    }
}

/// SIGTERM the group, give it [`TERM_GRACE`] to exit, then SIGKILL.
async fn terminate<F: Future + Unpin>(leader: Option<u32>, running: F, cmdline: &str) {
    let Some(leader) = leader else {
        return;
    };
    signal_group(leader, libc::SIGTERM);
    if timeout(TERM_GRACE, running).await.is_err() {
        tracing::warn!(command = %cmdline, "command ignored SIGTERM, killing its process group");
        signal_group(leader, libc::SIGKILL);
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecutorError> {
        ArgvGuard::validate(&invocation.argv)?;

        let cmdline = invocation.display();
        let Invocation {
            argv,
            stdin,
            timeout: limit,
        } = invocation;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecutorError::InvalidArgv("empty argv".into()))?;

        tracing::debug!(command = %cmdline, timeout_ms = limit.as_millis() as u64, "spawning");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutorError::SpawnFailed(format!("{program}: {e}")))?;
        let leader = child.id();

        let exec_future = async move {
            if let (Some(input), Some(mut pipe)) = (stdin.as_ref(), child.stdin.take()) {
                match pipe.write_all(input.as_bytes()).await {
                    Ok(()) => {}
                    // child exited without reading its input
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
                drop(pipe);
            }
            child.wait_with_output().await
        };
        tokio::pin!(exec_future);

        let output = match timeout(limit, exec_future.as_mut()).await {
            Ok(output) => output.map_err(|e| ExecutorError::Io(e.to_string()))?,
            Err(_) => {
                tracing::warn!(command = %cmdline, "command timed out, terminating");
                terminate(leader, exec_future.as_mut(), &cmdline).await;
                return Err(ExecutorError::Timeout(limit));
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        tracing::debug!(command = %cmdline, exit_code = result.exit_code, "finished");
        Ok(result)
    }

    fn tool_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
