use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysdeck_executor::{CommandOutput, CommandRunner, ExecutorError, Invocation};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::credential::Credential;
use crate::prompt::SecretPrompt;

const SUDO: &str = "sudo";

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("A privilege prompt is already pending")]
    Busy,
    #[error("Permission denied: {0}")]
    Denied(String),
    #[error("Required tool missing: {0}")]
    ToolMissing(String),
    #[error(transparent)]
    Exec(#[from] ExecutorError),
}

/// Check if we're running as root
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperState {
    Unchecked,
    Available,
    Missing,
    /// The one install attempt failed; stays this way for the process lifetime.
    RemediationFailed,
}

/// Clears the pending flag on every exit path of `acquire`.
struct PendingGuard<'a>(&'a AtomicBool);

impl<'a> PendingGuard<'a> {
    fn try_claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PrivilegeBroker {
    runner: Arc<dyn CommandRunner>,
    prompt: Arc<dyn SecretPrompt>,
    pending: AtomicBool,
    helper: Mutex<HelperState>,
    remediation: Option<Vec<String>>,
    validate_timeout: Duration,
    root_passthrough: bool,
}

impl PrivilegeBroker {
    pub fn new(runner: Arc<dyn CommandRunner>, prompt: Arc<dyn SecretPrompt>) -> Self {
        Self {
            runner,
            prompt,
            pending: AtomicBool::new(false),
            helper: Mutex::new(HelperState::Unchecked),
            remediation: None,
            validate_timeout: Duration::from_secs(10),
            root_passthrough: false,
        }
    }

    /// argv that installs the prompt helper when it is missing.
    pub fn with_remediation(mut self, argv: Vec<String>) -> Self {
        self.remediation = Some(argv);
        self
    }

    /// Skip prompting entirely when the process is already root.
    pub fn with_root_passthrough(mut self, enabled: bool) -> Self {
        self.root_passthrough = enabled;
        self
    }

    pub fn with_validate_timeout(mut self, limit: Duration) -> Self {
        self.validate_timeout = limit;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Memoized answer to "can we show a prompt at all".
    pub fn helper_available(&self) -> bool {
        let Some(tool) = self.prompt.required_tool() else {
            return true;
        };
        let mut state = self.helper.lock();
        if *state == HelperState::Unchecked {
            *state = if self.runner.tool_exists(tool) {
                HelperState::Available
            } else {
                HelperState::Missing
            };
            tracing::debug!(helper = tool, state = ?*state, "checked prompt helper");
        }
        *state == HelperState::Available
    }

    /// Obtain a validated credential. Fails fast with `Busy` while another
    /// acquisition is outstanding.
    pub async fn acquire(&self, reason: &str) -> Result<Credential, PrivilegeError> {
        let _pending = PendingGuard::try_claim(&self.pending).ok_or_else(|| {
            tracing::warn!(reason, "privilege prompt already pending");
            PrivilegeError::Busy
        })?;

        if self.root_passthrough {
            return Ok(Credential::root());
        }

        self.ensure_helper().await?;

        let secret = self
            .prompt
            .prompt(reason)
            .await?
            .ok_or_else(|| PrivilegeError::Denied("password prompt cancelled".into()))?;
        if secret.is_empty() {
            return Err(PrivilegeError::Denied("empty password".into()));
        }

        self.validate(&secret).await?;
        tracing::info!(reason, "privilege acquired");
        Ok(Credential::from_secret(secret))
    }

    /// Run `argv` as root. The password goes to `sudo -S` on stdin; sudo never
    /// prompts on a TTY.
    pub async fn with_privilege(
        &self,
        argv: &[String],
        credential: &Credential,
        limit: Duration,
    ) -> Result<CommandOutput, PrivilegeError> {
        let invocation = match credential.stdin_line() {
            None => Invocation::new(argv.iter().cloned()),
            Some(line) => Invocation::new(
                [SUDO, "-S", "-k", "-p", "", "--"]
                    .into_iter()
                    .map(String::from)
                    .chain(argv.iter().cloned()),
            )
            .with_stdin(line),
        };

        match self.runner.run(invocation.with_timeout(limit)).await {
            Err(ExecutorError::SpawnFailed(cause)) if !credential.is_root() => {
                tracing::error!(%cause, "sudo could not be spawned");
                Err(PrivilegeError::ToolMissing(SUDO.into()))
            }
            other => Ok(other?),
        }
    }

    /// Run `argv` as the invoking user with the password on stdin, for tools
    /// that call `sudo -S` themselves (AUR helpers with `--sudoflags=-S`).
    pub async fn with_user_sudo(
        &self,
        argv: &[String],
        credential: &Credential,
        limit: Duration,
    ) -> Result<CommandOutput, PrivilegeError> {
        let mut invocation = Invocation::new(argv.iter().cloned()).with_timeout(limit);
        if let Some(line) = credential.stdin_line() {
            invocation = invocation.with_stdin(line);
        }
        Ok(self.runner.run(invocation).await?)
    }

    async fn validate(&self, secret: &Zeroizing<String>) -> Result<(), PrivilegeError> {
        let line = Zeroizing::new(format!("{}\n", secret.as_str()));
        let invocation = Invocation::new([SUDO, "-S", "-k", "-v", "-p", ""])
            .with_stdin(line)
            .with_timeout(self.validate_timeout);

        match self.runner.run(invocation).await {
            Ok(output) if output.success() => Ok(()),
            Ok(_) => Err(PrivilegeError::Denied("authentication failed".into())),
            Err(ExecutorError::SpawnFailed(_)) => Err(PrivilegeError::ToolMissing(SUDO.into())),
            Err(ExecutorError::Timeout(_)) => {
                Err(PrivilegeError::Denied("authentication timed out".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_helper(&self) -> Result<(), PrivilegeError> {
        if self.helper_available() {
            return Ok(());
        }
        let tool = self.prompt.required_tool().unwrap_or_default().to_string();

        if *self.helper.lock() == HelperState::RemediationFailed {
            return Err(PrivilegeError::Denied(format!(
                "prompt helper {tool} is unavailable"
            )));
        }

        // Exactly one install attempt per process lifetime.
        let installed = match &self.remediation {
            Some(argv) => {
                tracing::warn!(helper = %tool, command = %argv.join(" "), "installing prompt helper");
                let invocation =
                    Invocation::new(argv.iter().cloned()).with_timeout(Duration::from_secs(300));
                match self.runner.run(invocation).await {
                    Ok(output) if output.success() => self.runner.tool_exists(&tool),
                    Ok(output) => {
                        tracing::error!(helper = %tool, stderr = %output.stderr.trim(), "helper install failed");
                        false
                    }
                    Err(e) => {
                        tracing::error!(helper = %tool, error = %e, "helper install failed");
                        false
                    }
                }
            }
            None => false,
        };

        let mut state = self.helper.lock();
        if installed {
            *state = HelperState::Available;
            Ok(())
        } else {
            *state = HelperState::RemediationFailed;
            Err(PrivilegeError::Denied(format!(
                "prompt helper {tool} is unavailable"
            )))
        }
    }
}
