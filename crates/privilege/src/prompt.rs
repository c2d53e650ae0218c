//! Secret-entry prompts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sysdeck_executor::{CommandRunner, Invocation};
use zeroize::Zeroizing;

use crate::broker::PrivilegeError;

#[async_trait]
pub trait SecretPrompt: Send + Sync {
    /// External program the prompt needs on PATH, if any.
    fn required_tool(&self) -> Option<&str>;

    /// Ask for the password. `Ok(None)` means the user dismissed the prompt.
    async fn prompt(&self, reason: &str) -> Result<Option<Zeroizing<String>>, PrivilegeError>;
}

/// Graphical password dialog driven through an external helper (zenity, kdialog).
pub struct HelperPrompt {
    runner: Arc<dyn CommandRunner>,
    helper: String,
    timeout: Duration,
}

impl HelperPrompt {
    pub fn new(runner: Arc<dyn CommandRunner>, helper: impl Into<String>) -> Self {
        Self {
            runner,
            helper: helper.into(),
            // the user is typing, give them time
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = limit;
        self
    }

    fn argv(&self, reason: &str) -> Vec<String> {
        let title = format!("Authentication required: {reason}");
        match self.helper.as_str() {
            "zenity" => vec![
                "zenity".into(),
                "--password".into(),
                "--title".into(),
                title,
            ],
            "kdialog" => vec!["kdialog".into(), "--password".into(), title],
            other => vec![other.to_string(), title],
        }
    }
}

#[async_trait]
impl SecretPrompt for HelperPrompt {
    fn required_tool(&self) -> Option<&str> {
        Some(&self.helper)
    }

    async fn prompt(&self, reason: &str) -> Result<Option<Zeroizing<String>>, PrivilegeError> {
        let invocation = Invocation::new(self.argv(reason)).with_timeout(self.timeout);
        let output = self.runner.run(invocation).await?;
        let raw = Zeroizing::new(output.stdout);
        if output.exit_code != 0 {
            tracing::info!(helper = %self.helper, "password prompt dismissed");
            return Ok(None);
        }
        let secret = raw.strip_suffix('\n').unwrap_or(raw.as_str());
        Ok(Some(Zeroizing::new(secret.to_string())))
    }
}

/// Reads the password from the controlling terminal without echo.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl SecretPrompt for TerminalPrompt {
    fn required_tool(&self) -> Option<&str> {
        None
    }

    async fn prompt(&self, reason: &str) -> Result<Option<Zeroizing<String>>, PrivilegeError> {
        let message = format!("[sysdeck] password to {reason}: ");
        let read = tokio::task::spawn_blocking(move || rpassword::prompt_password(message))
            .await
            .map_err(|e| PrivilegeError::Denied(e.to_string()))?;
        match read {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(PrivilegeError::Denied(format!("terminal prompt failed: {e}"))),
        }
    }
}
