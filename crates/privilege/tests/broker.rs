#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysdeck_executor::{CommandOutput, CommandRunner, ExecutorError, Invocation};
use sysdeck_privilege::*;
use tokio::sync::Notify;
use zeroize::Zeroizing;

const PASSWORD: &str = "correct horse";

/// Accepts `sudo -S ...` only with the right password on stdin.
struct FakeSudo {
    tools: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(Vec<String>, Option<String>)>>,
    install_adds_tool: bool,
}

impl FakeSudo {
    fn new(tools: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tools: Mutex::new(tools.iter().map(|t| t.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
            install_adds_tool: false,
        })
    }

    fn with_working_install(tools: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tools: Mutex::new(tools.iter().map(|t| t.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
            install_adds_tool: true,
        })
    }

    fn calls(&self) -> Vec<(Vec<String>, Option<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeSudo {
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecutorError> {
        let stdin = invocation.stdin.as_ref().map(|s| s.to_string());
        self.calls
            .lock()
            .push((invocation.argv.clone(), stdin.clone()));

        match invocation.program() {
            "sudo" => {
                if stdin.as_deref() == Some(format!("{PASSWORD}\n").as_str()) {
                    Ok(CommandOutput::ok(""))
                } else {
                    Ok(CommandOutput::failed(1, "Sorry, try again."))
                }
            }
            "pkexec" if self.install_adds_tool => {
                self.tools.lock().insert("zenity".to_string());
                Ok(CommandOutput::ok(""))
            }
            "pkexec" => Ok(CommandOutput::failed(127, "not authorized")),
            "yay" => Ok(CommandOutput::ok("")),
            other => Err(ExecutorError::SpawnFailed(other.to_string())),
        }
    }

    fn tool_exists(&self, program: &str) -> bool {
        self.tools.lock().contains(program)
    }
}

/// Prompt that hands out a fixed answer, optionally waiting for a release signal.
struct ScriptedPrompt {
    answer: Option<String>,
    tool: Option<String>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedPrompt {
    fn answering(answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.map(str::to_string),
            tool: None,
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn needing_tool(tool: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(PASSWORD.to_string()),
            tool: Some(tool.to_string()),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(PASSWORD.to_string()),
            tool: None,
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretPrompt for ScriptedPrompt {
    fn required_tool(&self) -> Option<&str> {
        self.tool.as_deref()
    }

    async fn prompt(&self, _reason: &str) -> Result<Option<Zeroizing<String>>, PrivilegeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.answer.clone().map(Zeroizing::new))
    }
}

#[tokio::test]
async fn test_acquire_validates_password() {
    let runner = FakeSudo::new(&["sudo"]);
    let broker = PrivilegeBroker::new(runner.clone(), ScriptedPrompt::answering(Some(PASSWORD)));

    let credential = broker.acquire("update the system").await.unwrap();
    assert!(!credential.is_root());

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["sudo", "-S", "-k", "-v", "-p", ""]);
    assert!(!broker.is_pending());
}

#[tokio::test]
async fn test_wrong_password_is_denied() {
    let runner = FakeSudo::new(&["sudo"]);
    let broker = PrivilegeBroker::new(runner, ScriptedPrompt::answering(Some("nope")));

    let result = broker.acquire("clear swap").await;
    assert!(matches!(result, Err(PrivilegeError::Denied(_))));
    assert!(!broker.is_pending());
}

#[tokio::test]
async fn test_cancelled_prompt_is_denied() {
    let runner = FakeSudo::new(&["sudo"]);
    let broker = PrivilegeBroker::new(runner.clone(), ScriptedPrompt::answering(None));

    let result = broker.acquire("clear cache").await;
    assert!(matches!(result, Err(PrivilegeError::Denied(_))));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_second_acquire_while_pending_is_busy() {
    let gate = Arc::new(Notify::new());
    let prompt = ScriptedPrompt::gated(gate.clone());
    let broker = Arc::new(PrivilegeBroker::new(FakeSudo::new(&["sudo"]), prompt.clone()));

    let first_broker = broker.clone();
    let first = tokio::spawn(async move { first_broker.acquire("first").await });

    while !broker.is_pending() {
        tokio::task::yield_now().await;
    }

    let second = broker.acquire("second").await;
    assert!(matches!(second, Err(PrivilegeError::Busy)));
    assert_eq!(prompt.calls(), 1);

    gate.notify_one();
    let first = first.await.unwrap();
    assert!(first.is_ok());
    assert!(!broker.is_pending());

    // The flag is released, so a later request prompts again.
    gate.notify_one();
    assert!(broker.acquire("third").await.is_ok());
    assert_eq!(prompt.calls(), 2);
}

#[tokio::test]
async fn test_with_privilege_pipes_password_to_sudo() {
    let runner = FakeSudo::new(&["sudo"]);
    let broker = PrivilegeBroker::new(runner.clone(), ScriptedPrompt::answering(Some(PASSWORD)));
    let credential = broker.acquire("clear cache").await.unwrap();

    let argv = vec!["pacman".to_string(), "-Scc".to_string()];
    let output = broker
        .with_privilege(&argv, &credential, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(output.success());

    let (last_argv, last_stdin) = runner.calls().pop().unwrap();
    assert_eq!(
        last_argv,
        vec!["sudo", "-S", "-k", "-p", "", "--", "pacman", "-Scc"]
    );
    assert_eq!(last_stdin.as_deref(), Some("correct horse\n"));
}

#[tokio::test]
async fn test_with_user_sudo_runs_unwrapped_with_password_on_stdin() {
    let runner = FakeSudo::new(&["sudo", "yay"]);
    let broker = PrivilegeBroker::new(runner.clone(), ScriptedPrompt::answering(Some(PASSWORD)));
    let credential = broker.acquire("update the system").await.unwrap();

    let argv: Vec<String> = ["yay", "-Sua", "--noconfirm", "--sudoflags=-S"]
        .into_iter()
        .map(String::from)
        .collect();
    let output = broker
        .with_user_sudo(&argv, &credential, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(output.success());

    let (last_argv, last_stdin) = runner.calls().pop().unwrap();
    assert_eq!(last_argv, argv);
    assert_eq!(last_stdin.as_deref(), Some("correct horse\n"));
}

#[tokio::test]
async fn test_root_passthrough_skips_prompt_and_sudo() {
    let runner = FakeSudo::new(&[]);
    let prompt = ScriptedPrompt::answering(Some(PASSWORD));
    let broker =
        PrivilegeBroker::new(runner.clone(), prompt.clone()).with_root_passthrough(true);

    let credential = broker.acquire("swap").await.unwrap();
    assert!(credential.is_root());
    assert_eq!(prompt.calls(), 0);

    let argv = vec!["swapoff".to_string(), "-a".to_string()];
    let _ = broker
        .with_privilege(&argv, &credential, Duration::from_secs(5))
        .await;
    assert_eq!(runner.calls()[0].0, argv);
}

#[tokio::test]
async fn test_missing_helper_is_remediated_once() {
    let runner = FakeSudo::with_working_install(&["sudo"]);
    let prompt = ScriptedPrompt::needing_tool("zenity");
    let broker = PrivilegeBroker::new(runner.clone(), prompt.clone()).with_remediation(vec![
        "pkexec".into(),
        "pacman".into(),
        "-S".into(),
        "--noconfirm".into(),
        "zenity".into(),
    ]);

    assert!(!broker.helper_available());
    assert!(broker.acquire("update").await.is_ok());
    assert!(broker.helper_available());

    let installs = runner
        .calls()
        .iter()
        .filter(|(argv, _)| argv[0] == "pkexec")
        .count();
    assert_eq!(installs, 1);
}

#[tokio::test]
async fn test_failed_remediation_denies_for_process_lifetime() {
    let runner = FakeSudo::new(&["sudo"]);
    let prompt = ScriptedPrompt::needing_tool("zenity");
    let broker = PrivilegeBroker::new(runner.clone(), prompt.clone())
        .with_remediation(vec!["pkexec".into(), "apt-get".into(), "install".into()]);

    assert!(matches!(
        broker.acquire("update").await,
        Err(PrivilegeError::Denied(_))
    ));
    assert!(matches!(
        broker.acquire("update").await,
        Err(PrivilegeError::Denied(_))
    ));

    let installs = runner
        .calls()
        .iter()
        .filter(|(argv, _)| argv[0] == "pkexec")
        .count();
    assert_eq!(installs, 1);
    assert_eq!(prompt.calls(), 0);
}
