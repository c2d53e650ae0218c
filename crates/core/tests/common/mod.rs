#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysdeck_core::{DistroFamily, DistroResolver, Orchestrator, PanelConfig};
use sysdeck_executor::{CommandOutput, CommandRunner, ExecutorError, Invocation};
use sysdeck_privilege::{PrivilegeBroker, PrivilegeError, SecretPrompt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

pub const PASSWORD: &str = "hunter2";

pub const SENSORS_OUTPUT: &str = "coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +52.0°C  (high = +100.0°C, crit = +100.0°C)
Core 0:        +49.0°C  (high = +100.0°C, crit = +100.0°C)

thinkpad-isa-0000
Adapter: ISA adapter
fan1:        2400 RPM
";

/// Mutable host state the fake tools read and write.
pub struct HostState {
    pub profile: String,
    /// `powerprofilesctl set` is accepted but ignored.
    pub profile_stuck: bool,
    pub wifi: bool,
    pub bluetooth_blocked: bool,
    pub wlan_blocked: bool,
    pub mic_muted: bool,
    pub user: String,
    pub orphans: Vec<String>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            profile: "balanced".into(),
            profile_stuck: false,
            wifi: true,
            bluetooth_blocked: false,
            wlan_blocked: false,
            mic_muted: false,
            user: "alice".into(),
            orphans: Vec::new(),
        }
    }
}

/// A recorded command, with `sudo -S -k -p "" --` stripped off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub argv: Vec<String>,
    pub privileged: bool,
    /// What an unwrapped command received on stdin.
    pub stdin: Option<String>,
}

impl Call {
    pub fn line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Simulated host: a handful of tools backed by `HostState`.
pub struct FakeHost {
    tools: Mutex<HashSet<String>>,
    pub state: Mutex<HostState>,
    calls: Mutex<Vec<Call>>,
    /// Keyed by the first two argv words, e.g. `apt-get update`.
    failures: Mutex<HashMap<String, i32>>,
    timeouts: Mutex<HashSet<String>>,
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeHost {
    pub fn new(tools: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tools: Mutex::new(tools.iter().map(|t| t.to_string()).collect()),
            state: Mutex::new(HostState::default()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashSet::new()),
            cancel_after: Mutex::new(None),
        })
    }

    /// Every tool the orchestrator knows how to drive.
    pub fn full() -> Arc<Self> {
        Self::new(&[
            "sudo",
            "id",
            "powerprofilesctl",
            "nmcli",
            "rfkill",
            "wpctl",
            "pacman",
            "apt-get",
            "dnf",
            "swapoff",
            "swapon",
            "pkill",
            "find",
        ])
    }

    pub fn fail(&self, key: &str, code: i32) {
        self.failures.lock().insert(key.to_string(), code);
    }

    pub fn time_out(&self, key: &str) {
        self.timeouts.lock().insert(key.to_string());
    }

    /// Fire `token` once the command keyed by `key` has finished.
    pub fn cancel_after(&self, key: &str, token: CancellationToken) {
        *self.cancel_after.lock() = Some((key.to_string(), token));
    }

    pub fn remove_tool(&self, tool: &str) {
        self.tools.lock().remove(tool);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn privileged_lines(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.privileged)
            .map(|c| c.line())
            .collect()
    }

    pub fn ran(&self, line: &str) -> bool {
        self.calls().iter().any(|c| c.line() == line)
    }

    fn dispatch(&self, argv: &[String]) -> CommandOutput {
        let words: Vec<&str> = argv.iter().map(String::as_str).collect();
        let key = words.iter().take(2).copied().collect::<Vec<_>>().join(" ");
        if let Some(code) = self.failures.lock().get(&key) {
            return CommandOutput::failed(*code, "simulated failure");
        }

        let mut state = self.state.lock();
        match words.as_slice() {
            ["id", "-un"] => CommandOutput::ok(format!("{}\n", state.user)),
            ["powerprofilesctl", "get"] => CommandOutput::ok(format!("{}\n", state.profile)),
            ["powerprofilesctl", "set", profile] => {
                if !state.profile_stuck {
                    state.profile = profile.to_string();
                }
                CommandOutput::ok("")
            }
            ["nmcli", "radio", "wifi"] => {
                CommandOutput::ok(if state.wifi { "enabled\n" } else { "disabled\n" })
            }
            ["nmcli", "radio", "wifi", value] => {
                state.wifi = *value == "on";
                CommandOutput::ok("")
            }
            ["rfkill", "list", "bluetooth"] => {
                CommandOutput::ok(rfkill_device(0, "hci0", "Bluetooth", state.bluetooth_blocked))
            }
            ["rfkill", "list"] => CommandOutput::ok(format!(
                "{}{}",
                rfkill_device(0, "hci0", "Bluetooth", state.bluetooth_blocked),
                rfkill_device(1, "phy0", "Wireless LAN", state.wlan_blocked)
            )),
            ["rfkill", verb, target] => {
                let blocked = *verb == "block";
                if *target == "all" || *target == "bluetooth" {
                    state.bluetooth_blocked = blocked;
                }
                if *target == "all" {
                    state.wlan_blocked = blocked;
                }
                CommandOutput::ok("")
            }
            ["wpctl", "get-volume", "@DEFAULT_AUDIO_SOURCE@"] => CommandOutput::ok(if state.mic_muted {
                "Volume: 0.40 [MUTED]\n"
            } else {
                "Volume: 0.40\n"
            }),
            ["wpctl", "get-volume", _] => CommandOutput::ok("Volume: 0.55\n"),
            ["wpctl", "set-mute", _, value] => {
                state.mic_muted = *value == "1";
                CommandOutput::ok("")
            }
            ["pacman", "-Qdtq"] if state.orphans.is_empty() => CommandOutput::failed(1, ""),
            ["pacman", "-Qdtq"] => CommandOutput::ok(
                state
                    .orphans
                    .iter()
                    .map(|p| format!("{p}\n"))
                    .collect::<String>(),
            ),
            ["pacman", "-Rns", "--noconfirm", removed @ ..] => {
                state.orphans.retain(|p| !removed.contains(&p.as_str()));
                CommandOutput::ok("")
            }
            ["systemctl", "list-unit-files", "--no-legend", unit] => {
                if *unit == "power-profiles-daemon.service" {
                    CommandOutput::ok(format!("{unit} enabled enabled\n"))
                } else {
                    CommandOutput::failed(1, "")
                }
            }
            ["sensors"] => CommandOutput::ok(SENSORS_OUTPUT),
            _ => CommandOutput::ok(""),
        }
    }
}

fn rfkill_device(index: u32, name: &str, kind: &str, blocked: bool) -> String {
    format!(
        "{index}: {name}: {kind}\n\tSoft blocked: {}\n\tHard blocked: no\n",
        if blocked { "yes" } else { "no" }
    )
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecutorError> {
        let program = invocation.program().to_string();
        if !self.tools.lock().contains(&program) {
            return Err(ExecutorError::SpawnFailed(format!("{program}: not found")));
        }

        let stdin = invocation.stdin.as_ref().map(|s| s.as_str().to_string());
        let (argv, privileged, stdin) = if program == "sudo" {
            if stdin.as_deref() != Some(format!("{PASSWORD}\n").as_str()) {
                return Ok(CommandOutput::failed(1, "Sorry, try again."));
            }
            if invocation.argv.iter().any(|a| a == "-v") {
                return Ok(CommandOutput::ok(""));
            }
            let Some(split) = invocation.argv.iter().position(|a| a == "--") else {
                return Ok(CommandOutput::failed(1, "usage: sudo"));
            };
            (invocation.argv[split + 1..].to_vec(), true, None)
        } else {
            (invocation.argv.clone(), false, stdin)
        };

        self.calls.lock().push(Call {
            argv: argv.clone(),
            privileged,
            stdin,
        });

        let key = argv.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        if self.timeouts.lock().contains(&key) {
            return Err(ExecutorError::Timeout(invocation.timeout));
        }
        let output = self.dispatch(&argv);
        if let Some((after, token)) = self.cancel_after.lock().as_ref() {
            if *after == key {
                token.cancel();
            }
        }
        Ok(output)
    }

    fn tool_exists(&self, program: &str) -> bool {
        self.tools.lock().contains(program)
    }
}

/// Password prompt with a fixed answer; optionally blocks until released.
pub struct TestPrompt {
    answer: Option<String>,
    prompts: AtomicUsize,
    release: Option<Arc<Notify>>,
}

impl TestPrompt {
    pub fn answering(answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.map(str::to_string),
            prompts: AtomicUsize::new(0),
            release: None,
        })
    }

    pub fn correct() -> Arc<Self> {
        Self::answering(Some(PASSWORD))
    }

    pub fn held(release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(PASSWORD.to_string()),
            prompts: AtomicUsize::new(0),
            release: Some(release),
        })
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Resolves once a prompt is on screen.
    pub async fn wait_until_shown(&self) {
        while self.prompts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl SecretPrompt for TestPrompt {
    fn required_tool(&self) -> Option<&str> {
        None
    }

    async fn prompt(&self, _reason: &str) -> Result<Option<Zeroizing<String>>, PrivilegeError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            release.notified().await;
        }
        Ok(self.answer.clone().map(Zeroizing::new))
    }
}

pub fn orchestrator(
    host: &Arc<FakeHost>,
    prompt: &Arc<TestPrompt>,
    family: DistroFamily,
) -> Orchestrator {
    let broker = Arc::new(PrivilegeBroker::new(host.clone(), prompt.clone()));
    Orchestrator::new(host.clone(), broker, test_config())
        .with_distro(DistroResolver::fixed(family))
}

pub fn test_config() -> PanelConfig {
    PanelConfig {
        power_supply_root: "/nonexistent/power_supply".into(),
        aur_helpers: Vec::new(),
        ..PanelConfig::default()
    }
}
