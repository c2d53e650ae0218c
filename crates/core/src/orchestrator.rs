//! Action orchestrator: one entry point per maintenance action.
//!
//! Each privileged action moves `Idle → RequestingPrivilege → Executing →
//! Reconciling → Idle`; toggles skip the broker and the phase machine. The
//! result handed back always carries state re-read from the host after the
//! command ran, never the state the caller asked for.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use sysdeck_executor::{CommandRunner, Invocation};
use sysdeck_privilege::{Credential, PrivilegeBroker};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::backlight::{Backlight, BacklightTarget, BacklightWarning};
use crate::config::PanelConfig;
use crate::distro::{self, DistroFamily, DistroResolver, OrphanPlan};
use crate::error::CoreError;
use crate::metrics::{ActionMetrics, MetricsSnapshot};
use crate::probes::Probes;
use crate::types::{
    ActionOutcome, ActionRequest, ActionResult, PowerProfile, ProfileView, StateFragment,
    SystemSnapshot, ToggleKind, ToggleState,
};

const MIC_SOURCE: &str = "@DEFAULT_AUDIO_SOURCE@";
const TEMP_DIRS: &[&str] = &["/tmp", "/var/tmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionPhase {
    Idle,
    RequestingPrivilege,
    Executing,
    Reconciling,
}

/// Puts the phase back to `Idle` however the action future ends.
struct PhaseReset<'a>(&'a Mutex<ActionPhase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        *self.0.lock() = ActionPhase::Idle;
    }
}

struct Step {
    label: String,
    argv: Vec<String>,
    privileged: bool,
    feeds_sudo: bool,
    timeout: Duration,
    accept: &'static [i32],
}

impl Step {
    fn privileged(label: impl Into<String>, argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            argv,
            privileged: true,
            feeds_sudo: false,
            timeout,
            accept: &[0],
        }
    }

    fn accepting(mut self, codes: &'static [i32]) -> Self {
        self.accept = codes;
        self
    }
}

#[derive(Default)]
struct PlanContext {
    user: Option<String>,
    packages: Vec<String>,
}

enum Plan {
    Run {
        steps: Vec<Step>,
        context: PlanContext,
    },
    /// Nothing to do; report this state without prompting.
    Skip(StateFragment),
}

impl Plan {
    fn steps(steps: Vec<Step>) -> Self {
        Plan::Run {
            steps,
            context: PlanContext::default(),
        }
    }
}

struct Reconciled {
    fragment: StateFragment,
    /// Set when the observed state does not match what was requested.
    drift: Option<String>,
}

impl Reconciled {
    fn observed(fragment: StateFragment) -> Self {
        Self {
            fragment,
            drift: None,
        }
    }
}

fn strings(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|s| s.to_string()).collect()
}

/// Short label for a package-manager argv, e.g. `pacman -Scc`.
fn label_of(argv: &[String]) -> String {
    argv.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
}

pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    broker: Arc<PrivilegeBroker>,
    probes: Probes,
    distro: DistroResolver,
    backlight: Backlight,
    config: PanelConfig,
    gate: Semaphore,
    phase: Mutex<ActionPhase>,
    metrics: ActionMetrics,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        broker: Arc<PrivilegeBroker>,
        config: PanelConfig,
    ) -> Self {
        if !broker.helper_available() {
            tracing::warn!(
                helper = %config.prompt_helper,
                "privilege prompt helper not found, it will be installed on first use"
            );
        }

        Self {
            probes: Probes::new(runner.clone(), &config),
            backlight: Backlight::from_config(&config),
            distro: DistroResolver::new(),
            runner,
            broker,
            config,
            gate: Semaphore::new(1),
            phase: Mutex::new(ActionPhase::Idle),
            metrics: ActionMetrics::new(),
        }
    }

    pub fn with_distro(mut self, distro: DistroResolver) -> Self {
        self.distro = distro;
        self
    }

    pub fn probes(&self) -> &Probes {
        &self.probes
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn phase(&self) -> ActionPhase {
        *self.phase.lock()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn distro_family(&self) -> DistroFamily {
        self.distro.resolve()
    }

    /// Fresh snapshot of every probe; also becomes the cached last snapshot.
    pub async fn poll(&self) -> SystemSnapshot {
        self.probes.snapshot().await
    }

    pub fn last_snapshot(&self) -> Option<SystemSnapshot> {
        self.probes.last_snapshot()
    }

    /// Current brightness percent, read from sysfs.
    pub async fn backlight(&self, target: BacklightTarget) -> Result<u8, BacklightWarning> {
        self.backlight.get(target).await
    }

    pub async fn set_backlight(
        &self,
        target: BacklightTarget,
        percent: u8,
    ) -> Result<u8, BacklightWarning> {
        self.backlight.set(target, percent).await
    }

    pub async fn execute(&self, request: ActionRequest) -> ActionResult {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run one action to completion. Cancellation is honored between the
    /// steps of multi-command actions, never in the middle of a command.
    ///
    /// `KillUserProcesses` kills every process of the invoking user, which
    /// normally includes the caller; not getting a result back is the
    /// expected outcome of that action.
    pub async fn execute_with_cancel(
        &self,
        request: ActionRequest,
        cancel: CancellationToken,
    ) -> ActionResult {
        let action = request.name();
        tracing::info!(action, "action requested");
        self.metrics.inc_started();

        let result = if request.requires_privilege() {
            // One privileged action at a time; a second request is rejected, not queued.
            match self.gate.try_acquire() {
                Ok(_permit) => {
                    let _reset = PhaseReset(&self.phase);
                    self.run_privileged(request, &cancel).await
                }
                Err(_) => Err(CoreError::Busy),
            }
        } else {
            self.run_direct(request).await
        };

        let result = match result {
            Ok(Reconciled {
                fragment,
                drift: None,
            }) => ActionResult::new(action, ActionOutcome::Succeeded, fragment),
            Ok(Reconciled {
                fragment,
                drift: Some(reason),
            }) => {
                tracing::warn!(action, %reason, "observed state differs from request");
                ActionResult::new(action, ActionOutcome::Failed(reason), fragment)
            }
            Err(e) => {
                tracing::warn!(action, error = %e, "action failed");
                ActionResult::new(action, e.into_outcome(), StateFragment::None)
            }
        };

        self.metrics.record(&result.outcome);
        tracing::info!(action, outcome = ?result.outcome, "action finished");
        result
    }

    async fn run_direct(&self, request: ActionRequest) -> Result<Reconciled, CoreError> {
        match request {
            ActionRequest::Toggle { kind, target } => self.toggle(kind, target).await,
            other => Err(CoreError::InvalidRequest(format!(
                "{} needs the privilege broker",
                other.name()
            ))),
        }
    }

    fn set_phase(&self, phase: ActionPhase) {
        tracing::debug!(?phase, "action phase");
        *self.phase.lock() = phase;
    }

    fn ensure_tool(&self, program: &str) -> Result<(), CoreError> {
        if self.runner.tool_exists(program) {
            Ok(())
        } else {
            Err(CoreError::ToolMissing(program.to_string()))
        }
    }

    fn supported_family(&self) -> Result<DistroFamily, CoreError> {
        let family = self.distro.resolve();
        if family.is_supported() {
            Ok(family)
        } else {
            Err(CoreError::Unsupported(
                "distribution is not Arch, Debian or Fedora based".into(),
            ))
        }
    }

    async fn run_privileged(
        &self,
        request: ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<Reconciled, CoreError> {
        let (steps, context) = match self.plan(&request).await? {
            Plan::Skip(fragment) => return Ok(Reconciled::observed(fragment)),
            Plan::Run { steps, context } => (steps, context),
        };
        for step in &steps {
            self.ensure_tool(&step.argv[0])?;
        }

        self.set_phase(ActionPhase::RequestingPrivilege);
        let credential = self.broker.acquire(&request.reason()).await?;

        self.set_phase(ActionPhase::Executing);
        let completed = self.run_steps(&steps, &credential, cancel).await;
        drop(credential);
        let completed = completed?;

        self.set_phase(ActionPhase::Reconciling);
        Ok(self.reconcile(&request, context, completed).await)
    }

    async fn plan(&self, request: &ActionRequest) -> Result<Plan, CoreError> {
        let timeout = self.config.action_timeout();
        match request {
            ActionRequest::SetPowerProfile { profile } => {
                if *profile == PowerProfile::Unknown {
                    return Err(CoreError::InvalidRequest(
                        "cannot switch to an unknown power profile".into(),
                    ));
                }
                Ok(Plan::steps(vec![Step::privileged(
                    "powerprofilesctl set",
                    strings(&["powerprofilesctl", "set", profile.as_str()]),
                    timeout,
                )]))
            }
            ActionRequest::ClearCache => {
                let family = self.supported_family()?;
                let argv = distro::cache_clean_argv(family)
                    .ok_or_else(|| CoreError::Unsupported(family.to_string()))?;
                Ok(Plan::steps(vec![Step::privileged(
                    label_of(&argv),
                    argv,
                    timeout,
                )]))
            }
            ActionRequest::ClearOrphans => self.plan_orphans().await,
            ActionRequest::ClearSwap => Ok(Plan::steps(vec![
                Step::privileged("swapoff -a", strings(&["swapoff", "-a"]), timeout),
                Step::privileged("swapon -a", strings(&["swapon", "-a"]), timeout),
            ])),
            ActionRequest::KillUserProcesses => {
                let user = self.invoking_user().await?;
                // pkill exits 1 when nothing matched
                let step = Step::privileged(
                    "kill user processes",
                    strings(&["pkill", "-KILL", "-u", user.as_str()]),
                    timeout,
                )
                .accepting(&[0, 1]);
                Ok(Plan::Run {
                    steps: vec![step],
                    context: PlanContext {
                        user: Some(user),
                        packages: Vec::new(),
                    },
                })
            }
            ActionRequest::ClearSessionTemp => {
                let user = self.invoking_user().await?;
                let mut argv = strings(&["find"]);
                argv.extend(strings(TEMP_DIRS));
                argv.extend(strings(&["-mindepth", "1", "-xdev", "-user", user.as_str(), "-delete"]));
                Ok(Plan::Run {
                    steps: vec![Step::privileged("clear session temp", argv, timeout)],
                    context: PlanContext {
                        user: Some(user),
                        packages: Vec::new(),
                    },
                })
            }
            ActionRequest::UpdateSystem => {
                let family = self.supported_family()?;
                let helpers: Vec<String> = self
                    .config
                    .aur_helpers
                    .iter()
                    .filter(|helper| self.runner.tool_exists(helper))
                    .cloned()
                    .collect();
                let update_timeout = self.config.update_timeout();
                let steps = distro::update_sequence(family, &helpers)
                    .into_iter()
                    .map(|step| Step {
                        label: step.label,
                        argv: step.argv,
                        privileged: step.privileged,
                        feeds_sudo: step.feeds_sudo,
                        timeout: update_timeout,
                        accept: &[0],
                    })
                    .collect();
                Ok(Plan::steps(steps))
            }
            ActionRequest::Toggle { .. } => Err(CoreError::InvalidRequest(
                "toggles do not go through the privilege broker".into(),
            )),
        }
    }

    /// Orphans are listed first and passed to the remover as discrete
    /// arguments. An empty list finishes without prompting.
    async fn plan_orphans(&self) -> Result<Plan, CoreError> {
        let family = self.supported_family()?;
        let plan = distro::orphan_plan(family)
            .ok_or_else(|| CoreError::Unsupported(family.to_string()))?;

        let packages = match &plan {
            OrphanPlan::QueryThenRemove { query, .. } => {
                let label = label_of(query);
                self.ensure_tool(&query[0])?;
                let output = self
                    .runner
                    .run(Invocation::new(query.iter().cloned()).with_timeout(self.config.action_timeout()))
                    .await
                    .map_err(|e| CoreError::from_exec(&label, e))?;

                // pacman -Qdtq exits 1 with no output when there is nothing to remove
                if !output.success()
                    && !(output.stdout.trim().is_empty() && output.stderr.trim().is_empty())
                {
                    return Err(CoreError::ExitNonZero {
                        command: label,
                        code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    });
                }

                let packages: Vec<String> = output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect();
                if let Some(bad) = packages.iter().find(|p| !distro::is_package_name(p)) {
                    return Err(CoreError::InvalidRequest(format!(
                        "unexpected package name from {label}: {bad:?}"
                    )));
                }
                if packages.is_empty() {
                    tracing::info!("no orphaned packages");
                    return Ok(Plan::Skip(StateFragment::PackagesRemoved {
                        packages: Vec::new(),
                    }));
                }
                packages
            }
            OrphanPlan::Direct(_) => Vec::new(),
        };

        let argv = plan.removal_argv(&packages);
        Ok(Plan::Run {
            steps: vec![Step::privileged(
                label_of(&argv),
                argv,
                self.config.action_timeout(),
            )],
            context: PlanContext {
                user: None,
                packages,
            },
        })
    }

    /// Login name of the user running the panel. Root is refused: user-scoped
    /// actions never widen to the whole system.
    async fn invoking_user(&self) -> Result<String, CoreError> {
        let output = self
            .runner
            .run_checked(Invocation::new(["id", "-un"]).with_timeout(self.config.probe_timeout()))
            .await
            .map_err(|e| CoreError::from_exec("id -un", e))?;
        let user = output.stdout.trim().to_string();
        if user.is_empty() {
            return Err(CoreError::ProbeUnavailable("current user".into()));
        }
        if user == "root" {
            return Err(CoreError::InvalidRequest(
                "refusing to run a user-scoped action as root".into(),
            ));
        }
        Ok(user)
    }

    async fn run_steps(
        &self,
        steps: &[Step],
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, CoreError> {
        let mut completed = Vec::with_capacity(steps.len());

        for step in steps {
            if cancel.is_cancelled() {
                tracing::warn!(step = %step.label, "cancelled before step");
                return Err(CoreError::Cancelled(step.label.clone()));
            }

            tracing::info!(step = %step.label, privileged = step.privileged, "running step");
            let output = if step.privileged {
                self.broker
                    .with_privilege(&step.argv, credential, step.timeout)
                    .await
                    .map_err(|e| CoreError::from_privilege(&step.label, e))?
            } else if step.feeds_sudo {
                // makepkg refuses to build as root
                if credential.is_root() {
                    tracing::warn!(step = %step.label, "skipping step that cannot run as root");
                    continue;
                }
                self.broker
                    .with_user_sudo(&step.argv, credential, step.timeout)
                    .await
                    .map_err(|e| CoreError::from_privilege(&step.label, e))?
            } else {
                self.runner
                    .run(Invocation::new(step.argv.iter().cloned()).with_timeout(step.timeout))
                    .await
                    .map_err(|e| CoreError::from_exec(&step.label, e))?
            };

            if !step.accept.contains(&output.exit_code) {
                tracing::warn!(
                    step = %step.label,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "step failed, stopping sequence"
                );
                return Err(CoreError::ExitNonZero {
                    command: step.label.clone(),
                    code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            completed.push(step.label.clone());
        }

        Ok(completed)
    }

    async fn reconcile(
        &self,
        request: &ActionRequest,
        context: PlanContext,
        completed: Vec<String>,
    ) -> Reconciled {
        match request {
            ActionRequest::SetPowerProfile { profile } => {
                let active = self.probes.active_power_profile().await;
                Reconciled {
                    fragment: StateFragment::PowerProfile(ProfileView::observed(active)),
                    drift: (active != *profile)
                        .then(|| format!("power profile is {active}, expected {profile}")),
                }
            }
            ActionRequest::ClearCache | ActionRequest::ClearSwap => {
                let fragment = match self.probes.disk_memory_usage().await {
                    Some(usage) => StateFragment::Resources(usage),
                    None => StateFragment::None,
                };
                Reconciled::observed(fragment)
            }
            ActionRequest::ClearOrphans => Reconciled::observed(StateFragment::PackagesRemoved {
                packages: context.packages,
            }),
            ActionRequest::KillUserProcesses | ActionRequest::ClearSessionTemp => {
                Reconciled::observed(StateFragment::UserScoped {
                    user: context.user.unwrap_or_default(),
                })
            }
            ActionRequest::UpdateSystem => {
                Reconciled::observed(StateFragment::UpdateSteps { completed })
            }
            ActionRequest::Toggle { .. } => Reconciled::observed(StateFragment::None),
        }
    }

    async fn toggle(
        &self,
        kind: ToggleKind,
        target: Option<ToggleState>,
    ) -> Result<Reconciled, CoreError> {
        let target = match target {
            Some(ToggleState::Unknown) => {
                return Err(CoreError::InvalidRequest(format!(
                    "{kind} target must be on or off"
                )))
            }
            Some(target) => target,
            None => self
                .probes
                .toggle_state(kind)
                .await
                .flipped()
                .ok_or_else(|| CoreError::ProbeUnavailable(format!("{kind} state")))?,
        };

        let argv = self.toggle_argv(kind, target);
        let label = argv.join(" ");
        self.ensure_tool(&argv[0])?;

        self.runner
            .run_checked(Invocation::new(argv).with_timeout(self.config.probe_timeout()))
            .await
            .map_err(|e| CoreError::from_exec(&label, e))?;

        let observed = self.probes.toggle_state(kind).await;
        Ok(Reconciled {
            fragment: StateFragment::Toggle {
                toggle: kind,
                state: observed,
            },
            drift: (observed != target)
                .then(|| format!("{kind} is {observed} after requesting {target}")),
        })
    }

    fn toggle_argv(&self, kind: ToggleKind, target: ToggleState) -> Vec<String> {
        let on = target == ToggleState::On;
        match kind {
            ToggleKind::Wifi => strings(&["nmcli", "radio", "wifi", if on { "on" } else { "off" }]),
            ToggleKind::Bluetooth => {
                strings(&["rfkill", if on { "unblock" } else { "block" }, "bluetooth"])
            }
            // airplane "on" means every radio blocked
            ToggleKind::Airplane => strings(&["rfkill", if on { "block" } else { "unblock" }, "all"]),
            ToggleKind::Mic if self.runner.tool_exists("wpctl") => strings(&[
                "wpctl",
                "set-mute",
                MIC_SOURCE,
                if on { "0" } else { "1" },
            ]),
            ToggleKind::Mic => strings(&["amixer", "set", "Capture", if on { "cap" } else { "nocap" }]),
        }
    }
}
