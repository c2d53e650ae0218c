use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerProfile {
    Balanced,
    PowerSaver,
    Performance,
    Unknown,
}

impl PowerProfile {
    /// Profiles a user can switch to, in display order.
    pub const SELECTABLE: [PowerProfile; 3] = [
        PowerProfile::Balanced,
        PowerProfile::PowerSaver,
        PowerProfile::Performance,
    ];

    /// Name understood by `powerprofilesctl`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerProfile::Balanced => "balanced",
            PowerProfile::PowerSaver => "power-saver",
            PowerProfile::Performance => "performance",
            PowerProfile::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PowerProfile::Balanced => "Balanced",
            PowerProfile::PowerSaver => "Power-saver",
            PowerProfile::Performance => "Performance",
            PowerProfile::Unknown => "Unknown",
        }
    }

    /// Lenient parse of daemon output; anything unrecognized is `Unknown`.
    pub fn from_daemon(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(PowerProfile::Unknown)
    }
}

impl FromStr for PowerProfile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(PowerProfile::Balanced),
            "power-saver" | "powersaver" | "power_saver" => Ok(PowerProfile::PowerSaver),
            "performance" => Ok(PowerProfile::Performance),
            other => Err(CoreError::InvalidRequest(format!(
                "unknown power profile: {other}"
            ))),
        }
    }
}

impl fmt::Display for PowerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive view over the selectable profiles: at most one entry is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileView {
    pub active: PowerProfile,
    pub entries: Vec<(PowerProfile, bool)>,
}

impl ProfileView {
    pub fn observed(active: PowerProfile) -> Self {
        Self {
            active,
            entries: PowerProfile::SELECTABLE
                .iter()
                .map(|p| (*p, *p == active))
                .collect(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|(_, on)| *on).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleKind {
    Wifi,
    Bluetooth,
    Airplane,
    Mic,
}

impl ToggleKind {
    pub const ALL: [ToggleKind; 4] = [
        ToggleKind::Wifi,
        ToggleKind::Bluetooth,
        ToggleKind::Airplane,
        ToggleKind::Mic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleKind::Wifi => "wifi",
            ToggleKind::Bluetooth => "bluetooth",
            ToggleKind::Airplane => "airplane",
            ToggleKind::Mic => "mic",
        }
    }
}

impl FromStr for ToggleKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToggleKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| CoreError::InvalidRequest(format!("unknown toggle: {s}")))
    }
}

impl fmt::Display for ToggleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    On,
    Off,
    #[default]
    Unknown,
}

impl ToggleState {
    pub fn from_bool(on: bool) -> Self {
        if on {
            ToggleState::On
        } else {
            ToggleState::Off
        }
    }

    pub fn flipped(&self) -> Option<Self> {
        match self {
            ToggleState::On => Some(ToggleState::Off),
            ToggleState::Off => Some(ToggleState::On),
            ToggleState::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleState::On => "on",
            ToggleState::Off => "off",
            ToggleState::Unknown => "unknown",
        }
    }
}

impl FromStr for ToggleState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "enable" | "enabled" | "true" | "1" => Ok(ToggleState::On),
            "off" | "disable" | "disabled" | "false" | "0" => Ok(ToggleState::Off),
            other => Err(CoreError::InvalidRequest(format!(
                "toggle target must be on or off, got {other}"
            ))),
        }
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub percent: u8,
    pub charging: bool,
    pub health: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub disk_used_percent: f32,
    pub disk_free_bytes: u64,
    pub memory_used_percent: f32,
    pub memory_free_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_total_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub cpu_temp_c: Option<f32>,
    pub gpu_temp_c: Option<f32>,
    pub fan_rpm: Option<u32>,
}

impl SensorReadings {
    pub fn is_unknown(&self) -> bool {
        self.cpu_temp_c.is_none() && self.gpu_temp_c.is_none() && self.fan_rpm.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleStates {
    pub wifi: ToggleState,
    pub bluetooth: ToggleState,
    pub airplane: ToggleState,
    pub mic: ToggleState,
}

impl ToggleStates {
    pub fn get(&self, kind: ToggleKind) -> ToggleState {
        match kind {
            ToggleKind::Wifi => self.wifi,
            ToggleKind::Bluetooth => self.bluetooth,
            ToggleKind::Airplane => self.airplane,
            ToggleKind::Mic => self.mic,
        }
    }
}

/// Point-in-time view of the host. Every field degrades to absent/unknown
/// independently when its probe fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub captured_at: DateTime<Utc>,
    pub battery: Option<BatteryStatus>,
    pub power_profile: PowerProfile,
    pub resources: Option<ResourceUsage>,
    pub volume: Option<u8>,
    pub mic_level: Option<u8>,
    pub toggles: ToggleStates,
    pub sensors: SensorReadings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ActionRequest {
    SetPowerProfile { profile: PowerProfile },
    ClearCache,
    ClearOrphans,
    ClearSwap,
    KillUserProcesses,
    ClearSessionTemp,
    Toggle {
        kind: ToggleKind,
        target: Option<ToggleState>,
    },
    UpdateSystem,
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::SetPowerProfile { .. } => "set-power-profile",
            ActionRequest::ClearCache => "clear-cache",
            ActionRequest::ClearOrphans => "clear-orphans",
            ActionRequest::ClearSwap => "clear-swap",
            ActionRequest::KillUserProcesses => "kill-user-processes",
            ActionRequest::ClearSessionTemp => "clear-session-temp",
            ActionRequest::Toggle { .. } => "toggle",
            ActionRequest::UpdateSystem => "update-system",
        }
    }

    /// The radio/mic toggles call their control tool directly; everything
    /// else goes through the privilege broker.
    pub fn requires_privilege(&self) -> bool {
        !matches!(self, ActionRequest::Toggle { .. })
    }

    /// Shown in the password prompt.
    pub fn reason(&self) -> String {
        match self {
            ActionRequest::SetPowerProfile { profile } => {
                format!("switch to the {} power profile", profile.label())
            }
            ActionRequest::ClearCache => "clear the package cache".into(),
            ActionRequest::ClearOrphans => "remove orphaned packages".into(),
            ActionRequest::ClearSwap => "clear swap".into(),
            ActionRequest::KillUserProcesses => "kill your processes".into(),
            ActionRequest::ClearSessionTemp => "clear session temp files".into(),
            ActionRequest::Toggle { kind, .. } => format!("toggle {kind}"),
            ActionRequest::UpdateSystem => "update the system".into(),
        }
    }

    /// Build a request from a presenter's action name and optional parameter.
    pub fn parse(name: &str, param: Option<&str>) -> Result<Self, CoreError> {
        let missing = |what: &str| CoreError::InvalidRequest(format!("{name} needs a {what}"));
        match name.trim() {
            "set-power-profile" | "power-profile" | "profile" => Ok(ActionRequest::SetPowerProfile {
                profile: param.ok_or_else(|| missing("profile"))?.parse()?,
            }),
            "clear-cache" => Ok(ActionRequest::ClearCache),
            "clear-orphans" => Ok(ActionRequest::ClearOrphans),
            "clear-swap" => Ok(ActionRequest::ClearSwap),
            "kill-user-processes" | "kill-processes" => Ok(ActionRequest::KillUserProcesses),
            "clear-session-temp" | "clear-session" => Ok(ActionRequest::ClearSessionTemp),
            "update-system" | "update" => Ok(ActionRequest::UpdateSystem),
            "wifi" | "bluetooth" | "airplane" | "mic" => Ok(ActionRequest::Toggle {
                kind: name.parse()?,
                target: param.map(str::parse::<ToggleState>).transpose()?,
            }),
            other => Err(CoreError::InvalidRequest(format!("unknown action: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum ActionOutcome {
    Succeeded,
    Failed(String),
    PermissionDenied,
    Unsupported(String),
}

/// The piece of host state an action affected, as observed after it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StateFragment {
    None,
    PowerProfile(ProfileView),
    Toggle { toggle: ToggleKind, state: ToggleState },
    Resources(ResourceUsage),
    PackagesRemoved { packages: Vec<String> },
    UpdateSteps { completed: Vec<String> },
    UserScoped { user: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub outcome: ActionOutcome,
    pub fragment: StateFragment,
}

impl ActionResult {
    pub fn new(action: &str, outcome: ActionOutcome, fragment: StateFragment) -> Self {
        Self {
            action: action.to_string(),
            outcome,
            fragment,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == ActionOutcome::Succeeded
    }
}
