//! Read-only host state probes.
//!
//! Every probe tolerates its tool being absent: failures are logged and
//! degrade to `None`/`Unknown` instead of propagating to the caller.

pub mod battery;
pub mod parsers;

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysdeck_executor::{CommandRunner, Invocation};
use sysinfo::{Disks, System};
use tokio::task;

use crate::config::PanelConfig;
use crate::types::{
    BatteryStatus, PowerProfile, ResourceUsage, SensorReadings, SystemSnapshot, ToggleKind,
    ToggleState, ToggleStates,
};

const SINK: &str = "@DEFAULT_AUDIO_SINK@";
const SOURCE: &str = "@DEFAULT_AUDIO_SOURCE@";

pub struct Probes {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    power_supply_root: PathBuf,
    last: Mutex<Option<SystemSnapshot>>,
}

impl Probes {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PanelConfig) -> Self {
        Self {
            runner,
            timeout: config.probe_timeout(),
            power_supply_root: config.power_supply_root.clone(),
            last: Mutex::new(None),
        }
    }

    /// stdout of a successful query, `None` on any failure.
    async fn query(&self, argv: &[&str]) -> Option<String> {
        let program = argv.first()?;
        if !self.runner.tool_exists(program) {
            tracing::debug!(tool = program, "probe tool not installed");
            return None;
        }
        let invocation = Invocation::new(argv.iter().copied()).with_timeout(self.timeout);
        match self.runner.run(invocation).await {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                tracing::debug!(
                    tool = program,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "probe query failed"
                );
                None
            }
            Err(e) => {
                tracing::warn!(tool = program, error = %e, "probe unavailable");
                None
            }
        }
    }

    fn has_pipewire(&self) -> bool {
        self.runner.tool_exists("wpctl")
    }

    pub async fn battery(&self) -> Option<BatteryStatus> {
        battery::read_battery(&self.power_supply_root).await
    }

    pub async fn active_power_profile(&self) -> PowerProfile {
        self.query(&["powerprofilesctl", "get"])
            .await
            .map(|out| PowerProfile::from_daemon(&out))
            .unwrap_or(PowerProfile::Unknown)
    }

    /// Root filesystem (or first disk) and memory/swap utilization.
    pub async fn disk_memory_usage(&self) -> Option<ResourceUsage> {
        let usage = task::spawn_blocking(|| {
            let mut system = System::new();
            system.refresh_memory();

            let total = system.total_memory();
            if total == 0 {
                return None;
            }

            let disks = Disks::new_with_refreshed_list();
            let disk = disks
                .iter()
                .find(|d| d.mount_point() == std::path::Path::new("/"))
                .or_else(|| disks.iter().next());
            let (disk_used_percent, disk_free_bytes) = disk
                .map(|disk| {
                    let total = disk.total_space();
                    let available = disk.available_space();
                    let used = if total > 0 {
                        ((total - available) as f64 / total as f64 * 100.0) as f32
                    } else {
                        0.0
                    };
                    (used, available)
                })
                .unwrap_or((0.0, 0));

            Some(ResourceUsage {
                disk_used_percent,
                disk_free_bytes,
                memory_used_percent: (system.used_memory() as f64 / total as f64 * 100.0) as f32,
                memory_free_bytes: system.available_memory(),
                swap_used_bytes: system.used_swap(),
                swap_total_bytes: system.total_swap(),
            })
        })
        .await;

        match usage {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!(error = %e, "resource probe panicked");
                None
            }
        }
    }

    /// Output volume, through PipeWire when present, ALSA otherwise.
    pub async fn volume(&self) -> Option<u8> {
        if self.has_pipewire() {
            let out = self.query(&["wpctl", "get-volume", SINK]).await?;
            parsers::parse_wpctl_volume(&out).map(|(level, _)| level)
        } else {
            let out = self.query(&["amixer", "get", "Master"]).await?;
            parsers::parse_amixer(&out).map(|(level, _)| level)
        }
    }

    pub async fn mic_level(&self) -> Option<u8> {
        self.mic().await.map(|(level, _)| level)
    }

    /// Level and whether capture is live (not muted).
    async fn mic(&self) -> Option<(u8, bool)> {
        if self.has_pipewire() {
            let out = self.query(&["wpctl", "get-volume", SOURCE]).await?;
            parsers::parse_wpctl_volume(&out).map(|(level, muted)| (level, !muted))
        } else {
            let out = self.query(&["amixer", "get", "Capture"]).await?;
            parsers::parse_amixer(&out)
        }
    }

    pub async fn sensors(&self) -> SensorReadings {
        match self.query(&["sensors"]).await {
            Some(out) => parsers::parse_sensors(&out),
            None => SensorReadings::default(),
        }
    }

    pub async fn toggle_state(&self, kind: ToggleKind) -> ToggleState {
        match kind {
            ToggleKind::Wifi => self
                .query(&["nmcli", "radio", "wifi"])
                .await
                .map(|out| parsers::parse_nmcli_radio(&out))
                .unwrap_or_default(),
            ToggleKind::Bluetooth => self
                .query(&["rfkill", "list", "bluetooth"])
                .await
                .map(|out| parsers::radio_state(&parsers::parse_rfkill_blocked(&out)))
                .unwrap_or_default(),
            ToggleKind::Airplane => self
                .query(&["rfkill", "list"])
                .await
                .map(|out| parsers::airplane_state(&parsers::parse_rfkill_blocked(&out)))
                .unwrap_or_default(),
            ToggleKind::Mic => self
                .mic()
                .await
                .map(|(_, live)| ToggleState::from_bool(live))
                .unwrap_or_default(),
        }
    }

    pub async fn toggles(&self) -> ToggleStates {
        let (wifi, bluetooth, airplane, mic) = tokio::join!(
            self.toggle_state(ToggleKind::Wifi),
            self.toggle_state(ToggleKind::Bluetooth),
            self.toggle_state(ToggleKind::Airplane),
            self.toggle_state(ToggleKind::Mic),
        );
        ToggleStates {
            wifi,
            bluetooth,
            airplane,
            mic,
        }
    }

    /// Whether a systemd unit file exists for `unit`.
    pub async fn service_installed(&self, unit: &str) -> bool {
        let unit = if unit.contains('.') {
            unit.to_string()
        } else {
            format!("{unit}.service")
        };
        self.query(&["systemctl", "list-unit-files", "--no-legend", unit.as_str()])
            .await
            .map(|out| out.lines().any(|l| l.split_whitespace().next() == Some(unit.as_str())))
            .unwrap_or(false)
    }

    /// Short host description from a fetch-style tool.
    pub async fn system_summary(&self) -> Option<String> {
        if let Some(out) = self.query(&["fastfetch", "--pipe"]).await {
            return Some(out);
        }
        self.query(&["neofetch", "--stdout"]).await
    }

    /// Run every probe and remember the result as the last observed state.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let (battery, power_profile, resources, volume, mic_level, toggles, sensors) = tokio::join!(
            self.battery(),
            self.active_power_profile(),
            self.disk_memory_usage(),
            self.volume(),
            self.mic_level(),
            self.toggles(),
            self.sensors(),
        );

        let snapshot = SystemSnapshot {
            captured_at: chrono::Utc::now(),
            battery,
            power_profile,
            resources,
            volume,
            mic_level,
            toggles,
            sensors,
        };
        *self.last.lock() = Some(snapshot.clone());
        snapshot
    }

    pub fn last_snapshot(&self) -> Option<SystemSnapshot> {
        self.last.lock().clone()
    }
}
