//! Plain-text rendering of snapshots and action results. Pure functions: the
//! caller decides where the text goes.

use sysdeck_core::{
    ActionOutcome, ActionResult, BatteryStatus, ProfileView, ResourceUsage, SensorReadings,
    StateFragment, SystemSnapshot, ToggleKind,
};

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const ACCENT: &str = "\x1b[38;5;39m";
const GOOD: &str = "\x1b[32m";
const BAD: &str = "\x1b[31m";

fn paint(text: &str, style: &str, color: bool) -> String {
    if color {
        format!("{style}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Honors `NO_COLOR`.
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

const UNKNOWN: &str = "unknown";

fn bytes(value: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let value = value as f64;
    if value >= GIB {
        format!("{:.1} GiB", value / GIB)
    } else {
        format!("{:.0} MiB", value / MIB)
    }
}

fn battery_line(battery: Option<&BatteryStatus>) -> String {
    match battery {
        Some(b) => format!(
            "{}%{} health {}",
            b.percent,
            if b.charging { " charging," } else { "," },
            b.health
        ),
        None => "no battery".into(),
    }
}

fn resources_lines(resources: Option<&ResourceUsage>) -> Vec<String> {
    match resources {
        Some(r) => vec![
            format!(
                "Disk     {:.0}% used, {} free",
                r.disk_used_percent,
                bytes(r.disk_free_bytes)
            ),
            format!(
                "Memory   {:.0}% used, {} free",
                r.memory_used_percent,
                bytes(r.memory_free_bytes)
            ),
            format!(
                "Swap     {} of {}",
                bytes(r.swap_used_bytes),
                bytes(r.swap_total_bytes)
            ),
        ],
        None => vec![format!("Disk     {UNKNOWN}"), format!("Memory   {UNKNOWN}")],
    }
}

fn sensors_line(sensors: &SensorReadings) -> String {
    if sensors.is_unknown() {
        return UNKNOWN.into();
    }
    let temp = |t: Option<f32>| t.map_or_else(|| UNKNOWN.to_string(), |t| format!("{t:.0}°C"));
    let fan = sensors
        .fan_rpm
        .map_or_else(|| UNKNOWN.to_string(), |rpm| format!("{rpm} RPM"));
    format!(
        "cpu {}  gpu {}  fan {}",
        temp(sensors.cpu_temp_c),
        temp(sensors.gpu_temp_c),
        fan
    )
}

fn level(value: Option<u8>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| format!("{v}%"))
}

/// One radio-button style row per selectable profile.
pub fn render_profiles(view: &ProfileView, color: bool) -> String {
    view.entries
        .iter()
        .map(|(profile, active)| {
            if *active {
                paint(&format!("(•) {}", profile.label()), ACCENT, color)
            } else {
                format!("( ) {}", profile.label())
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn render_snapshot(snapshot: &SystemSnapshot, color: bool) -> String {
    let mut lines = vec![paint(
        &format!(
            "sysdeck status  {}",
            snapshot
                .captured_at
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
        ),
        DIM,
        color,
    )];

    lines.push(format!("Battery  {}", battery_line(snapshot.battery.as_ref())));
    lines.push(format!(
        "Profile  {}",
        render_profiles(&ProfileView::observed(snapshot.power_profile), color)
    ));
    lines.extend(resources_lines(snapshot.resources.as_ref()));
    lines.push(format!(
        "Audio    volume {}  mic {}",
        level(snapshot.volume),
        level(snapshot.mic_level)
    ));
    lines.push(format!(
        "Radios   {}",
        ToggleKind::ALL
            .iter()
            .map(|kind| format!("{kind} {}", snapshot.toggles.get(*kind)))
            .collect::<Vec<_>>()
            .join("  ")
    ));
    lines.push(format!("Sensors  {}", sensors_line(&snapshot.sensors)));

    lines.join("\n")
}

pub fn render_result(result: &ActionResult, color: bool) -> String {
    let status = match &result.outcome {
        ActionOutcome::Succeeded => paint("done", GOOD, color),
        ActionOutcome::Failed(reason) => paint(&format!("failed: {reason}"), BAD, color),
        ActionOutcome::PermissionDenied => paint("permission denied", BAD, color),
        ActionOutcome::Unsupported(why) => paint(&format!("unsupported: {why}"), BAD, color),
    };

    let detail = match &result.fragment {
        StateFragment::None => None,
        StateFragment::PowerProfile(view) => Some(render_profiles(view, color)),
        StateFragment::Toggle { toggle, state } => Some(format!("{toggle} is {state}")),
        StateFragment::Resources(usage) => Some(resources_lines(Some(usage)).join("\n")),
        StateFragment::PackagesRemoved { packages } if packages.is_empty() => {
            Some("no orphaned packages".into())
        }
        StateFragment::PackagesRemoved { packages } => {
            Some(format!("removed {}", packages.join(" ")))
        }
        StateFragment::UpdateSteps { completed } => {
            Some(format!("completed: {}", completed.join(", ")))
        }
        StateFragment::UserScoped { user } => Some(format!("user {user}")),
    };

    match detail {
        Some(detail) => format!("{} {status}\n{detail}", result.action),
        None => format!("{} {status}", result.action),
    }
}
