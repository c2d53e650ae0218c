//! Parsers for the text output of the query tools. All of them return
//! `None`/unknown on anything they do not recognize.

use crate::types::{SensorReadings, ToggleState};

fn to_percent(value: f32) -> u8 {
    (value * 100.0).round().clamp(0.0, 100.0) as u8
}

/// `wpctl get-volume` prints `Volume: 0.45` or `Volume: 0.45 [MUTED]`.
pub fn parse_wpctl_volume(output: &str) -> Option<(u8, bool)> {
    let line = output.lines().find(|l| l.trim_start().starts_with("Volume:"))?;
    let rest = line.trim_start().trim_start_matches("Volume:");
    let level: f32 = rest.split_whitespace().next()?.parse().ok()?;
    Some((to_percent(level), line.contains("[MUTED]")))
}

/// `amixer get Master|Capture`: first `[NN%]` plus the `[on]`/`[off]` switch.
pub fn parse_amixer(output: &str) -> Option<(u8, bool)> {
    for line in output.lines() {
        let Some(start) = line.find('[') else {
            continue;
        };
        let Some(end) = line[start..].find("%]") else {
            continue;
        };
        let Ok(level) = line[start + 1..start + end].parse::<u8>() else {
            continue;
        };
        let enabled = !line.contains("[off]");
        return Some((level.min(100), enabled));
    }
    None
}

/// `nmcli radio wifi` prints `enabled` or `disabled`.
pub fn parse_nmcli_radio(output: &str) -> ToggleState {
    match output.trim() {
        "enabled" => ToggleState::On,
        "disabled" => ToggleState::Off,
        _ => ToggleState::Unknown,
    }
}

/// One entry per device in `rfkill list`: true when soft or hard blocked.
pub fn parse_rfkill_blocked(output: &str) -> Vec<bool> {
    let mut devices = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if !line.starts_with(char::is_whitespace) && trimmed.contains(':') {
            devices.push(false);
            continue;
        }
        if let Some(last) = devices.last_mut() {
            if trimmed == "Soft blocked: yes" || trimmed == "Hard blocked: yes" {
                *last = true;
            }
        }
    }
    devices
}

/// A radio is on when at least one device is unblocked.
pub fn radio_state(blocked: &[bool]) -> ToggleState {
    if blocked.is_empty() {
        ToggleState::Unknown
    } else {
        ToggleState::from_bool(blocked.iter().any(|b| !b))
    }
}

/// Airplane mode is on when every radio is blocked.
pub fn airplane_state(blocked: &[bool]) -> ToggleState {
    if blocked.is_empty() {
        ToggleState::Unknown
    } else {
        ToggleState::from_bool(blocked.iter().all(|b| *b))
    }
}

fn parse_temperature(value: &str) -> Option<f32> {
    let token = value.split_whitespace().next()?;
    token
        .trim_start_matches('+')
        .trim_end_matches("°C")
        .trim_end_matches('C')
        .parse()
        .ok()
}

const CPU_LABELS: &[&str] = &["Package id 0", "Tctl", "Tdie", "CPU"];
const GPU_LABELS: &[&str] = &["edge", "GPU", "junction"];

/// `sensors` output from lm-sensors.
pub fn parse_sensors(output: &str) -> SensorReadings {
    let mut readings = SensorReadings::default();

    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim();

        if readings.cpu_temp_c.is_none() && CPU_LABELS.contains(&label) {
            readings.cpu_temp_c = parse_temperature(value);
        } else if readings.gpu_temp_c.is_none() && GPU_LABELS.contains(&label) {
            readings.gpu_temp_c = parse_temperature(value);
        } else if readings.fan_rpm.is_none() && value.contains("RPM") {
            readings.fan_rpm = value
                .split_whitespace()
                .next()
                .and_then(|rpm| rpm.parse().ok());
        }
    }

    readings
}
