//! Battery state from the power_supply sysfs class.

use std::path::Path;
use tokio::fs;

use crate::types::BatteryStatus;

async fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

async fn read_u64(path: &Path) -> Option<u64> {
    read_trimmed(path).await?.parse().ok()
}

/// Health label from full vs design capacity.
pub fn health_label(full: Option<u64>, design: Option<u64>) -> String {
    match (full, design) {
        (Some(full), Some(design)) if design > 0 => {
            let ratio = full as f64 / design as f64;
            if ratio >= 0.8 {
                "Good"
            } else if ratio >= 0.5 {
                "Fair"
            } else {
                "Poor"
            }
        }
        _ => "Unknown",
    }
    .to_string()
}

/// First `BAT*` entry under `root` that reports a capacity.
pub async fn read_battery(root: &Path) -> Option<BatteryStatus> {
    let mut entries = fs::read_dir(root).await.ok()?;
    let mut batteries = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("BAT") {
            batteries.push(entry.path());
        }
    }
    batteries.sort();

    for dir in batteries {
        let Some(capacity) = read_u64(&dir.join("capacity")).await else {
            continue;
        };
        let status = read_trimmed(&dir.join("status")).await.unwrap_or_default();

        let (full, design) = match read_u64(&dir.join("energy_full")).await {
            Some(full) => (Some(full), read_u64(&dir.join("energy_full_design")).await),
            None => (
                read_u64(&dir.join("charge_full")).await,
                read_u64(&dir.join("charge_full_design")).await,
            ),
        };

        return Some(BatteryStatus {
            percent: capacity.min(100) as u8,
            charging: matches!(status.as_str(), "Charging" | "Full"),
            health: health_label(full, design),
        });
    }

    None
}
