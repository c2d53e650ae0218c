use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::PanelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklightTarget {
    Display,
    Keyboard,
}

impl fmt::Display for BacklightTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacklightTarget::Display => f.write_str("display"),
            BacklightTarget::Keyboard => f.write_str("keyboard"),
        }
    }
}

/// Non-fatal: the presenter shows it and carries on.
#[derive(Debug, Error)]
#[error("{target} backlight ({path}): {reason}")]
pub struct BacklightWarning {
    pub target: BacklightTarget,
    pub path: String,
    pub reason: String,
}

pub struct Backlight {
    display: PathBuf,
    keyboard: PathBuf,
}

impl Backlight {
    pub fn new(display: PathBuf, keyboard: PathBuf) -> Self {
        Self { display, keyboard }
    }

    pub fn from_config(config: &PanelConfig) -> Self {
        Self::new(
            config.display_backlight.clone(),
            config.keyboard_backlight.clone(),
        )
    }

    fn path(&self, target: BacklightTarget) -> &Path {
        match target {
            BacklightTarget::Display => &self.display,
            BacklightTarget::Keyboard => &self.keyboard,
        }
    }

    fn warning(&self, target: BacklightTarget, reason: impl Into<String>) -> BacklightWarning {
        let warning = BacklightWarning {
            target,
            path: self.path(target).display().to_string(),
            reason: reason.into(),
        };
        tracing::warn!("{}", warning);
        warning
    }

    /// Write `percent` (clamped to 100) as a plain integer. Returns the value written.
    pub async fn set(&self, target: BacklightTarget, percent: u8) -> Result<u8, BacklightWarning> {
        let value = percent.min(100);
        tokio::fs::write(self.path(target), value.to_string())
            .await
            .map_err(|e| self.warning(target, e.to_string()))?;
        tracing::info!(%target, value, "backlight set");
        Ok(value)
    }

    pub async fn get(&self, target: BacklightTarget) -> Result<u8, BacklightWarning> {
        let raw = tokio::fs::read_to_string(self.path(target))
            .await
            .map_err(|e| self.warning(target, e.to_string()))?;
        raw.trim()
            .parse::<u8>()
            .map(|v| v.min(100))
            .map_err(|e| self.warning(target, format!("unreadable value {:?}: {e}", raw.trim())))
    }
}
