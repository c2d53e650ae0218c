use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptBackend {
    /// Graphical helper such as zenity or kdialog.
    Helper,
    /// Read from the controlling terminal.
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub poll_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub action_timeout_secs: u64,
    pub update_timeout_secs: u64,
    pub prompt: PromptBackend,
    pub prompt_helper: String,
    pub aur_helpers: Vec<String>,
    pub power_supply_root: PathBuf,
    pub display_backlight: PathBuf,
    pub keyboard_backlight: PathBuf,
    pub log_level: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            probe_timeout_secs: 10,
            action_timeout_secs: 120,
            update_timeout_secs: 3600,
            prompt: PromptBackend::Helper,
            prompt_helper: "zenity".to_string(),
            aur_helpers: vec!["yay".to_string(), "paru".to_string()],
            power_supply_root: PathBuf::from("/sys/class/power_supply"),
            display_backlight: PathBuf::from("/sys/class/backlight/intel_backlight/brightness"),
            keyboard_backlight: PathBuf::from(
                "/sys/class/leds/kbd_backlight/brightness",
            ),
            log_level: "info".to_string(),
        }
    }
}

impl PanelConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let config: PanelConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let timers = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("action_timeout_secs", self.action_timeout_secs),
            ("update_timeout_secs", self.update_timeout_secs),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::Config(format!("{name} must be greater than zero")));
        }

        if self.prompt == PromptBackend::Helper && self.prompt_helper.trim().is_empty() {
            return Err(CoreError::Config(
                "prompt_helper is required when prompt = \"helper\"".into(),
            ));
        }

        for helper in &self.aur_helpers {
            if helper.trim().is_empty() || helper.contains(char::is_whitespace) {
                return Err(CoreError::Config(format!(
                    "aur helper must be a single program name: {helper:?}"
                )));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }
}
