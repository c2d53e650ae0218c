use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use sysdeck_core::PanelConfig;

/// `$XDG_CONFIG_HOME/sysdeck/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sysdeck").join("config.toml"))
}

/// Load the panel configuration. An explicit path must exist; a missing
/// default file just means defaults.
pub fn load(explicit: Option<&Path>) -> Result<PanelConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(PanelConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    PanelConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save(config: &PanelConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = config.to_toml_string()?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
