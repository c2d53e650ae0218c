pub mod backlight;
pub mod config;
pub mod distro;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod probes;
pub mod types;

pub use backlight::{Backlight, BacklightTarget, BacklightWarning};
pub use config::{PanelConfig, PromptBackend};
pub use distro::{DistroFamily, DistroResolver, UpdateStep};
pub use error::CoreError;
pub use metrics::{ActionMetrics, MetricsSnapshot};
pub use orchestrator::{ActionPhase, Orchestrator};
pub use probes::Probes;
pub use types::*;
