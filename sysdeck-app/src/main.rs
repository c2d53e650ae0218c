use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use sysdeck_app::{bootstrap, commands, config};
use sysdeck_core::{BacklightTarget, PanelConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sysdeck", version, about = "Laptop control panel: status, toggles and maintenance actions")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/sysdeck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one snapshot of the host
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Redraw the snapshot every poll interval
    Watch,
    /// Run an action, e.g. `run update`, `run profile performance`, `run wifi off`
    Run {
        action: String,
        param: Option<String>,
    },
    /// Show or set display or keyboard backlight percent
    Brightness {
        target: Target,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: Option<u8>,
    },
    /// Host description from fastfetch or neofetch
    Summary,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Display,
    Keyboard,
}

impl From<Target> for BacklightTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Display => BacklightTarget::Display,
            Target::Keyboard => BacklightTarget::Keyboard,
        }
    }
}

fn init_tracing(config: &PanelConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    init_tracing(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: PanelConfig) -> Result<ExitCode> {
    let orchestrator = bootstrap::build(&config);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping after the current step");
                shutdown.cancel();
            }
        }
    });

    match command {
        Command::Status { json } => commands::status::status(&orchestrator, json).await?,
        Command::Watch => commands::status::watch(&orchestrator, shutdown).await?,
        Command::Run { action, param } => {
            return commands::run::run(&orchestrator, &action, param.as_deref(), shutdown).await
        }
        Command::Brightness { target, percent } => {
            commands::run::brightness(&orchestrator, target.into(), percent).await
        }
        Command::Summary => commands::status::summary(&orchestrator).await?,
    }
    Ok(ExitCode::SUCCESS)
}
