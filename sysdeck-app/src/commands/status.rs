use anyhow::{Context, Result};
use std::io::{self, Write};
use sysdeck_core::Orchestrator;
use tokio_util::sync::CancellationToken;

use crate::render;

pub async fn status(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let snapshot = orchestrator.poll().await;
    if json {
        let text = serde_json::to_string_pretty(&snapshot).context("Failed to encode snapshot")?;
        println!("{text}");
    } else {
        println!("{}", render::render_snapshot(&snapshot, render::color_enabled()));
    }
    Ok(())
}

/// Redraw the snapshot every poll interval until `shutdown` fires.
pub async fn watch(orchestrator: &Orchestrator, shutdown: CancellationToken) -> Result<()> {
    let mut ticker = tokio::time::interval(orchestrator.config().poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let color = render::color_enabled();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = orchestrator.poll().await;
                print!("\x1b[2J\x1b[H");
                println!("{}", render::render_snapshot(&snapshot, color));
                io::stdout().flush()?;
            }
        }
    }
    Ok(())
}

pub async fn summary(orchestrator: &Orchestrator) -> Result<()> {
    match orchestrator.probes().system_summary().await {
        Some(text) => println!("{}", text.trim_end()),
        None => println!("no system summary tool available (fastfetch or neofetch)"),
    }
    Ok(())
}
