use anyhow::Result;
use std::process::ExitCode;
use sysdeck_core::{ActionRequest, BacklightTarget, Orchestrator};
use tokio_util::sync::CancellationToken;

use crate::render;

pub async fn run(
    orchestrator: &Orchestrator,
    action: &str,
    param: Option<&str>,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let request = ActionRequest::parse(action, param)?;

    let result = orchestrator.execute_with_cancel(request, cancel).await;
    println!("{}", render::render_result(&result, render::color_enabled()));

    Ok(if result.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Backlight failures are warnings: reported, never fatal.
/// Set the backlight, or print the current value when no percent is given.
pub async fn brightness(
    orchestrator: &Orchestrator,
    target: BacklightTarget,
    percent: Option<u8>,
) {
    let result = match percent {
        Some(percent) => orchestrator.set_backlight(target, percent).await,
        None => orchestrator.backlight(target).await,
    };
    match result {
        Ok(value) => println!("{target} backlight {value}%"),
        Err(warning) => eprintln!("warning: {warning}"),
    }
}
