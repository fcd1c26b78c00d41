//! `grant sync`

use super::{load_config, open_manager};
use crate::Context;
use anyhow::Result;

/// Ping the remote store and, if it answers, replay the queue once
pub async fn cmd_sync(ctx: &Context, json: bool) -> Result<()> {
    let config = load_config(ctx)?;
    let manager = open_manager(&config, !ctx.offline)?;

    if ctx.offline {
        eprintln!("Offline mode, nothing synced");
    } else if manager.check_connectivity().await {
        let report = manager.sync_pending_changes().await;
        eprintln!(
            "✓ Synced {} operations ({} failed, {} resources pulled)",
            report.completed, report.failed, report.pulled
        );
    } else {
        eprintln!("Remote store unreachable, operations stay queued");
    }

    let status = manager.get_queue_status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status);
    }
    Ok(())
}
