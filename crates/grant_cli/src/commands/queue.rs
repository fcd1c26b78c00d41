//! `grant queue ...`
//!
//! These commands never contact the remote store; `grant sync` replays
//! what they queue.

use super::{load_config, open_manager};
use crate::{Context, QueueAction};
use anyhow::{Context as _, Result};
use grant_sync::OperationType;
use serde_json::Value;

pub fn cmd_queue(ctx: &Context, action: QueueAction) -> Result<()> {
    let config = load_config(ctx)?;
    let manager = open_manager(&config, false)?;

    match action {
        QueueAction::Add {
            operation,
            resource,
            data,
        } => {
            let operation: OperationType = operation.parse()?;
            let data: Value = match data {
                Some(raw) => serde_json::from_str(&raw).context("data must be valid JSON")?,
                None => Value::Object(Default::default()),
            };
            let id = manager.queue_operation(operation, &resource, data)?;
            println!("Queued {}", id);
        }
        QueueAction::Status { json } => {
            let status = manager.get_queue_status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", status);
            }
        }
        QueueAction::List { json } => {
            let items = manager.queue_items();
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("Queue is empty");
            } else {
                for item in &items {
                    let error = item
                        .error
                        .as_deref()
                        .map(|e| format!("  ({})", e))
                        .unwrap_or_default();
                    println!(
                        "{}  {:<6}  {:<8}  retries={}  {}{}",
                        item.id,
                        item.operation,
                        item.status,
                        item.retry_count,
                        item.resource,
                        error
                    );
                }
            }
        }
        QueueAction::RetryFailed => {
            let reset = manager.retry_failed()?;
            println!("Reset {} failed operations", reset);
        }
        QueueAction::Clear => {
            let dropped = manager.clear_queue()?;
            println!("Cleared {} queued operations", dropped);
        }
    }
    Ok(())
}
