//! `grant cache ...`

use super::{load_config, open_manager};
use crate::{CacheAction, Context};
use anyhow::Result;

pub async fn cmd_cache(ctx: &Context, action: CacheAction) -> Result<()> {
    let config = load_config(ctx)?;

    match action {
        CacheAction::Get { resource } => {
            let manager = open_manager(&config, !ctx.offline)?;
            match manager.get_cached_data(&resource).await? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => eprintln!("No cached data for '{}'", resource),
            }
        }
        CacheAction::Clear => {
            let manager = open_manager(&config, false)?;
            manager.clear_cache()?;
            eprintln!("✓ Cleared offline cache");
        }
    }
    Ok(())
}
