//! Command implementations for the `grant` binary

mod cache;
mod collab;
mod init;
mod queue;
mod sync;

pub use cache::cmd_cache;
pub use collab::cmd_collab;
pub use init::cmd_init;
pub use queue::cmd_queue;
pub use sync::cmd_sync;

use crate::Context;
use anyhow::Result;
use grant_common::{SystemClock, TokioScheduler};
use grant_config::Config;
use grant_store::{FileStorage, HttpRemoteStore};
use grant_sync::{NetworkEvent, OfflineSyncManager};
use std::sync::Arc;

/// Sync manager over the workspace's storage directory.
///
/// With `online` false the manager never touches the network: operations
/// are only queued and reads come from the cache.
pub(crate) fn open_manager(config: &Config, online: bool) -> Result<Arc<OfflineSyncManager>> {
    let store = HttpRemoteStore::from_config(&config.remote)?;
    let storage = FileStorage::open(config.storage_path())?;

    let manager = OfflineSyncManager::new(
        Arc::new(store),
        Arc::new(storage),
        Arc::new(SystemClock),
        Arc::new(TokioScheduler),
        config.sync.clone(),
    )?;
    if !online {
        manager.on_network_event(NetworkEvent::Offline);
    }
    Ok(manager)
}

pub(crate) fn load_config(ctx: &Context) -> Result<Config> {
    let config = Config::load(&ctx.root)?;
    tracing::debug!("Loaded config for {:?}", config.root);
    Ok(config)
}
