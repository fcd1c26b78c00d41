//! # GrantSync offline queue
//!
//! Buffers create/update/delete operations against the remote store while
//! the network is unavailable and replays them when it comes back.
//!
//! ## Architecture
//!
//! - **Queue**: FIFO list of [`SyncQueueItem`]s, persisted to local storage
//!   after every mutation
//! - **Cache**: last known value per resource, answers reads while offline
//! - **Resolver**: pluggable strategy for updates the server has moved past
//! - **Connectivity**: network events plus a periodic health check
//!
//! ## Usage
//!
//! ```rust,no_run
//! use grant_common::{SystemClock, TokioScheduler};
//! use grant_config::SyncConfig;
//! use grant_store::{FileStorage, HttpRemoteStore};
//! use grant_sync::{OfflineSyncManager, OperationType};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = HttpRemoteStore::new("https://example.org/api", None, Duration::from_secs(10))?;
//!     let storage = FileStorage::open(".grantsync/offline")?;
//!
//!     let manager = OfflineSyncManager::new(
//!         Arc::new(store),
//!         Arc::new(storage),
//!         Arc::new(SystemClock),
//!         Arc::new(TokioScheduler),
//!         SyncConfig::default(),
//!     )?;
//!     manager.start();
//!
//!     manager.queue_operation(OperationType::Update, "profile", json!({"name": "Food Bank"}))?;
//!     println!("{}", manager.get_queue_status());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod manager;
pub mod queue;
pub mod resolver;

pub use cache::{CacheEntry, OfflineCache};
pub use manager::{
    NetworkEvent, OfflineSyncManager, SyncReport, CACHE_KEY, CONNECTIVITY_TIMER, PERIODIC_SYNC_TIMER,
    QUEUE_KEY, SYNC_TASK,
};
pub use queue::{ItemStatus, OperationType, QueueStatus, SyncQueueItem};
pub use resolver::{server_timestamp, ConflictResolver, ConflictStrategy};

use grant_common::GrantError;

/// Common result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors returned by the sync queue.
///
/// Network failures are not among them: those end up in the status of the
/// affected queue item.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] GrantError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
