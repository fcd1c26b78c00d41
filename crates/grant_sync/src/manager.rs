//! Offline sync manager
//!
//! Every mutation goes through the queue. While online a sync pass is
//! scheduled right away; while offline items wait for a reconnect, the
//! periodic sync timer or an explicit [`OfflineSyncManager::sync_pending_changes`].

use crate::cache::OfflineCache;
use crate::queue::{ItemStatus, OperationType, QueueStatus, SyncQueueItem};
use crate::resolver::{server_timestamp, stamp, unstamp, ConflictResolver, ConflictStrategy};
use crate::{Result, SyncError};
use futures_util::future::BoxFuture;
use grant_common::ids::generate_id;
use grant_common::redact::redact;
use grant_common::{Clock, RepeatingTask, Scheduler, TimerHandle};
use grant_config::SyncConfig;
use grant_store::{LocalStorage, RemoteStore, Scope};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Local storage key of the persisted queue
pub const QUEUE_KEY: &str = "offline_sync_queue";
/// Local storage key of the persisted cache
pub const CACHE_KEY: &str = "offline_cache";

pub const SYNC_TASK: &str = "offline-sync";
pub const CONNECTIVITY_TIMER: &str = "sync-connectivity";
pub const PERIODIC_SYNC_TIMER: &str = "sync-periodic";

/// Connectivity change reported by the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    Offline,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub completed: usize,
    pub failed: usize,
    /// Cache entries replaced by newer server data
    pub pulled: usize,
}

#[derive(Debug, Default)]
struct SyncState {
    queue: Vec<SyncQueueItem>,
    cache: OfflineCache,
}

/// Clears the in-progress flag when a pass ends, however it ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Manages queued operations and the offline cache
pub struct OfflineSyncManager {
    store: Arc<dyn RemoteStore>,
    storage: Arc<dyn LocalStorage>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    config: SyncConfig,
    resolver: ConflictResolver,
    scope: Scope,
    state: Mutex<SyncState>,
    online: AtomicBool,
    sync_in_progress: AtomicBool,
    timers: Mutex<Vec<TimerHandle>>,
    this: Weak<Self>,
}

impl OfflineSyncManager {
    /// Create a manager, restoring any queue and cache left in `storage`.
    ///
    /// Starts out online; call [`start`](Self::start) to run the
    /// connectivity check and periodic sync timers.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        storage: Arc<dyn LocalStorage>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
        config: SyncConfig,
    ) -> Result<Arc<Self>> {
        let strategy: ConflictStrategy = config.conflict_strategy.parse()?;
        let scope: Scope = config
            .scope
            .parse()
            .map_err(|e: grant_common::GrantError| SyncError::Config(e.to_string()))?;

        let state = Self::restore(storage.as_ref())?;
        if !state.queue.is_empty() {
            tracing::info!("Restored {} queued operations", state.queue.len());
        }

        Ok(Arc::new_cyclic(|this| Self {
            store,
            storage,
            clock,
            scheduler,
            config,
            resolver: ConflictResolver::new(strategy),
            scope,
            state: Mutex::new(state),
            online: AtomicBool::new(true),
            sync_in_progress: AtomicBool::new(false),
            timers: Mutex::new(Vec::new()),
            this: this.clone(),
        }))
    }

    fn restore(storage: &dyn LocalStorage) -> Result<SyncState> {
        let mut queue: Vec<SyncQueueItem> = match storage.get_item(QUEUE_KEY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        // Interrupted mid-pass; the write may or may not have landed
        for item in queue.iter_mut().filter(|i| i.status == ItemStatus::Syncing) {
            item.status = ItemStatus::Pending;
        }

        let cache = match storage.get_item(CACHE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable offline cache: {}", e);
                OfflineCache::new()
            }),
            None => OfflineCache::new(),
        };

        Ok(SyncState { queue, cache })
    }

    /// Queue a mutation and return its id.
    ///
    /// The cache is updated optimistically. Only local storage failures are
    /// returned; network problems show up later as a `failed` item.
    pub fn queue_operation(&self, operation: OperationType, resource: &str, data: Value) -> Result<String> {
        if resource.trim().is_empty() {
            return Err(SyncError::InvalidOperation("resource is empty".into()));
        }

        let now = self.clock.now_millis();
        let id = generate_id(now);
        {
            let mut state = self.lock_state();
            match operation {
                OperationType::Create | OperationType::Update => {
                    state.cache.upsert(resource, data.clone(), now);
                }
                OperationType::Delete => {
                    state.cache.remove(resource);
                }
            }
            state
                .queue
                .push(SyncQueueItem::new(id.clone(), now, operation, resource, data));
            self.persist_queue(&state)?;
            self.persist_cache(&state)?;
        }

        tracing::debug!("Queued {} {} as {}", operation, resource, id);
        if self.is_online() {
            self.trigger_sync();
        }
        Ok(id)
    }

    /// Cached value of `resource`, falling back to the server while online.
    ///
    /// After a sync the cache holds what was written, minus the
    /// `lastModified` stamp added on the way to the server. Values fetched
    /// from the server are returned as the server sent them.
    pub async fn get_cached_data(&self, resource: &str) -> Result<Option<Value>> {
        let cached = self.lock_state().cache.get(resource).map(|e| e.data.clone());
        if cached.is_some() {
            return Ok(cached);
        }
        if !self.is_online() {
            return Ok(None);
        }

        match self.store.get(resource).await {
            Ok(Some(value)) => {
                let timestamp = server_timestamp(&value).unwrap_or_else(|| self.clock.now_millis());
                let mut state = self.lock_state();
                // A local write landed while the request was in flight
                if let Some(entry) = state.cache.get(resource) {
                    return Ok(Some(entry.data.clone()));
                }
                state.cache.upsert(resource, value.clone(), timestamp);
                self.persist_cache(&state)?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!("Could not fetch {}: {}", resource, e);
                Ok(None)
            }
        }
    }

    /// Replay due items in queue order.
    ///
    /// Single-flight: returns an empty report at once if a pass is already
    /// running, or if offline. A failing item never stops the pass.
    pub async fn sync_pending_changes(&self) -> SyncReport {
        if !self.is_online() {
            tracing::debug!("Offline, sync skipped");
            return SyncReport::default();
        }
        if self
            .sync_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync already in progress");
            return SyncReport::default();
        }
        let _guard = SyncGuard(&self.sync_in_progress);

        match self.run_sync_pass().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Sync pass failed: {}", e);
                let mut state = self.lock_state();
                for item in state.queue.iter_mut().filter(|i| i.status == ItemStatus::Syncing) {
                    item.status = ItemStatus::Pending;
                }
                SyncReport::default()
            }
        }
    }

    async fn run_sync_pass(&self) -> Result<SyncReport> {
        let max_retries = self.config.max_retries;
        let due: Vec<String> = self
            .lock_state()
            .queue
            .iter()
            .filter(|i| i.is_due(max_retries))
            .map(|i| i.id.clone())
            .collect();

        if !due.is_empty() {
            tracing::info!("Syncing {} queued operations", due.len());
        }

        let mut report = SyncReport::default();
        for id in due {
            // Cleared while the pass was running
            let Some(item) = self.transition(&id, |item| item.status = ItemStatus::Syncing)? else {
                continue;
            };

            match self.execute(&item).await {
                Ok(()) => {
                    self.transition(&id, |item| {
                        item.status = ItemStatus::Completed;
                        item.error = None;
                    })?;
                    report.completed += 1;
                    tracing::debug!("Synced {} {}", item.operation, item.resource);
                }
                Err(e) => {
                    let reason = redact(&e.to_string());
                    let updated = self.transition(&id, |item| {
                        item.status = ItemStatus::Failed;
                        item.retry_count += 1;
                        item.error = Some(reason.clone());
                    })?;
                    report.failed += 1;

                    match updated {
                        Some(item) if item.is_exhausted(max_retries) => tracing::warn!(
                            "Giving up on {} {} after {} attempts: {}",
                            item.operation,
                            item.resource,
                            item.retry_count,
                            reason
                        ),
                        _ => tracing::debug!("{} {} failed, will retry: {}", item.operation, item.resource, reason),
                    }
                }
            }
        }

        {
            let mut state = self.lock_state();
            let before = state.queue.len();
            state.queue.retain(|i| i.status != ItemStatus::Completed);
            if state.queue.len() != before {
                self.persist_queue(&state)?;
            }
        }

        if report.completed > 0 && report.failed == 0 {
            report.pulled = self.pull_server_updates().await;
        }
        if report.completed + report.failed > 0 {
            tracing::info!(
                "Sync pass done: {} completed, {} failed",
                report.completed,
                report.failed
            );
        }
        Ok(report)
    }

    /// Apply `change` to the item with `id` and persist the queue.
    /// Returns the updated item, or `None` if it is gone.
    fn transition<F>(&self, id: &str, change: F) -> Result<Option<SyncQueueItem>>
    where
        F: FnOnce(&mut SyncQueueItem),
    {
        let mut state = self.lock_state();
        let Some(item) = state.queue.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        change(item);
        let updated = item.clone();
        self.persist_queue(&state)?;
        Ok(Some(updated))
    }

    async fn execute(&self, item: &SyncQueueItem) -> grant_common::Result<()> {
        match item.operation {
            OperationType::Delete => self.store.remove(&item.resource).await,
            OperationType::Create => self.write(item, item.data.clone()).await,
            OperationType::Update => {
                let mut data = item.data.clone();
                if let Some(server) = self.store.get(&item.resource).await? {
                    let cached = self.lock_state().cache.get(&item.resource).cloned();
                    if self.resolver.detect_conflict(cached.as_ref(), &server) {
                        tracing::info!(
                            "{} changed on the server, resolving with {}",
                            item.resource,
                            self.resolver.strategy()
                        );
                        data = self.resolver.resolve_conflict(&item.data, &server);
                    }
                }
                self.write(item, data).await
            }
        }
    }

    async fn write(&self, item: &SyncQueueItem, data: Value) -> grant_common::Result<()> {
        let now = self.clock.now_millis();
        let stamped = stamp(&data, now);
        self.store.set(&item.resource, &stamped, self.scope).await?;

        let mut state = self.lock_state();
        let written = unstamp(&data, &item.data);
        if state.cache.confirm(&item.resource, &item.data, written, now) {
            if let Err(e) = self.persist_cache(&state) {
                tracing::warn!("Failed to persist cache after syncing {}: {}", item.resource, e);
            }
        }
        Ok(())
    }

    /// Adopt server copies of cached resources that are newer than the
    /// cache. Resources with unsynced local changes are left alone.
    /// Returns how many entries were replaced. A sync pass calls this when
    /// it completed at least one item and none failed.
    pub async fn pull_server_updates(&self) -> usize {
        if !self.is_online() {
            return 0;
        }

        let resources = self.lock_state().cache.resources();
        let mut pulled = 0;
        for resource in resources {
            let server = match self.store.get(&resource).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Failed to pull {}: {}", resource, e);
                    continue;
                }
            };
            let Some(modified) = server_timestamp(&server) else {
                continue;
            };

            {
                let mut state = self.lock_state();
                let unsynced = state
                    .queue
                    .iter()
                    .any(|i| i.resource == resource && i.status != ItemStatus::Completed);
                let newer = state
                    .cache
                    .get(&resource)
                    .map(|entry| modified > entry.timestamp)
                    .unwrap_or(false);
                if newer && !unsynced {
                    state.cache.upsert(&resource, server, modified);
                    pulled += 1;
                    tracing::debug!("Pulled newer {} from server", resource);
                }
            }
        }

        if pulled > 0 {
            let state = self.lock_state();
            if let Err(e) = self.persist_cache(&state) {
                tracing::warn!("Failed to persist pulled updates: {}", e);
            }
            tracing::info!("Pulled {} updated resources", pulled);
        }
        pulled
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        QueueStatus::of(&self.lock_state().queue)
    }

    /// Snapshot of the queue in order
    pub fn queue_items(&self) -> Vec<SyncQueueItem> {
        self.lock_state().queue.clone()
    }

    /// Give every `failed` item a fresh set of retries.
    /// Returns how many were reset.
    pub fn retry_failed(&self) -> Result<usize> {
        let reset = {
            let mut state = self.lock_state();
            let mut reset = 0;
            for item in state.queue.iter_mut().filter(|i| i.status == ItemStatus::Failed) {
                item.status = ItemStatus::Pending;
                item.retry_count = 0;
                item.error = None;
                reset += 1;
            }
            if reset > 0 {
                self.persist_queue(&state)?;
            }
            reset
        };

        if reset > 0 {
            tracing::info!("Reset {} failed operations", reset);
            if self.is_online() {
                self.trigger_sync();
            }
        }
        Ok(reset)
    }

    pub fn clear_cache(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.cache.clear();
        self.storage.remove_item(CACHE_KEY)?;
        tracing::info!("Cleared offline cache");
        Ok(())
    }

    /// Drop every queued operation, synced or not. Returns how many.
    pub fn clear_queue(&self) -> Result<usize> {
        let mut state = self.lock_state();
        let dropped = state.queue.len();
        state.queue.clear();
        self.storage.remove_item(QUEUE_KEY)?;
        tracing::info!("Cleared {} queued operations", dropped);
        Ok(dropped)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_offline(&self) -> bool {
        !self.is_online()
    }

    /// Record a connectivity change. Coming back online schedules a sync.
    pub fn on_network_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::Online => {
                if !self.online.swap(true, Ordering::AcqRel) {
                    tracing::info!("Back online");
                    self.trigger_sync();
                }
            }
            NetworkEvent::Offline => {
                if self.online.swap(false, Ordering::AcqRel) {
                    tracing::info!("Offline, operations will be queued");
                }
            }
        }
    }

    /// Ping the remote store and update the online flag from the result
    pub async fn check_connectivity(&self) -> bool {
        let reachable = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        };
        self.on_network_event(if reachable {
            NetworkEvent::Online
        } else {
            NetworkEvent::Offline
        });
        reachable
    }

    /// Start the connectivity check and periodic sync timers.
    /// Calling it again while running has no effect.
    pub fn start(&self) {
        {
            let mut timers = self.lock_timers();
            if !timers.is_empty() {
                return;
            }
            let check = self.timer_task(|manager| -> BoxFuture<'static, ()> {
                Box::pin(async move {
                    manager.check_connectivity().await;
                })
            });
            let sync = self.timer_task(|manager| -> BoxFuture<'static, ()> {
                Box::pin(async move {
                    manager.sync_pending_changes().await;
                })
            });
            timers.push(
                self.scheduler
                    .every(CONNECTIVITY_TIMER, self.config.connectivity_check_interval(), check),
            );
            timers.push(
                self.scheduler
                    .every(PERIODIC_SYNC_TIMER, self.config.periodic_sync_interval(), sync),
            );
        }

        let max_retries = self.config.max_retries;
        let has_due = self.lock_state().queue.iter().any(|i| i.is_due(max_retries));
        if has_due && self.is_online() {
            self.trigger_sync();
        }
    }

    /// Stop the timers. A sync pass already running finishes normally.
    pub fn destroy(&self) {
        let timers: Vec<TimerHandle> = self.lock_timers().drain(..).collect();
        if !timers.is_empty() {
            tracing::debug!("Stopping {} sync timers", timers.len());
        }
        for timer in timers {
            timer.cancel();
        }
    }

    fn trigger_sync(&self) {
        let this = self.this.clone();
        self.scheduler.spawn(
            SYNC_TASK,
            Box::pin(async move {
                if let Some(manager) = this.upgrade() {
                    manager.sync_pending_changes().await;
                }
            }),
        );
    }

    fn timer_task<F>(&self, body: F) -> RepeatingTask
    where
        F: Fn(Arc<Self>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let this = self.this.clone();
        Arc::new(move || -> BoxFuture<'static, ()> {
            match this.upgrade() {
                Some(manager) => body(manager),
                None => Box::pin(async {}),
            }
        })
    }

    fn persist_queue(&self, state: &SyncState) -> Result<()> {
        let raw = serde_json::to_string(&state.queue)?;
        self.storage.set_item(QUEUE_KEY, &raw)?;
        Ok(())
    }

    fn persist_cache(&self, state: &SyncState) -> Result<()> {
        let raw = serde_json::to_string(&state.cache)?;
        self.storage.set_item(CACHE_KEY, &raw)?;
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_timers(&self) -> MutexGuard<'_, Vec<TimerHandle>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for OfflineSyncManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grant_common::TokioScheduler;
    use grant_store::{MemoryRemoteStore, MemoryStorage};
    use serde_json::json;

    fn manager_with(storage: Arc<MemoryStorage>) -> Arc<OfflineSyncManager> {
        OfflineSyncManager::new(
            Arc::new(MemoryRemoteStore::new()),
            storage,
            Arc::new(grant_common::SystemClock),
            Arc::new(TokioScheduler),
            SyncConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_interrupted_items_restored_as_pending() {
        let storage = Arc::new(MemoryStorage::new());
        let mut item = SyncQueueItem::new("1-a".into(), 1, OperationType::Update, "doc", json!({"x": 1}));
        item.status = ItemStatus::Syncing;
        let raw = serde_json::to_string(&vec![item]).unwrap();
        storage.set_item(QUEUE_KEY, &raw).unwrap();

        let manager = manager_with(storage);
        let items = manager.queue_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ItemStatus::Pending);
    }

    #[test]
    fn test_unreadable_cache_is_discarded() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(CACHE_KEY, "{not json").unwrap();
        let manager = manager_with(storage);
        assert!(manager.lock_state().cache.is_empty());
    }

    #[test]
    fn test_corrupt_queue_is_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(QUEUE_KEY, "[{").unwrap();
        let result = OfflineSyncManager::new(
            Arc::new(MemoryRemoteStore::new()),
            storage,
            Arc::new(grant_common::SystemClock),
            Arc::new(TokioScheduler),
            SyncConfig::default(),
        );
        assert!(matches!(result, Err(SyncError::Serialization(_))));
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let config = SyncConfig {
            conflict_strategy: "crdt".into(),
            ..SyncConfig::default()
        };
        let result = OfflineSyncManager::new(
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(MemoryStorage::new()),
            Arc::new(grant_common::SystemClock),
            Arc::new(TokioScheduler),
            config,
        );
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
