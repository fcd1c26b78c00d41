//! Collaboration coordinator
//!
//! Clients share nothing but the remote store, so the store doubles as a
//! message relay:
//!
//! ```text
//! collaboration_users_{org}   full presence map, rewritten every heartbeat
//! collaboration_locks_{org}   field id -> FieldLock
//! collaboration_events_{org}  append-only event list, pruned on each write
//! ```
//!
//! Every client polls the event list and the lock map (default every 2s)
//! and refreshes presence (default every 30s). None of the read-modify-write
//! cycles are atomic; locks and presence are advisory and converge
//! eventually.

use crate::events::{CollabNotification, EventBus, ListenerId, NotificationKind};
use crate::state::{CollabState, Session};
use crate::types::{
    ActiveUser, CollaborationEvent, CursorPosition, EventKind, FieldConflict, FieldLock, LocalUser,
    LockStatus,
};
use crate::{CollabError, Result};
use futures_util::future::BoxFuture;
use grant_common::ids::{generate_id, user_color};
use grant_common::redact::redact;
use grant_common::{Clock, RepeatingTask, Scheduler, TimerHandle};
use grant_config::CollaborationConfig;
use grant_store::{RemoteStore, Scope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub const POLL_TIMER: &str = "collab-poll";
pub const HEARTBEAT_TIMER: &str = "collab-heartbeat";

fn users_key(org: &str) -> String {
    format!("collaboration_users_{}", org)
}

fn locks_key(org: &str) -> String {
    format!("collaboration_locks_{}", org)
}

fn events_key(org: &str) -> String {
    format!("collaboration_events_{}", org)
}

/// Resets the processing flag when a poll ends, however it ends
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CollaborationCoordinator {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    config: CollaborationConfig,
    state: Mutex<CollabState>,
    bus: EventBus,
    timers: Mutex<Vec<TimerHandle>>,
    is_processing: AtomicBool,
}

impl CollaborationCoordinator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
        config: CollaborationConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            scheduler,
            config,
            state: Mutex::new(CollabState::default()),
            bus: EventBus::new(),
            timers: Mutex::new(Vec::new()),
            is_processing: AtomicBool::new(false),
        })
    }

    /// Join `organization_id` as `user`.
    ///
    /// Publishes presence, broadcasts `user_joined` and starts the poll and
    /// heartbeat timers. Network failures are logged, never returned; the
    /// only errors are invalid arguments or a second `initialize`.
    pub async fn initialize(self: &Arc<Self>, organization_id: &str, user: LocalUser) -> Result<()> {
        if organization_id.trim().is_empty() {
            return Err(CollabError::InvalidSession("organization id is empty".into()));
        }
        if user.id.trim().is_empty() {
            return Err(CollabError::InvalidSession("user id is empty".into()));
        }

        let me = ActiveUser {
            color: user_color(&user.id).to_string(),
            email: user.email.unwrap_or_default(),
            id: user.id,
            name: user.name,
            last_activity: self.clock.now_millis(),
            current_section: None,
            cursor_position: None,
        };

        {
            let mut state = self.lock_state();
            if state.session.is_some() {
                return Err(CollabError::AlreadyInitialized);
            }
            state.session = Some(Session {
                organization_id: organization_id.to_string(),
                user: me.clone(),
            });
        }

        tracing::info!(
            "Joining collaboration for {} as {} <{}>",
            organization_id,
            me.name,
            redact(&me.email)
        );

        self.heartbeat().await;
        let joined = serde_json::to_value(&me)?;
        self.broadcast(EventKind::UserJoined, joined, None, None).await;
        self.start_timers();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().session.is_some()
    }

    fn start_timers(self: &Arc<Self>) {
        let poll = Self::timer_task(Arc::downgrade(self), |coordinator| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                coordinator.poll_once().await;
            })
        });
        let heartbeat = Self::timer_task(Arc::downgrade(self), |coordinator| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                coordinator.heartbeat().await;
            })
        });

        let mut timers = self.lock_timers();
        timers.push(self.scheduler.every(POLL_TIMER, self.config.poll_interval(), poll));
        timers.push(
            self.scheduler
                .every(HEARTBEAT_TIMER, self.config.heartbeat_interval(), heartbeat),
        );
    }

    fn timer_task<F>(weak: Weak<Self>, body: F) -> RepeatingTask
    where
        F: Fn(Arc<Self>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Arc::new(move || -> BoxFuture<'static, ()> {
            match weak.upgrade() {
                Some(coordinator) => body(coordinator),
                None => Box::pin(async {}),
            }
        })
    }

    /// Broadcast a new value for `field_id`. Fire-and-forget: a failed
    /// broadcast is parked in [`pending_changes`](Self::pending_changes).
    pub async fn update_field(&self, section_id: &str, field_id: &str, value: Value) {
        let now = self.clock.now_millis();
        {
            let mut state = self.lock_state();
            if state.session.is_none() {
                tracing::warn!("update_field({}) before initialize", field_id);
                return;
            }
            state.field_clock.insert(field_id.to_string(), now);
        }
        self.broadcast(
            EventKind::FieldUpdate,
            json!({ "value": value }),
            Some(section_id.to_string()),
            Some(field_id.to_string()),
        )
        .await;
    }

    /// Broadcast a change affecting a whole section
    pub async fn update_section(&self, section_id: &str, data: Value) {
        self.broadcast(EventKind::SectionUpdate, data, Some(section_id.to_string()), None)
            .await;
    }

    /// Broadcast the local pointer position
    pub async fn update_cursor(&self, section_id: &str, position: CursorPosition) {
        {
            let mut state = self.lock_state();
            let now = self.clock.now_millis();
            if let Some(session) = state.session.as_mut() {
                session.user.current_section = Some(section_id.to_string());
                session.user.cursor_position = Some(position);
                session.user.last_activity = now;
            }
        }
        let data = json!({ "x": position.x, "y": position.y });
        self.broadcast(EventKind::CursorPosition, data, Some(section_id.to_string()), None)
            .await;
    }

    /// Claim `field_id` for the local user.
    ///
    /// Reads the shared lock map first and returns `false` if another user
    /// holds the field. The claim is written back without compare-and-swap,
    /// so two clients racing inside one poll window can both succeed.
    pub async fn lock_field(&self, field_id: &str) -> bool {
        let Some((org, me)) = self.session() else {
            tracing::warn!("lock_field({}) before initialize", field_id);
            return false;
        };

        let remote = match self.fetch_map::<FieldLock>(&locks_key(&org)).await {
            Ok(locks) => Some(locks),
            Err(e) => {
                tracing::warn!("Could not read locks, using last known state: {}", e);
                None
            }
        };

        let lock = FieldLock {
            field_id: field_id.to_string(),
            user_id: me.id.clone(),
            user_name: me.name.clone(),
            timestamp: self.clock.now_millis(),
        };

        let mut notifications = Vec::new();
        let acquired = {
            let mut state = self.lock_state();
            if state.session.is_none() {
                return false;
            }
            if let Some(remote) = &remote {
                state.merge_remote_locks(remote, &me.id, &mut notifications);
            }
            match state.locks.get(field_id) {
                Some(existing) if existing.user_id != me.id => {
                    tracing::debug!("{} is locked by {}", field_id, existing.user_name);
                    false
                }
                _ => {
                    state.locks.insert(field_id.to_string(), lock.clone());
                    true
                }
            }
        };
        self.emit_all(&notifications);

        if !acquired {
            return false;
        }

        // Without a fresh read, writing our view back could erase other
        // clients' locks; keep the claim local until the next attempt.
        if let Some(mut locks) = remote {
            locks.insert(field_id.to_string(), lock);
            if let Err(e) = self.write(&locks_key(&org), &locks).await {
                tracing::warn!("Failed to publish lock on {}: {}", field_id, e);
            }
        }
        true
    }

    /// Release a lock held by the local user; no-op otherwise
    pub async fn unlock_field(&self, field_id: &str) {
        let Some((org, me)) = self.session() else {
            return;
        };

        {
            let mut state = self.lock_state();
            if !state.holds_lock(field_id, &me.id) {
                return;
            }
            state.locks.remove(field_id);
        }

        self.update_remote_locks(&org, |locks| {
            let ours = locks
                .get(field_id)
                .map(|lock| lock.user_id == me.id)
                .unwrap_or(false);
            if ours {
                locks.remove(field_id);
            }
            ours
        })
        .await;
    }

    /// Last known lock state. The holder never sees its own lock.
    pub fn is_field_locked(&self, field_id: &str) -> LockStatus {
        let state = self.lock_state();
        let self_id = state.self_id().unwrap_or_default();
        match state.locks.get(field_id) {
            Some(lock) if lock.user_id != self_id => LockStatus::locked_by(lock.user_name.clone()),
            _ => LockStatus::unlocked(),
        }
    }

    /// Other participants, sorted by name
    pub fn get_active_users(&self) -> Vec<ActiveUser> {
        let mut users: Vec<ActiveUser> = self.lock_state().active_users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        users
    }

    /// Remote value parked while the local user edits `field_id`
    pub fn conflict(&self, field_id: &str) -> Option<FieldConflict> {
        self.lock_state().conflicts.get(field_id).cloned()
    }

    /// Settle a parked conflict. Accepting returns the remote value for the
    /// caller to apply; rejecting keeps the local edit.
    pub fn resolve_conflict(&self, field_id: &str, accept: bool) -> Option<Value> {
        let conflict = self.lock_state().conflicts.remove(field_id)?;
        tracing::debug!(
            "{} conflict on {} from {}",
            if accept { "Accepted" } else { "Rejected" },
            field_id,
            conflict.user_name
        );
        accept.then_some(conflict.value)
    }

    /// Broadcasts that never reached the store
    pub fn pending_changes(&self) -> Vec<CollaborationEvent> {
        self.lock_state().pending_changes.clone()
    }

    pub fn on<F>(&self, kind: NotificationKind, listener: F) -> ListenerId
    where
        F: Fn(&CollabNotification) + Send + Sync + 'static,
    {
        self.bus.on(kind, listener)
    }

    pub fn off(&self, kind: NotificationKind, id: ListenerId) -> bool {
        self.bus.off(kind, id)
    }

    /// One poll pass: apply fresh remote events and refresh the lock map.
    /// Skipped (returning 0) if another pass is still running.
    pub async fn poll_once(&self) -> usize {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Poll already in progress");
            return 0;
        }
        let _guard = ProcessingGuard(&self.is_processing);

        let Some((org, me)) = self.session() else {
            return 0;
        };

        let events = self
            .fetch_list::<CollaborationEvent>(&events_key(&org))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to poll events: {}", e);
                Vec::new()
            });
        let remote_locks = match self.fetch_map::<FieldLock>(&locks_key(&org)).await {
            Ok(locks) => Some(locks),
            Err(e) => {
                tracing::warn!("Failed to poll locks: {}", e);
                None
            }
        };

        let mut notifications = Vec::new();
        let applied = {
            let mut state = self.lock_state();
            // Torn down while the requests were in flight
            if state.session.is_none() {
                return 0;
            }
            let now = self.clock.now_millis();
            let applied = state.apply_events(events, now, &me.id, self.config.event_freshness_ms, &mut notifications);
            if let Some(remote) = &remote_locks {
                state.merge_remote_locks(remote, &me.id, &mut notifications);
            }
            applied
        };

        if applied > 0 {
            tracing::debug!("Applied {} remote events", applied);
        }
        self.emit_all(&notifications);
        applied
    }

    /// Refresh our presence, merge everyone else's, evict stale users and
    /// rewrite the shared presence map.
    pub async fn heartbeat(&self) {
        let now = self.clock.now_millis();
        let (org, me) = {
            let mut state = self.lock_state();
            let Some(session) = state.session.as_mut() else {
                return;
            };
            session.user.last_activity = now;
            (session.organization_id.clone(), session.user.clone())
        };

        let remote = match self.fetch_map::<ActiveUser>(&users_key(&org)).await {
            Ok(users) => Some(users),
            Err(e) => {
                tracing::warn!("Failed to read presence: {}", e);
                None
            }
        };
        let reachable = remote.is_some();

        let mut notifications = Vec::new();
        let snapshot = {
            let mut state = self.lock_state();
            if state.session.is_none() {
                return;
            }
            let remote = remote.unwrap_or_default();
            state.merge_presence(remote, &me, now, self.config.user_timeout_ms, &mut notifications)
        };
        self.emit_all(&notifications);

        // A partial view must not overwrite everyone else's presence
        if !reachable {
            return;
        }

        if let Err(e) = self.write(&users_key(&org), &snapshot).await {
            tracing::warn!("Failed to publish presence: {}", e);
        }

        // Locks of evicted users linger in the shared map until someone
        // notices; whoever runs a heartbeat cleans them up.
        self.update_remote_locks(&org, |locks| {
            let before = locks.len();
            locks.retain(|_, lock| snapshot.contains_key(&lock.user_id));
            before != locks.len()
        })
        .await;
    }

    /// Leave the session: broadcast `user_left`, withdraw presence and
    /// locks, stop the timers and forget all session state.
    ///
    /// Requests already in flight are not aborted; their results are
    /// discarded once they see the session is gone.
    pub async fn cleanup(&self) {
        let Some((org, me)) = self.session() else {
            self.stop_timers();
            return;
        };

        self.broadcast(EventKind::UserLeft, json!({ "userId": me.id }), None, None)
            .await;

        match self.fetch_map::<ActiveUser>(&users_key(&org)).await {
            Ok(mut users) => {
                if users.remove(&me.id).is_some() {
                    if let Err(e) = self.write(&users_key(&org), &users).await {
                        tracing::warn!("Failed to withdraw presence: {}", e);
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to read presence during cleanup: {}", e),
        }

        self.update_remote_locks(&org, |locks| {
            let before = locks.len();
            locks.retain(|_, lock| lock.user_id != me.id);
            before != locks.len()
        })
        .await;

        self.stop_timers();
        *self.lock_state() = CollabState::default();
        tracing::info!("Left collaboration for {}", org);
    }

    fn stop_timers(&self) {
        let timers: Vec<TimerHandle> = self.lock_timers().drain(..).collect();
        for timer in timers {
            timer.cancel();
        }
    }

    async fn broadcast(
        &self,
        kind: EventKind,
        data: Value,
        section_id: Option<String>,
        field_id: Option<String>,
    ) {
        let Some((org, me)) = self.session() else {
            tracing::warn!("Broadcast of {} before initialize", kind);
            return;
        };

        let now = self.clock.now_millis();
        let event = CollaborationEvent {
            id: generate_id(now),
            kind,
            user_id: me.id,
            user_name: me.name,
            timestamp: now,
            data,
            section_id,
            field_id,
        };

        match self.append_event(&org, &event, now).await {
            Ok(()) => tracing::trace!("Broadcast {} {}", kind, event.id),
            Err(e) => {
                tracing::warn!("Broadcast of {} failed, keeping it pending: {}", kind, e);
                self.lock_state().pending_changes.push(event);
            }
        }
    }

    /// Append to the shared event list, dropping anything older than the
    /// retention window and anything beyond the size cap.
    async fn append_event(&self, org: &str, event: &CollaborationEvent, now: i64) -> Result<()> {
        let key = events_key(org);
        let retention = self.config.event_retention_ms as i64;

        let mut events = self.fetch_list::<CollaborationEvent>(&key).await?;
        events.retain(|e| now - e.timestamp <= retention);
        events.push(event.clone());
        if events.len() > self.config.max_events {
            let excess = events.len() - self.config.max_events;
            events.drain(..excess);
        }
        self.write(&key, &events).await
    }

    async fn update_remote_locks<F>(&self, org: &str, change: F)
    where
        F: FnOnce(&mut HashMap<String, FieldLock>) -> bool,
    {
        let key = locks_key(org);
        match self.fetch_map::<FieldLock>(&key).await {
            Ok(mut locks) => {
                if change(&mut locks) {
                    if let Err(e) = self.write(&key, &locks).await {
                        tracing::warn!("Failed to update shared locks: {}", e);
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to read shared locks: {}", e),
        }
    }

    /// Read a JSON array, skipping entries that do not parse
    async fn fetch_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let items = match self.store.get(key).await? {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => {
                tracing::warn!("{} is not a list, treating as empty", key);
                return Ok(Vec::new());
            }
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!("Skipping malformed entry in {}: {}", key, e);
                    None
                }
            })
            .collect())
    }

    /// Read a JSON object, skipping entries that do not parse
    async fn fetch_map<T: DeserializeOwned>(&self, key: &str) -> Result<HashMap<String, T>> {
        let entries = match self.store.get(key).await? {
            Some(Value::Object(entries)) => entries,
            Some(Value::Null) | None => return Ok(HashMap::new()),
            Some(_) => {
                tracing::warn!("{} is not a map, treating as empty", key);
                return Ok(HashMap::new());
            }
        };
        Ok(entries
            .into_iter()
            .filter_map(|(id, entry)| match serde_json::from_value(entry) {
                Ok(parsed) => Some((id, parsed)),
                Err(e) => {
                    tracing::warn!("Skipping malformed entry {} in {}: {}", id, key, e);
                    None
                }
            })
            .collect())
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store.set(key, &value, Scope::Organization).await?;
        Ok(())
    }

    fn session(&self) -> Option<(String, ActiveUser)> {
        self.lock_state()
            .session
            .as_ref()
            .map(|s| (s.organization_id.clone(), s.user.clone()))
    }

    fn emit_all(&self, notifications: &[CollabNotification]) {
        for notification in notifications {
            self.bus.emit(notification);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CollabState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_timers(&self) -> MutexGuard<'_, Vec<TimerHandle>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
