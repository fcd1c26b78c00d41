//! In-memory view of a collaboration session
//!
//! Everything here is synchronous: the coordinator fetches remote state,
//! feeds it in under the state mutex, then emits the collected
//! notifications after releasing it.

use crate::events::{CollabNotification, FieldUpdate};
use crate::types::{
    ActiveUser, CollaborationEvent, CursorPosition, EventKind, FieldConflict, FieldLock,
};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub organization_id: String,
    pub user: ActiveUser,
}

#[derive(Debug, Default)]
pub(crate) struct CollabState {
    pub session: Option<Session>,
    /// Other participants, keyed by user id
    pub active_users: HashMap<String, ActiveUser>,
    /// Last known lock per field, ours included
    pub locks: HashMap<String, FieldLock>,
    /// Timestamp of the newest value applied per field
    pub field_clock: HashMap<String, i64>,
    pub conflicts: HashMap<String, FieldConflict>,
    /// Event ids already applied, with their timestamps
    pub seen_events: HashMap<String, i64>,
    /// Broadcasts that failed to reach the store
    pub pending_changes: Vec<CollaborationEvent>,
}

impl CollabState {
    pub fn self_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user.id.as_str())
    }

    pub fn holds_lock(&self, field_id: &str, user_id: &str) -> bool {
        self.locks
            .get(field_id)
            .map(|lock| lock.user_id == user_id)
            .unwrap_or(false)
    }

    /// Apply remote events that are fresh, foreign and not yet seen.
    /// Returns how many were applied.
    pub fn apply_events(
        &mut self,
        events: Vec<CollaborationEvent>,
        now: i64,
        self_id: &str,
        freshness_ms: u64,
        out: &mut Vec<CollabNotification>,
    ) -> usize {
        let freshness = freshness_ms as i64;
        self.seen_events.retain(|_, ts| now - *ts < freshness);

        let mut fresh: Vec<CollaborationEvent> = events
            .into_iter()
            .filter(|e| e.user_id != self_id)
            .filter(|e| now - e.timestamp < freshness)
            .filter(|e| !self.seen_events.contains_key(&e.id))
            .collect();
        fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let applied = fresh.len();
        for event in fresh {
            self.seen_events.insert(event.id.clone(), event.timestamp);
            self.apply_event(event, self_id, out);
        }
        applied
    }

    fn apply_event(&mut self, event: CollaborationEvent, self_id: &str, out: &mut Vec<CollabNotification>) {
        self.touch_user(&event.user_id, event.timestamp);

        match event.kind {
            EventKind::FieldUpdate => self.apply_field_update(event, self_id, out),
            EventKind::SectionUpdate => {
                let Some(section_id) = event.section_id else {
                    tracing::warn!("section_update {} without sectionId", event.id);
                    return;
                };
                out.push(CollabNotification::SectionUpdated {
                    section_id,
                    data: event.data,
                    user_id: event.user_id,
                    user_name: event.user_name,
                    timestamp: event.timestamp,
                });
            }
            EventKind::UserJoined => {
                let user = serde_json::from_value::<ActiveUser>(event.data.clone()).unwrap_or_else(|_| {
                    ActiveUser {
                        id: event.user_id.clone(),
                        name: event.user_name.clone(),
                        email: String::new(),
                        color: grant_common::ids::user_color(&event.user_id).to_string(),
                        last_activity: event.timestamp,
                        current_section: event.section_id.clone(),
                        cursor_position: None,
                    }
                });
                if user.id != self_id && !self.active_users.contains_key(&user.id) {
                    tracing::debug!("{} joined", user.name);
                    self.active_users.insert(user.id.clone(), user.clone());
                    out.push(CollabNotification::UserJoined(user));
                }
            }
            EventKind::UserLeft => {
                if let Some(user) = self.active_users.remove(&event.user_id) {
                    tracing::debug!("{} left", user.name);
                    self.release_locks_of(&user.id, out);
                    out.push(CollabNotification::UserLeft {
                        user_id: user.id,
                        user_name: user.name,
                    });
                }
            }
            EventKind::CursorPosition => {
                let position = match serde_json::from_value::<CursorPosition>(event.data) {
                    Ok(position) => position,
                    Err(e) => {
                        tracing::warn!("Malformed cursor_position {}: {}", event.id, e);
                        return;
                    }
                };
                if let Some(user) = self.active_users.get_mut(&event.user_id) {
                    user.cursor_position = Some(position);
                    user.current_section = event.section_id.clone();
                }
                out.push(CollabNotification::CursorMoved {
                    user_id: event.user_id,
                    section_id: event.section_id,
                    position,
                });
            }
        }
    }

    fn apply_field_update(&mut self, event: CollaborationEvent, self_id: &str, out: &mut Vec<CollabNotification>) {
        let Some(field_id) = event.field_id else {
            tracing::warn!("field_update {} without fieldId", event.id);
            return;
        };

        if let Some(&newest) = self.field_clock.get(&field_id) {
            if event.timestamp < newest {
                tracing::debug!("Ignoring stale update of {} from {}", field_id, event.user_name);
                return;
            }
        }
        self.field_clock.insert(field_id.clone(), event.timestamp);

        let value = match event.data {
            Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
            other => other,
        };

        let has_conflict = self.holds_lock(&field_id, self_id);
        if has_conflict {
            tracing::info!("Conflicting edit on {} from {}", field_id, event.user_name);
            self.conflicts.insert(
                field_id.clone(),
                FieldConflict {
                    field_id: field_id.clone(),
                    section_id: event.section_id.clone(),
                    value: value.clone(),
                    user_id: event.user_id.clone(),
                    user_name: event.user_name.clone(),
                    timestamp: event.timestamp,
                },
            );
        }

        out.push(CollabNotification::FieldUpdated(FieldUpdate {
            section_id: event.section_id,
            field_id,
            value,
            user_id: event.user_id,
            user_name: event.user_name,
            timestamp: event.timestamp,
            has_conflict,
        }));
    }

    fn touch_user(&mut self, user_id: &str, timestamp: i64) {
        if let Some(user) = self.active_users.get_mut(user_id) {
            user.last_activity = user.last_activity.max(timestamp);
        }
    }

    /// Adopt other users' locks from the shared lock map.
    ///
    /// Our own locks are kept even when the remote map disagrees: two
    /// clients that lock the same field inside one poll window both keep
    /// believing they hold it.
    pub fn merge_remote_locks(
        &mut self,
        remote: &HashMap<String, FieldLock>,
        self_id: &str,
        out: &mut Vec<CollabNotification>,
    ) {
        let released: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.user_id != self_id)
            .filter(|(field, _)| match remote.get(*field) {
                None => true,
                Some(current) => current.user_id == self_id,
            })
            .map(|(field, _)| field.clone())
            .collect();

        for field_id in released {
            if let Some(lock) = self.locks.remove(&field_id) {
                out.push(CollabNotification::FieldUnlocked {
                    field_id,
                    user_id: lock.user_id,
                });
            }
        }

        for (field_id, lock) in remote {
            if lock.user_id == self_id {
                continue;
            }
            match self.locks.get(field_id) {
                Some(existing) if existing == lock => {}
                Some(existing) if existing.user_id == self_id => {
                    tracing::warn!(
                        "{} also claims {}, keeping our lock",
                        lock.user_name,
                        field_id
                    );
                }
                _ => {
                    self.locks.insert(field_id.clone(), lock.clone());
                    out.push(CollabNotification::FieldLocked(lock.clone()));
                }
            }
        }
    }

    /// Drop every lock held by `user_id`
    pub fn release_locks_of(&mut self, user_id: &str, out: &mut Vec<CollabNotification>) {
        let fields: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.user_id == user_id)
            .map(|(field, _)| field.clone())
            .collect();
        for field_id in fields {
            self.locks.remove(&field_id);
            out.push(CollabNotification::FieldUnlocked {
                field_id,
                user_id: user_id.to_string(),
            });
        }
    }

    /// Merge the shared presence map, evict stale users and release their
    /// locks. Returns the full map to write back, ourselves included.
    pub fn merge_presence(
        &mut self,
        remote: HashMap<String, ActiveUser>,
        me: &ActiveUser,
        now: i64,
        timeout_ms: u64,
        out: &mut Vec<CollabNotification>,
    ) -> HashMap<String, ActiveUser> {
        for (id, user) in remote {
            if id == me.id || user.is_stale(now, timeout_ms) {
                continue;
            }
            match self.active_users.get(&id) {
                Some(known) if known.last_activity >= user.last_activity => {}
                Some(_) => {
                    self.active_users.insert(id, user);
                }
                None => {
                    self.active_users.insert(id, user.clone());
                    out.push(CollabNotification::UserJoined(user));
                }
            }
        }

        let stale: Vec<String> = self
            .active_users
            .values()
            .filter(|u| u.is_stale(now, timeout_ms))
            .map(|u| u.id.clone())
            .collect();
        for id in stale {
            if let Some(user) = self.active_users.remove(&id) {
                tracing::info!("Evicting inactive user {}", user.name);
                out.push(CollabNotification::UserLeft {
                    user_id: user.id,
                    user_name: user.name,
                });
            }
        }

        // Locks of anyone no longer present are orphaned
        let orphaned: Vec<String> = self
            .locks
            .values()
            .filter(|lock| lock.user_id != me.id && !self.active_users.contains_key(&lock.user_id))
            .map(|lock| lock.user_id.clone())
            .collect();
        for user_id in orphaned {
            self.release_locks_of(&user_id, out);
        }

        let mut snapshot = self.active_users.clone();
        snapshot.insert(me.id.clone(), me.clone());
        snapshot
    }
}
