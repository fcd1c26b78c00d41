//! Notifications delivered to the UI layer
//!
//! Listeners are plain callbacks, dispatched synchronously in registration
//! order. A listener that panics is logged and skipped; the others still
//! run.

use crate::types::{ActiveUser, CursorPosition, FieldLock};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    FieldUpdated,
    SectionUpdated,
    FieldLocked,
    FieldUnlocked,
    UserJoined,
    UserLeft,
    CursorMoved,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FieldUpdated => "fieldUpdated",
            NotificationKind::SectionUpdated => "sectionUpdated",
            NotificationKind::FieldLocked => "fieldLocked",
            NotificationKind::FieldUnlocked => "fieldUnlocked",
            NotificationKind::UserJoined => "userJoined",
            NotificationKind::UserLeft => "userLeft",
            NotificationKind::CursorMoved => "cursorMoved",
        }
    }
}

/// Remote field value.
///
/// With `has_conflict` set the local user is editing the field: the value
/// is parked as a conflict and must not replace the live edit.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub section_id: Option<String>,
    pub field_id: String,
    pub value: Value,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: i64,
    pub has_conflict: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollabNotification {
    FieldUpdated(FieldUpdate),
    SectionUpdated {
        section_id: String,
        data: Value,
        user_id: String,
        user_name: String,
        timestamp: i64,
    },
    FieldLocked(FieldLock),
    FieldUnlocked {
        field_id: String,
        user_id: String,
    },
    UserJoined(ActiveUser),
    UserLeft {
        user_id: String,
        user_name: String,
    },
    CursorMoved {
        user_id: String,
        section_id: Option<String>,
        position: CursorPosition,
    },
}

impl CollabNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            CollabNotification::FieldUpdated(_) => NotificationKind::FieldUpdated,
            CollabNotification::SectionUpdated { .. } => NotificationKind::SectionUpdated,
            CollabNotification::FieldLocked(_) => NotificationKind::FieldLocked,
            CollabNotification::FieldUnlocked { .. } => NotificationKind::FieldUnlocked,
            CollabNotification::UserJoined(_) => NotificationKind::UserJoined,
            CollabNotification::UserLeft { .. } => NotificationKind::UserLeft,
            CollabNotification::CursorMoved { .. } => NotificationKind::CursorMoved,
        }
    }
}

pub type Listener = Arc<dyn Fn(&CollabNotification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<NotificationKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: NotificationKind, listener: F) -> ListenerId
    where
        F: Fn(&CollabNotification) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, kind: NotificationKind, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        match listeners.get_mut(&kind) {
            Some(registered) => {
                let before = registered.len();
                registered.retain(|(existing, _)| *existing != id);
                before != registered.len()
            }
            None => false,
        }
    }

    pub fn emit(&self, notification: &CollabNotification) {
        let kind = notification.kind();
        // Snapshot so listeners may call on/off without deadlocking
        let listeners: Vec<Listener> = self
            .lock()
            .get(&kind)
            .map(|registered| registered.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(notification))).is_err() {
                tracing::error!("Listener for {} panicked", kind.as_str());
            }
        }
    }

    pub fn listener_count(&self, kind: NotificationKind) -> usize {
        self.lock().get(&kind).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NotificationKind, Vec<(ListenerId, Listener)>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
