//! Presence, lock and event records
//!
//! These are stored as JSON in the remote store and read by every client of
//! the organization, so field names are camelCase and event kinds
//! snake_case on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Pointer position inside the shared document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A participant currently viewing the shared document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub color: String,
    /// Epoch millis of the last heartbeat or action
    pub last_activity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<CursorPosition>,
}

impl ActiveUser {
    /// No activity for longer than `timeout_ms`
    pub fn is_stale(&self, now: i64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_activity) > timeout_ms as i64
    }
}

/// Identity of the local participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

impl LocalUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Advisory claim on one form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLock {
    pub field_id: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: i64,
}

/// Answer of `is_field_locked`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockStatus {
    pub locked: bool,
    pub locked_by: Option<String>,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub fn locked_by(name: impl Into<String>) -> Self {
        Self {
            locked: true,
            locked_by: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FieldUpdate,
    SectionUpdate,
    UserJoined,
    UserLeft,
    CursorPosition,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FieldUpdate => "field_update",
            EventKind::SectionUpdate => "section_update",
            EventKind::UserJoined => "user_joined",
            EventKind::UserLeft => "user_left",
            EventKind::CursorPosition => "cursor_position",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message broadcast through the shared event list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
}

/// Remote value that arrived while the local user was editing the field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field_id: String,
    pub section_id: Option<String>,
    pub value: Value,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: i64,
}
