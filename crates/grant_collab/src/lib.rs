//! Real-time collaboration over a shared key-value store
//!
//! Several clients editing the same grant application see each other's
//! presence, claim fields while editing them and receive field updates
//! within a poll interval. There is no server-side coordination: see
//! [`coordinator`] for the storage layout.

pub mod coordinator;
pub mod events;
mod state;
pub mod types;

pub use coordinator::{CollaborationCoordinator, HEARTBEAT_TIMER, POLL_TIMER};
pub use events::{CollabNotification, EventBus, FieldUpdate, Listener, ListenerId, NotificationKind};
pub use types::{
    ActiveUser, CollaborationEvent, CursorPosition, EventKind, FieldConflict, FieldLock, LocalUser,
    LockStatus,
};

use grant_common::GrantError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollabError {
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Collaboration session already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Store(#[from] GrantError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CollabError>;
