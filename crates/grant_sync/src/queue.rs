//! Queued operations and their lifecycle
//!
//! ```text
//! pending -> syncing -> completed            (pruned after the pass)
//!                    -> failed -> syncing ... -> failed (after max retries)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            other => Err(SyncError::InvalidOperation(format!(
                "unknown operation '{}', expected create, update or delete",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Syncing,
    Failed,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Syncing => "syncing",
            ItemStatus::Failed => "failed",
            ItemStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One buffered mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: String,
    /// Epoch millis when the operation was queued
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub operation: OperationType,
    pub resource: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub retry_count: u32,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncQueueItem {
    pub fn new(id: String, timestamp: i64, operation: OperationType, resource: &str, data: Value) -> Self {
        Self {
            id,
            timestamp,
            operation,
            resource: resource.to_string(),
            data,
            retry_count: 0,
            status: ItemStatus::Pending,
            error: None,
        }
    }

    /// Whether the next sync pass should attempt this item
    pub fn is_due(&self, max_retries: u32) -> bool {
        match self.status {
            ItemStatus::Pending => true,
            ItemStatus::Failed => self.retry_count < max_retries,
            ItemStatus::Syncing | ItemStatus::Completed => false,
        }
    }

    /// Failed with no retries left
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.status == ItemStatus::Failed && self.retry_count >= max_retries
    }
}

/// Point-in-time counts for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub syncing: usize,
    pub failed: usize,
    pub total: usize,
}

impl QueueStatus {
    pub fn of(items: &[SyncQueueItem]) -> Self {
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
        Self {
            pending: count(ItemStatus::Pending),
            syncing: count(ItemStatus::Syncing),
            failed: count(ItemStatus::Failed),
            total: items.len(),
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending: {}  syncing: {}  failed: {}  total: {}",
            self.pending, self.syncing, self.failed, self.total
        )
    }
}
