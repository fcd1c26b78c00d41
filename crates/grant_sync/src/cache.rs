//! Last known value of each resource

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Value,
    /// Epoch millis of the local write, the server's modification time, or
    /// the last time the server accepted one of our writes
    pub timestamp: i64,
    pub version: u64,
}

/// Resource key to cached value. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfflineCache {
    entries: HashMap<String, CacheEntry>,
}

impl OfflineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str) -> Option<&CacheEntry> {
        self.entries.get(resource)
    }

    /// Insert or replace, bumping the version
    pub fn upsert(&mut self, resource: &str, data: Value, timestamp: i64) -> &CacheEntry {
        let version = self.entries.get(resource).map(|e| e.version + 1).unwrap_or(1);
        self.entries.insert(
            resource.to_string(),
            CacheEntry {
                data,
                timestamp,
                version,
            },
        );
        &self.entries[resource]
    }

    /// Record that the server accepted `sent` at `timestamp`.
    ///
    /// If the entry still holds `sent` it becomes `written`. If a newer local
    /// write replaced it meanwhile, only the timestamp moves forward: the
    /// server copy is ours, so it must not look like a foreign change.
    /// Returns whether the entry changed.
    pub fn confirm(&mut self, resource: &str, sent: &Value, written: Value, timestamp: i64) -> bool {
        let Some(entry) = self.entries.get_mut(resource) else {
            return false;
        };
        if entry.data == *sent {
            entry.data = written;
            entry.timestamp = timestamp;
            entry.version += 1;
            true
        } else if timestamp > entry.timestamp {
            entry.timestamp = timestamp;
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, resource: &str) -> Option<CacheEntry> {
        self.entries.remove(resource)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached resource keys, sorted
    pub fn resources(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
