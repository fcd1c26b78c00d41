//! Conflict detection and resolution strategies
//!
//! A queued `update` conflicts with the server when the server copy was
//! modified after the local cache entry was written. The modification time
//! is read from the server object itself, see [`server_timestamp`].

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::cache::CacheEntry;
use crate::SyncError;

/// Fields checked, in order, for the server's modification time
pub const TIMESTAMP_FIELDS: [&str; 3] = ["lastModified", "updatedAt", "updated_at"];

/// Field stamped on every object written by the sync queue
pub const STAMP_FIELD: &str = "lastModified";

/// Conflict resolution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Local data overwrites the server copy
    #[default]
    LastWriteWins,

    /// Shallow merge: server fields as the base, local fields override
    Merge,

    /// Placeholder for user-driven resolution. Logged, then treated as
    /// last-write-wins.
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" => Ok(ConflictStrategy::LastWriteWins),
            "merge" => Ok(ConflictStrategy::Merge),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(SyncError::Config(format!("unknown conflict strategy '{}'", other))),
        }
    }
}

/// Modification time embedded in a server object, in epoch millis.
///
/// Accepts integer millis, numeric strings and RFC 3339 timestamps.
pub fn server_timestamp(value: &Value) -> Option<i64> {
    let object = value.as_object()?;
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| object.get(*field))
        .find_map(parse_timestamp)
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis())),
        _ => None,
    }
}

/// Copy of `data` carrying `lastModified = now`. Non-objects are returned
/// unchanged.
pub fn stamp(data: &Value, now: i64) -> Value {
    let mut stamped = data.clone();
    if let Value::Object(map) = &mut stamped {
        map.insert(STAMP_FIELD.to_string(), Value::from(now));
    }
    stamped
}

/// Copy of `data` without the stamp, unless `queued` carried one itself.
/// This is what the cache keeps after a write.
pub fn unstamp(data: &Value, queued: &Value) -> Value {
    let mut plain = data.clone();
    let caller_stamped = queued.get(STAMP_FIELD).is_some();
    if let (Value::Object(map), false) = (&mut plain, caller_stamped) {
        map.remove(STAMP_FIELD);
    }
    plain
}

/// Conflict resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Whether the server copy changed after our cached entry was written.
    /// Without a cached entry or a server timestamp there is nothing to
    /// compare, so no conflict.
    pub fn detect_conflict(&self, local: Option<&CacheEntry>, server: &Value) -> bool {
        match (local, server_timestamp(server)) {
            (Some(entry), Some(modified)) => modified > entry.timestamp,
            _ => false,
        }
    }

    /// Value to write given the local and the (newer) server data
    pub fn resolve_conflict(&self, local: &Value, server: &Value) -> Value {
        match self.strategy {
            ConflictStrategy::LastWriteWins => local.clone(),
            ConflictStrategy::Merge => match (server, local) {
                (Value::Object(base), Value::Object(overrides)) => {
                    let mut merged = base.clone();
                    for (key, value) in overrides {
                        merged.insert(key.clone(), value.clone());
                    }
                    Value::Object(merged)
                }
                // Nothing to spread; the local value replaces the server's
                _ => local.clone(),
            },
            ConflictStrategy::Manual => {
                tracing::warn!("Manual conflict resolution is not available, keeping local data");
                local.clone()
            }
        }
    }
}
