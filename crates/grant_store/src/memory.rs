//! In-process remote store

use crate::remote::{RemoteStore, Scope};
use async_trait::async_trait;
use grant_common::{GrantError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// [`RemoteStore`] held in memory.
///
/// Share one instance behind an `Arc` to let several coordinators or sync
/// queues in the same process see each other's writes.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    entries: Mutex<HashMap<String, (Value, Scope)>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scope a key was last written with
    pub fn scope_of(&self, key: &str) -> Option<Scope> {
        self.lock().ok()?.get(key).map(|(_, scope)| *scope)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, (Value, Scope)>>> {
        self.entries
            .lock()
            .map_err(|_| GrantError::StorageError("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &Value, scope: Scope) -> Result<()> {
        self.lock()?.insert(key.to_string(), (value.clone(), scope));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(key, (value, _))| (key.clone(), value.clone()))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
