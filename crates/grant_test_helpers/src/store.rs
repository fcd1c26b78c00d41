//! Remote store with switchable failures

use async_trait::async_trait;
use grant_common::{GrantError, Result};
use grant_store::{RemoteStore, Scope};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a [`RemoteStore`] and fails calls on demand.
///
/// - `fail_writes`: `set`/`remove` error, reads still work
/// - `fail_reads`: `get`/`get_all` error, writes still work
/// - `unreachable`: everything errors, including `ping`
pub struct FaultyStore<S> {
    inner: Arc<S>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    unreachable: AtomicBool,
    write_attempts: AtomicUsize,
}

impl<S: RemoteStore> FaultyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            write_attempts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// `set` and `remove` calls seen so far, failed or not
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GrantError::Unreachable);
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GrantError::NetworkError("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self, operation: &'static str, key: &str) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GrantError::Unreachable);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GrantError::StoreRejected {
                operation,
                key: key.to_string(),
                reason: "injected write failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for FaultyStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value, scope: Scope) -> Result<()> {
        self.check_write("set", key)?;
        self.inner.set(key, value, scope).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_write("remove", key)?;
        self.inner.remove(key).await
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.check_read()?;
        self.inner.get_all().await
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GrantError::Unreachable);
        }
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grant_store::MemoryRemoteStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_fault_toggles() {
        let store = FaultyStore::new(Arc::new(MemoryRemoteStore::new()));
        store.set("k", &json!(1), Scope::User).await.unwrap();

        store.set_fail_writes(true);
        assert!(store.set("k", &json!(2), Scope::User).await.is_err());
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));

        store.set_fail_writes(false);
        store.set_unreachable(true);
        assert!(store.get("k").await.is_err());
        assert!(store.ping().await.is_err());
        assert_eq!(store.write_attempts(), 2);
    }
}
