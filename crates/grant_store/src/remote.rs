//! Remote key-value store contract

use async_trait::async_trait;
use grant_common::{GrantError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Visibility of a stored value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Only the signed-in user sees it
    #[default]
    User,
    /// Everyone in the organization sees it
    Organization,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Organization => "organization",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Scope::User),
            "organization" => Ok(Scope::Organization),
            other => Err(GrantError::ValidationError(format!("unknown scope '{}'", other))),
        }
    }
}

/// Key-value settings endpoint shared by every client of an organization.
///
/// No operation is atomic with respect to another client: a `get` followed
/// by a `set` can interleave with another client's writes. Anything built
/// on top (presence, field locks) is advisory.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Current value of `key`, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`. An `Err` means the write did not land.
    async fn set(&self, key: &str, value: &Value, scope: Scope) -> Result<()>;

    /// Delete `key`; deleting an absent key succeeds
    async fn remove(&self, key: &str) -> Result<()>;

    /// Every key visible to this client
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Lightweight reachability probe
    async fn ping(&self) -> Result<()> {
        self.get_all().await.map(|_| ())
    }
}
