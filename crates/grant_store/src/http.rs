//! HTTP client for the settings endpoint
//!
//! Routes (relative to `base_url`):
//!
//! | Operation | Request | Success |
//! |-----------|---------|---------|
//! | get       | `GET /settings/{key}` | `200 {"value": …}`, `404` = absent |
//! | set       | `PUT /settings/{key}` body `{"value": …, "scope": "user"}` | any 2xx |
//! | remove    | `DELETE /settings/{key}` | any 2xx or `404` |
//! | get_all   | `GET /settings` | `200 {"key": value, …}` |
//! | ping      | `GET /health` | any 2xx |

use crate::remote::{RemoteStore, Scope};
use async_trait::async_trait;
use grant_common::redact::redact;
use grant_common::{GrantError, Result};
use grant_config::RemoteConfig;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SettingResponse {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Serialize)]
struct SettingRequest<'a> {
    value: &'a Value,
    scope: Scope,
}

/// [`RemoteStore`] backed by the REST settings endpoint
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GrantError::ConfigError(format!("invalid base_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GrantError::ConfigError(format!(
                "base_url cannot be used as a base: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GrantError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Self::new(&config.base_url, config.auth_token.clone(), config.timeout())
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GrantError::ConfigError("base_url cannot be used as a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn network_error(operation: &str, err: reqwest::Error) -> GrantError {
        let message = redact(&err.to_string());
        tracing::debug!("{} failed: {}", operation, message);
        if err.is_connect() {
            GrantError::Unreachable
        } else {
            GrantError::NetworkError(message)
        }
    }

    fn rejected(operation: &'static str, key: &str, status: StatusCode) -> GrantError {
        GrantError::StoreRejected {
            operation,
            key: key.to_string(),
            reason: format!("HTTP {}", status),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let url = self.url(&["settings", key])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| Self::network_error("get", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: SettingResponse = response
                    .json()
                    .await
                    .map_err(|e| Self::network_error("get", e))?;
                Ok(match body.value {
                    Value::Null => None,
                    value => Some(value),
                })
            }
            status => Err(Self::rejected("get", key, status)),
        }
    }

    async fn set(&self, key: &str, value: &Value, scope: Scope) -> Result<()> {
        let url = self.url(&["settings", key])?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&SettingRequest { value, scope })
            .send()
            .await
            .map_err(|e| Self::network_error("set", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejected("set", key, response.status()))
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let url = self.url(&["settings", key])?;
        let response = self
            .request(reqwest::Method::DELETE, url)
            .send()
            .await
            .map_err(|e| Self::network_error("remove", e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::rejected("remove", key, status))
        }
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let url = self.url(&["settings"])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| Self::network_error("get_all", e))?;

        if !response.status().is_success() {
            return Err(Self::rejected("get_all", "*", response.status()));
        }
        response
            .json()
            .await
            .map_err(|e| Self::network_error("get_all", e))
    }

    async fn ping(&self) -> Result<()> {
        let url = self.url(&["health"])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| Self::network_error("ping", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejected("ping", "health", response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_key_segments() {
        let store =
            HttpRemoteStore::new("https://grants.example.org/api/", None, Duration::from_secs(1)).unwrap();
        let url = store.url(&["settings", "section/budget"]).unwrap();
        assert_eq!(url.as_str(), "https://grants.example.org/api/settings/section%2Fbudget");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpRemoteStore::new("not a url", None, Duration::from_secs(1)).is_err());
        assert!(HttpRemoteStore::new("mailto:ops@example.org", None, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Nothing listens on the discard port
        let store =
            HttpRemoteStore::new("http://127.0.0.1:9/api", None, Duration::from_secs(2)).unwrap();

        let err = store.get("profile").await.unwrap_err();
        assert!(err.is_network());
        assert!(store.ping().await.unwrap_err().is_network());
    }
}
