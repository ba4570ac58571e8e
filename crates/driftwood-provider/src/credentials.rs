//! Credential resolution
//!
//! Turns a [`ProviderConfig`]'s credential source into concrete key/value
//! pairs. Resolved values are cached for a bounded time so rotated secrets
//! are eventually picked up without restarting the control plane.

use crate::error::{ProviderError, Result};
use driftwood_core::{CredentialSource, ProviderConfig};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Resolved credential values. `Debug` never prints the values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get) but a missing key is an authentication error.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| ProviderError::AuthenticationFailed(format!("missing credential '{}'", key)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Read a credential source right now, bypassing any cache.
pub async fn resolve(source: &CredentialSource) -> Result<Credentials> {
    match source {
        CredentialSource::None => Ok(Credentials::default()),
        CredentialSource::Inline { values } => Ok(Credentials::new(values.clone())),
        CredentialSource::Env { variables } => {
            let mut values = BTreeMap::new();
            for name in variables {
                let value = std::env::var(name).map_err(|_| {
                    ProviderError::Credentials(format!("environment variable '{}' is not set", name))
                })?;
                values.insert(name.clone(), value);
            }
            Ok(Credentials::new(values))
        }
        CredentialSource::File { path } => read_credentials_file(path).await,
    }
}

/// `KEY=VALUE` per line. Blank lines and `#` comments are skipped and
/// surrounding quotes are stripped from values.
async fn read_credentials_file(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ProviderError::Credentials(format!("cannot read {}: {}", path.display(), e))
    })?;

    let mut values = BTreeMap::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ProviderError::Credentials(format!(
                "{}:{}: expected KEY=VALUE",
                path.display(),
                lineno + 1
            )));
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        values.insert(key.trim().to_string(), value.to_string());
    }
    Ok(Credentials::new(values))
}

/// Per-ProviderConfig cache of resolved credentials.
pub struct CredentialCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Credentials)>>,
}

impl CredentialCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, config: &ProviderConfig) -> Result<Credentials> {
        if self.ttl.is_zero() {
            return resolve(&config.credentials).await;
        }

        let mut entries = self.entries.lock().await;
        if let Some((resolved_at, credentials)) = entries.get(&config.name)
            && resolved_at.elapsed() < self.ttl
        {
            return Ok(credentials.clone());
        }

        debug!(provider_config = %config.name, "Resolving credentials");
        let credentials = resolve(&config.credentials).await?;
        entries.insert(config.name.clone(), (Instant::now(), credentials.clone()));
        Ok(credentials)
    }

    pub async fn invalidate(&self, name: &str) {
        self.entries.lock().await.remove(name);
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
