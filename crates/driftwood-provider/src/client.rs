//! Provider client trait definition

use crate::credentials::Credentials;
use crate::diff::DiffPolicy;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use driftwood_core::ResourceKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Provider client abstraction trait
///
/// One implementation per external system. Every method must be safe to
/// call again after a crash or a lost response: `create` in particular
/// receives an idempotency tag in the [`CallContext`] that implementations
/// attach to the external object, and `observe` must be able to find an
/// object by that tag when no external id is known yet.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Returns the provider name (e.g., "memory", "aws")
    fn name(&self) -> &str;

    /// Check that the credentials in `ctx` are usable
    async fn check_auth(&self, ctx: &CallContext) -> Result<AuthStatus> {
        let _ = ctx;
        Ok(AuthStatus::ok(self.name()))
    }

    /// Look up the external object.
    ///
    /// `external_id` is `None` when the resource has never recorded one;
    /// implementations then search by `ctx.idempotency_tag()`.
    async fn observe(
        &self,
        ctx: &CallContext,
        external_id: Option<&str>,
        desired: &Value,
    ) -> Result<Observation>;

    /// Create the external object and return its external id.
    async fn create(&self, ctx: &CallContext, desired: &Value) -> Result<String>;

    /// Bring an existing external object in line with `desired`.
    async fn update(&self, ctx: &CallContext, external_id: &str, desired: &Value) -> Result<()>;

    /// Delete the external object. Deleting an absent object must succeed
    /// or return [`ProviderError::NotFound`].
    async fn delete(&self, ctx: &CallContext, external_id: &str) -> Result<()>;

    /// Fields of `kind` that the external system manages on its own.
    fn diff_policy(&self, kind: &str) -> DiffPolicy {
        let _ = kind;
        DiffPolicy::default()
    }
}

/// Per-call information handed to a provider.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub resource: ResourceKey,
    pub provider_config: String,
    pub credentials: Credentials,
    pub settings: BTreeMap<String, String>,
    pub deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(resource: ResourceKey, provider_config: impl Into<String>) -> Self {
        Self {
            resource,
            provider_config: provider_config.into(),
            credentials: Credentials::default(),
            settings: BTreeMap::new(),
            deadline: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_settings(mut self, settings: BTreeMap<String, String>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stable tag identifying the resource across retries and restarts.
    pub fn idempotency_tag(&self) -> String {
        format!("driftwood:{}", self.resource)
    }

    /// Time left before the deadline. `None` means no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fail fast when the deadline has already passed.
    pub fn check_deadline(&self) -> Result<()> {
        match self.remaining() {
            Some(left) if left.is_zero() => Err(ProviderError::Timeout(format!(
                "deadline exceeded for {}",
                self.resource
            ))),
            _ => Ok(()),
        }
    }
}

/// What the provider found when looking for the external object.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Absent,
    Exists(ExternalObject),
}

impl Observation {
    pub fn exists(&self) -> Option<&ExternalObject> {
        match self {
            Observation::Exists(object) => Some(object),
            Observation::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalObject {
    pub external_id: String,
    /// Observed state including fields the external system generates
    pub state: Value,
    /// Whether the external object is usable
    pub ready: bool,
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub account_info: Option<String>,
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
