//! Managed resource reconciler
//!
//! One pass:
//!
//! 1. Terminating: delete the external object (unless orphaned), then drop
//!    the finalizer.
//! 2. Observe the external object, by external name or by idempotency tag.
//! 3. Diff through the provider's policy and create, update or do nothing.
//! 4. Record `Synced`, `Ready`, the observed document and the external name.
//!
//! Before an external create the pass writes a pending marker. A create
//! whose response was lost is found again by tag on the next pass and
//! adopted instead of created twice.

use super::{Context, Reconciler, Requeue, ensure_finalizer, remove_finalizer};
use crate::error::{ReconcileError, Result};
use crate::phase::Phase;
use async_trait::async_trait;
use chrono::Utc;
use driftwood_core::{Condition, FINALIZER, Resource, ResourceKey, annotations};
use driftwood_provider::{
    Action, ActionType, CallContext, Observation, ProviderClient, ProviderError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Provider config used when a managed resource names none
pub const DEFAULT_PROVIDER_CONFIG: &str = "default";

/// `Synced` message after a create whose earlier attempt left no trace
pub const RECREATED_AFTER_INCOMPLETE_CREATE: &str =
    "previous create did not complete and no external object carried its tag; created again";

/// What happens to the external object when the managed resource is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    Delete,
    Orphan,
}

impl DeletionPolicy {
    pub fn of(resource: &Resource) -> Result<Self> {
        match resource.spec.get("deletionPolicy").and_then(Value::as_str) {
            None | Some("Delete") => Ok(DeletionPolicy::Delete),
            Some("Orphan") => Ok(DeletionPolicy::Orphan),
            Some(other) => Err(ReconcileError::Invalid(format!(
                "unknown deletionPolicy '{}'",
                other
            ))),
        }
    }
}

pub struct ManagedReconciler {
    kind: String,
    ctx: Arc<Context>,
}

impl ManagedReconciler {
    pub fn new(kind: impl Into<String>, ctx: Arc<Context>) -> Self {
        Self {
            kind: kind.into(),
            ctx,
        }
    }

    /// Resolve the provider config and credentials for one pass.
    async fn call_context(&self, resource: &Resource, provider: &dyn ProviderClient) -> Result<CallContext> {
        let name = resource
            .spec
            .pointer("/providerConfigRef/name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROVIDER_CONFIG);
        let config = self
            .ctx
            .catalog
            .provider_configs
            .get(name)
            .ok_or_else(|| ProviderError::ProviderConfigNotFound(name.to_string()))?;
        if config.provider != provider.name() {
            return Err(ReconcileError::Invalid(format!(
                "provider config '{}' is for provider '{}', but {} is served by '{}'",
                name,
                config.provider,
                resource.kind,
                provider.name()
            )));
        }

        let credentials = self.ctx.credentials.get(config).await?;
        Ok(CallContext::new(resource.key(), name)
            .with_credentials(credentials)
            .with_settings(config.settings.clone())
            .with_deadline(Instant::now() + self.ctx.config.pass_deadline))
    }

    async fn finalize(&self, resource: Resource, provider: &dyn ProviderClient) -> Result<Requeue> {
        if !resource.has_finalizer(FINALIZER) {
            return Ok(Requeue::None);
        }
        let key = resource.key();

        if DeletionPolicy::of(&resource)? == DeletionPolicy::Orphan {
            info!(%key, external_name = ?resource.external_name(), "Orphaning external object");
        } else {
            let call = self.call_context(&resource, provider).await?;
            let desired = for_provider(&resource);
            let observation = provider
                .observe(&call, resource.external_name(), &desired)
                .await?;
            let action = Action::plan_delete(&observation);
            if action.action_type == ActionType::Delete
                && let Some(object) = observation.exists()
            {
                match provider.delete(&call, &object.external_id).await {
                    Ok(()) => {
                        info!(%key, external_id = %object.external_id, "Deleted external object")
                    }
                    Err(ProviderError::NotFound(_)) => {
                        debug!(%key, "External object already gone")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        remove_finalizer(&self.ctx.store, &resource).await?;
        debug!(%key, "Finalizer removed");
        Ok(Requeue::None)
    }

    /// Write the crash marker, create, then record the external name.
    ///
    /// The marker keeps the time of the first attempt; a retried create
    /// leaves it alone.
    async fn create(
        &self,
        resource: &mut Resource,
        provider: &dyn ProviderClient,
        call: &CallContext,
        desired: &Value,
    ) -> Result<String> {
        let store = &self.ctx.store;
        let key = resource.key();
        if resource.annotation(annotations::EXTERNAL_CREATE_PENDING).is_some() {
            warn!(%key, "Previous create did not complete and nothing was found by tag, creating again");
        } else {
            let started = Utc::now().to_rfc3339();
            let version = store
                .update_metadata(&key, resource.metadata.resource_version, |meta| {
                    meta.annotations
                        .insert(annotations::EXTERNAL_CREATE_PENDING.to_string(), started);
                })
                .await?
                .ok_or_else(|| ReconcileError::Conflict(format!("{} vanished during create", key)))?;
            resource.metadata.resource_version = version;
        }

        let external_id = provider.create(call, desired).await?;
        info!(%key, %external_id, "External object created");

        self.record_external_name(resource, &external_id, true).await?;
        Ok(external_id)
    }

    async fn record_external_name(&self, resource: &mut Resource, external_id: &str, created: bool) -> Result<()> {
        let key = resource.key();
        let now = Utc::now().to_rfc3339();
        let id = external_id.to_string();
        let version = self
            .ctx
            .store
            .update_metadata(&key, resource.metadata.resource_version, move |meta| {
                meta.annotations
                    .insert(annotations::EXTERNAL_NAME.to_string(), id);
                meta.annotations
                    .remove(annotations::EXTERNAL_CREATE_PENDING);
                if created {
                    meta.annotations
                        .insert(annotations::EXTERNAL_CREATE_SUCCEEDED.to_string(), now);
                }
            })
            .await?
            .ok_or_else(|| ReconcileError::Conflict(format!("{} vanished during create", key)))?;

        let local = &mut resource.metadata.annotations;
        local.insert(annotations::EXTERNAL_NAME.to_string(), external_id.to_string());
        local.remove(annotations::EXTERNAL_CREATE_PENDING);
        resource.metadata.resource_version = version;
        Ok(())
    }
}

/// Document handed to the provider
fn for_provider(resource: &Resource) -> Value {
    match resource.spec.get("forProvider") {
        Some(value) if !value.is_null() => value.clone(),
        _ => json!({}),
    }
}

#[async_trait]
impl Reconciler for ManagedReconciler {
    fn kind(&self) -> &str {
        &self.kind
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue> {
        let store = &self.ctx.store;
        let Some(resource) = store.try_get(key).await else {
            return Ok(Requeue::None);
        };
        let phase = Phase::of(Some(&resource));
        debug!(%phase, generation = resource.metadata.generation, "Reconciling managed resource");

        let provider = self.ctx.providers.for_kind(&key.kind)?;
        if resource.is_terminating() {
            return self
                .finalize(resource, provider.as_ref())
                .await
                .map_err(ReconcileError::delete_failed);
        }

        let mut resource = ensure_finalizer(store, resource).await?;
        DeletionPolicy::of(&resource)?;
        let call = self.call_context(&resource, provider.as_ref()).await?;
        let desired = for_provider(&resource);

        let observation = provider
            .observe(&call, resource.external_name(), &desired)
            .await?;
        let policy = provider.diff_policy(&key.kind);
        let action = Action::plan(&observation, &desired, &policy);

        let now = Utc::now();
        let mut status = resource.status.clone();
        match &observation {
            Observation::Absent => {
                if resource.external_name().is_some() {
                    warn!(external_name = ?resource.external_name(), "External object disappeared, recreating");
                }
                let retried = resource
                    .annotation(annotations::EXTERNAL_CREATE_PENDING)
                    .is_some();
                let external_id = self
                    .create(&mut resource, provider.as_ref(), &call, &desired)
                    .await?;
                let synced = Condition::synced(now);
                status.conditions.set(if retried {
                    synced.with_message(RECREATED_AFTER_INCOMPLETE_CREATE)
                } else {
                    synced
                });
                status.conditions.set(Condition::creating(now));
                status.fields.insert(
                    "atProvider".to_string(),
                    json!({ "externalName": external_id }),
                );
            }
            Observation::Exists(object) => {
                if resource.external_name() != Some(object.external_id.as_str()) {
                    info!(external_id = %object.external_id, "Adopting external object found by tag");
                    self.record_external_name(&mut resource, &object.external_id, false)
                        .await?;
                }
                if action.action_type == ActionType::Update {
                    provider
                        .update(&call, &object.external_id, &desired)
                        .await?;
                    info!(external_id = %object.external_id, changes = %action.summary(), "External object updated");
                }

                status.conditions.set(Condition::synced(now));
                status.conditions.set(if object.ready {
                    Condition::available(now)
                } else {
                    Condition::creating(now)
                });
                status.observed = object.state.clone();
                status.fields.insert(
                    "atProvider".to_string(),
                    json!({ "externalName": object.external_id }),
                );
            }
        }
        status.observed_generation = Some(resource.metadata.generation);

        let ready = action.action_type == ActionType::NoOp
            && observation.exists().is_some_and(|o| o.ready);
        crate::conditions::write_status(store, &resource, status).await?;

        if ready {
            Ok(Requeue::None)
        } else {
            Ok(Requeue::After(self.ctx.config.poll_interval))
        }
    }
}
