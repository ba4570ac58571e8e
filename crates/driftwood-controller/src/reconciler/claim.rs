//! Claim reconciler
//!
//! A claim is the namespaced front door to a composite. The reconciler keeps
//! one cluster-scoped composite named `{namespace}-{name}` in line with the
//! claim's spec and mirrors the composite's conditions and status fields
//! back onto the claim.

use super::{Context, Reconciler, Requeue, ensure_finalizer, remove_finalizer};
use crate::conditions::write_status;
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use chrono::Utc;
use driftwood_core::{
    Condition, ConditionStatus, FINALIZER, READY, Resource, ResourceKey, SYNCED, annotations,
    reason,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Namespace used for claims created without one
const DEFAULT_NAMESPACE: &str = "default";

pub struct ClaimReconciler {
    kind: String,
    composite_kind: String,
    ctx: Arc<Context>,
}

impl ClaimReconciler {
    pub fn new(kind: impl Into<String>, composite_kind: impl Into<String>, ctx: Arc<Context>) -> Self {
        Self {
            kind: kind.into(),
            composite_kind: composite_kind.into(),
            ctx,
        }
    }

    /// Key of the composite requested by `claim`.
    pub fn composite_key(&self, claim: &ResourceKey) -> ResourceKey {
        let namespace = claim.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        ResourceKey::new(
            self.composite_kind.clone(),
            format!("{}-{}", namespace, claim.name),
        )
    }

    fn desired_composite(&self, claim: &Resource) -> Resource {
        let key = claim.key();
        let namespace = key.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let mut composite = Resource::new(
            claim.api_version.clone(),
            &self.composite_key(&key),
            claim.spec.clone(),
        )
        .with_owner(&key)
        .with_annotation(annotations::CLAIM, format!("{}/{}", namespace, key.name));
        composite.metadata.labels = claim.metadata.labels.clone();
        composite
    }

    async fn finalize(&self, claim: Resource) -> Result<Requeue> {
        if !claim.has_finalizer(FINALIZER) {
            return Ok(Requeue::None);
        }
        let store = &self.ctx.store;
        let composite_key = self.composite_key(&claim.key());

        match store.try_get(&composite_key).await {
            Some(composite) if composite.controller_owner() == Some(claim.key()) => {
                if !composite.is_terminating() {
                    store.delete(&composite_key, None).await?;
                    info!(composite = %composite_key, "Composite deletion requested");
                }
                let mut status = claim.status.clone();
                status.conditions.set(Condition::deleting(Utc::now()));
                write_status(store, &claim, status).await?;
                Ok(Requeue::After(self.ctx.config.poll_interval))
            }
            _ => {
                remove_finalizer(store, &claim).await?;
                info!(claim = %claim.key(), "Claim deleted");
                Ok(Requeue::None)
            }
        }
    }
}

#[async_trait]
impl Reconciler for ClaimReconciler {
    fn kind(&self) -> &str {
        &self.kind
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue> {
        let store = &self.ctx.store;
        let Some(claim) = store.try_get(key).await else {
            return Ok(Requeue::None);
        };
        if claim.is_terminating() {
            return self
                .finalize(claim)
                .await
                .map_err(ReconcileError::delete_failed);
        }
        let claim = ensure_finalizer(store, claim).await?;

        let composite_key = self.composite_key(key);
        if let Some(existing) = store.try_get(&composite_key).await
            && existing.controller_owner().as_ref() != Some(key)
        {
            return Err(ReconcileError::Invalid(format!(
                "{} exists and is not owned by this claim",
                composite_key
            )));
        }
        store.apply(self.desired_composite(&claim)).await?;

        let Some(composite) = store.try_get(&composite_key).await else {
            return Ok(Requeue::After(self.ctx.config.poll_interval));
        };
        let now = Utc::now();
        let mut status = claim.status.clone();
        for type_ in [SYNCED, READY] {
            let mirrored = match composite.status.conditions.get(type_) {
                Some(condition) => Condition {
                    last_transition_time: now,
                    ..condition.clone()
                },
                None => Condition::new(type_, ConditionStatus::False, reason::WAITING_FOR_CHILDREN, now),
            };
            status.conditions.set(mirrored);
        }
        for (field, value) in &composite.status.fields {
            status.fields.insert(field.clone(), value.clone());
        }
        status.fields.insert(
            "resourceRef".to_string(),
            json!({ "kind": composite_key.kind, "name": composite_key.name }),
        );
        status.observed_generation = Some(claim.metadata.generation);
        write_status(store, &claim, status).await?;

        let ready = composite.status.conditions.is_true(READY);
        debug!(composite = %composite_key, ready, "Claim reconciled");
        if ready {
            Ok(Requeue::None)
        } else {
            Ok(Requeue::After(self.ctx.config.poll_interval))
        }
    }
}
