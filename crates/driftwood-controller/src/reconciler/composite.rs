//! Composite resource reconciler
//!
//! Validates the composite against its definition, selects and pins a
//! composition, composes children, upserts them by derived name, removes
//! children the composition no longer produces and aggregates child
//! conditions into the composite's own.
//!
//! A composition failure ends the pass before any child write, so children
//! stay at the last successfully composed state.

use super::{Context, Reconciler, Requeue, ensure_finalizer, remove_finalizer};
use crate::conditions::{ChildSummary, write_status};
use crate::error::{ReconcileError, Result};
use crate::phase::Phase;
use async_trait::async_trait;
use chrono::Utc;
use driftwood_composition::{PriorState, select_composition};
use driftwood_core::{Condition, FINALIZER, Resource, ResourceKey, annotations};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CompositeReconciler {
    kind: String,
    ctx: Arc<Context>,
}

impl CompositeReconciler {
    pub fn new(kind: impl Into<String>, ctx: Arc<Context>) -> Self {
        Self {
            kind: kind.into(),
            ctx,
        }
    }

    /// Delete every child, then release the composite.
    async fn finalize(&self, resource: Resource) -> Result<Requeue> {
        if !resource.has_finalizer(FINALIZER) {
            return Ok(Requeue::None);
        }
        let store = &self.ctx.store;
        let key = resource.key();

        let children = store.children(&key).await;
        if children.is_empty() {
            remove_finalizer(store, &resource).await?;
            info!(%key, "Composite deleted");
            return Ok(Requeue::None);
        }

        for child in children.iter().filter(|c| !c.is_terminating()) {
            store.delete(&child.key(), None).await?;
            debug!(%key, child = %child.key(), "Child deletion requested");
        }

        let mut status = resource.status.clone();
        status.conditions.set(Condition::deleting(Utc::now()));
        write_status(store, &resource, status).await?;
        Ok(Requeue::After(self.ctx.config.poll_interval))
    }

    /// Upsert one child. A resource controlled by another owner, or by no
    /// owner at all, is never taken over.
    async fn apply_child(&self, owner: &ResourceKey, child: Resource) -> Result<()> {
        let store = &self.ctx.store;
        let key = child.key();
        if let Some(existing) = store.try_get(&key).await {
            match existing.controller_owner() {
                Some(controller) if controller == *owner => {}
                Some(controller) => {
                    return Err(ReconcileError::Invalid(format!(
                        "{} is already controlled by {}",
                        key, controller
                    )));
                }
                None => {
                    return Err(ReconcileError::Invalid(format!(
                        "{} already exists and is not owned by {}",
                        key, owner
                    )));
                }
            }
            if existing.is_terminating() {
                // recreated once the old object is gone
                debug!(child = %key, "Child still terminating, skipping");
                return Ok(());
            }
        }
        store.apply(child).await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for CompositeReconciler {
    fn kind(&self) -> &str {
        &self.kind
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind))]
    async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue> {
        let ctx = &self.ctx;
        let store = &ctx.store;
        let Some(resource) = store.try_get(key).await else {
            return Ok(Requeue::None);
        };
        debug!(phase = %Phase::of(Some(&resource)), "Reconciling composite");

        if resource.is_terminating() {
            return self
                .finalize(resource)
                .await
                .map_err(ReconcileError::delete_failed);
        }
        let mut resource = ensure_finalizer(store, resource).await?;

        let definition = ctx
            .catalog
            .definition_for_composite(&key.kind)
            .ok_or_else(|| ReconcileError::Invalid(format!("no definition for kind {}", key.kind)))?;
        let mut composite = resource.clone();
        composite.spec = definition.validate_spec(&resource.spec)?;

        let selection = select_composition(&ctx.catalog, &composite)?;
        let composition = selection.composition;
        if selection.needs_pin() {
            let name = composition.name.clone();
            if let Some(version) = store
                .update_metadata(key, resource.metadata.resource_version, |meta| {
                    meta.annotations
                        .insert(annotations::COMPOSITION.to_string(), name);
                })
                .await?
            {
                resource.metadata.resource_version = version;
            }
            info!(composition = %composition.name, selected_by = %selection.selected_by, "Pinned composition");
        }

        let prior = PriorState::from_children(store.children(key).await);
        let composed = ctx.engine.compose(&composite, composition, &prior)?;

        for child in &composed.resources {
            self.apply_child(key, child.to_resource(key)).await?;
        }

        for (template, child) in prior.iter() {
            if !composed.retains(template) && !child.is_terminating() {
                store.delete(&child.key(), None).await?;
                info!(child = %child.key(), %template, "Deleted child no longer composed");
            }
        }
        // children without a template annotation were not made by a composition
        for child in store.children(key).await {
            if child.annotation(annotations::COMPOSITION_RESOURCE).is_none() && !child.is_terminating() {
                store.delete(&child.key(), None).await?;
                info!(child = %child.key(), "Deleted unrecognized child");
            }
        }

        let current = PriorState::from_children(
            store
                .children(key)
                .await
                .into_iter()
                .filter(|c| !c.is_terminating()),
        );
        let summary = ChildSummary::of(current.iter().map(|(_, c)| c));
        let waiting_for_sequence = composed
            .withheld
            .iter()
            .any(|template| current.get(template).is_none());

        let mut status = resource.status.clone();
        status.conditions.set(summary.synced_condition());
        let ready = summary.ready_condition(waiting_for_sequence);
        let is_ready = ready.status.is_true();
        status.conditions.set(ready);
        for (field, value) in ctx.engine.collect_status(composition, &current)? {
            status.fields.insert(field, value);
        }
        status.observed_generation = Some(resource.metadata.generation);
        write_status(store, &resource, status).await?;

        debug!(
            children = current.len(),
            withheld = composed.withheld.len(),
            ready = is_ready,
            "Composite reconciled"
        );
        if is_ready {
            Ok(Requeue::None)
        } else {
            Ok(Requeue::After(ctx.config.poll_interval))
        }
    }
}
