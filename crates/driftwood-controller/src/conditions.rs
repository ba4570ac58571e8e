//! Status writes and condition aggregation
//!
//! All status writes from reconcilers go through [`write_status`], which
//! skips writes that would not change the stored status. Failure conditions
//! are recorded centrally by the dispatcher through [`record_failure`].

use crate::error::{ReconcileError, Result};
use chrono::Utc;
use driftwood_core::{
    Condition, ConditionStatus, READY, Resource, ResourceKey, ResourceStatus, SYNCED, aggregate,
    reason,
};
use driftwood_store::ResourceStore;
use tracing::debug;

/// Persist `status` unless it equals what `resource` already has.
///
/// Returns the resource version after the write.
pub async fn write_status(
    store: &ResourceStore,
    resource: &Resource,
    status: ResourceStatus,
) -> Result<u64> {
    if resource.status == status {
        return Ok(resource.metadata.resource_version);
    }
    let version = store
        .update_status(&resource.key(), status, resource.metadata.resource_version)
        .await?;
    Ok(version)
}

/// Record `Synced=False` with the error's reason.
///
/// Re-reads and retries on conflict up to `retries` times. A resource that
/// no longer exists needs no condition.
pub async fn record_failure(
    store: &ResourceStore,
    key: &ResourceKey,
    err: &ReconcileError,
    retries: u32,
) -> Result<()> {
    for _ in 0..=retries {
        let Some(resource) = store.try_get(key).await else {
            return Ok(());
        };
        let mut status = resource.status.clone();
        let condition = Condition::sync_failed(err.reason(), Utc::now()).with_message(err.to_string());
        if !status.conditions.set(condition) {
            return Ok(());
        }
        match store
            .update_status(key, status, resource.metadata.resource_version)
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if e.is_conflict() => {
                debug!(%key, "Conflict while recording failure, re-reading");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ReconcileError::Conflict(format!(
        "gave up recording failure condition on {}",
        key
    )))
}

/// Aggregated view of a composite's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSummary {
    pub ready: ConditionStatus,
    pub synced: ConditionStatus,
}

impl ChildSummary {
    pub fn of<'a>(children: impl IntoIterator<Item = &'a Resource>) -> Self {
        let children: Vec<&Resource> = children.into_iter().collect();
        Self {
            ready: aggregate(children.iter().map(|c| &c.status.conditions), READY),
            synced: aggregate(children.iter().map(|c| &c.status.conditions), SYNCED),
        }
    }

    /// Composite `Ready`. `waiting_for_sequence` marks children a pipeline
    /// step held back that do not exist yet.
    pub fn ready_condition(&self, waiting_for_sequence: bool) -> Condition {
        let now = Utc::now();
        if waiting_for_sequence {
            Condition::new(READY, ConditionStatus::False, reason::WAITING_FOR_SEQUENCE, now)
        } else if self.ready.is_true() {
            Condition::available(now)
        } else {
            Condition::new(READY, ConditionStatus::False, reason::WAITING_FOR_CHILDREN, now)
        }
    }

    /// Composite `Synced`: the composite's own apply succeeded, so only a
    /// child reporting `Synced=False` makes it false.
    pub fn synced_condition(&self) -> Condition {
        let now = Utc::now();
        if self.synced == ConditionStatus::False {
            Condition::sync_failed(reason::CHILDREN_SYNC_FAILED, now)
        } else {
            Condition::synced(now)
        }
    }
}
