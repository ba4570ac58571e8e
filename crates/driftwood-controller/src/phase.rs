//! Lifecycle phase, derived on every pass and never stored

use driftwood_core::{READY, Resource, SYNCED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No observed status yet
    Initializing,
    /// Desired spec not yet applied, or drift detected
    Syncing,
    /// Applied and healthy
    SyncedReady,
    /// Deletion requested, finalizers pending
    Terminating,
    /// Gone from the store
    Deleted,
}

impl Phase {
    pub fn of(resource: Option<&Resource>) -> Phase {
        let Some(resource) = resource else {
            return Phase::Deleted;
        };
        if resource.is_terminating() {
            return Phase::Terminating;
        }
        let status = &resource.status;
        if status.conditions.is_empty() && status.observed_generation.is_none() {
            return Phase::Initializing;
        }
        if resource.is_generation_observed()
            && status.conditions.is_true(SYNCED)
            && status.conditions.is_true(READY)
        {
            Phase::SyncedReady
        } else {
            Phase::Syncing
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Initializing => write!(f, "Initializing"),
            Phase::Syncing => write!(f, "Syncing"),
            Phase::SyncedReady => write!(f, "Synced&Ready"),
            Phase::Terminating => write!(f, "Terminating"),
            Phase::Deleted => write!(f, "Deleted"),
        }
    }
}
