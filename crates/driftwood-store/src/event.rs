//! Change notifications emitted by the store

use driftwood_core::{KeyPrefix, ResourceKey};

/// Identity of a stored object at the time of a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: ResourceKey,
    pub resource_version: u64,
    pub generation: u64,
    /// Deletion has been requested and finalizers are pending.
    pub terminating: bool,
    /// Controlling owner, so owner controllers can react to child changes.
    pub owner: Option<ResourceKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(ObjectRef),
    Modified(ObjectRef),
    Deleted(ObjectRef),
    /// The subscriber fell behind and missed this many events; relist.
    Lagged(u64),
}

impl WatchEvent {
    pub fn object(&self) -> Option<&ObjectRef> {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => Some(o),
            WatchEvent::Lagged(_) => None,
        }
    }

    pub fn key(&self) -> Option<&ResourceKey> {
        self.object().map(|o| &o.key)
    }

    /// Whether a watcher on `prefix` should see this event.
    ///
    /// `Lagged` is delivered to every watcher.
    pub fn matches(&self, prefix: &KeyPrefix) -> bool {
        match self.object() {
            Some(object) => {
                prefix.matches(&object.key)
                    || object.owner.as_ref().is_some_and(|o| prefix.matches(o))
            }
            None => true,
        }
    }
}
