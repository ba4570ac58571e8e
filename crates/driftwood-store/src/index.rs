//! Ownership adjacency index

use driftwood_core::ResourceKey;
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of ownership edges from any resource to its root
/// (Claim → XR → MR).
pub const MAX_OWNERSHIP_DEPTH: usize = 2;

/// Reverse lookup for controller owner references.
#[derive(Debug, Default, Clone)]
pub struct OwnerIndex {
    owner_of: BTreeMap<ResourceKey, ResourceKey>,
    owned_by: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
}

impl OwnerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or clear) the controlling owner of `child`.
    pub fn set_owner(&mut self, child: &ResourceKey, owner: Option<&ResourceKey>) {
        self.remove(child);
        if let Some(owner) = owner {
            self.owner_of.insert(child.clone(), owner.clone());
            self.owned_by
                .entry(owner.clone())
                .or_default()
                .insert(child.clone());
        }
    }

    /// Drop `child`'s owner edge. Edges where `child` is the owner are kept.
    pub fn remove(&mut self, child: &ResourceKey) {
        if let Some(owner) = self.owner_of.remove(child)
            && let Some(children) = self.owned_by.get_mut(&owner)
        {
            children.remove(child);
            if children.is_empty() {
                self.owned_by.remove(&owner);
            }
        }
    }

    pub fn owner_of(&self, child: &ResourceKey) -> Option<&ResourceKey> {
        self.owner_of.get(child)
    }

    pub fn owned_by(&self, owner: &ResourceKey) -> Vec<ResourceKey> {
        self.owned_by
            .get(owner)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ancestors of `key`, nearest first.
    pub fn ancestors(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        let mut chain = Vec::new();
        let mut current = key;
        while let Some(owner) = self.owner_of.get(current) {
            // The index never holds a cycle, the bound is a guard for corrupt snapshots.
            if chain.contains(owner) || chain.len() > MAX_OWNERSHIP_DEPTH {
                break;
            }
            chain.push(owner.clone());
            current = owner;
        }
        chain
    }

    /// Number of edges on the longest path below `key`.
    pub fn height(&self, key: &ResourceKey) -> usize {
        fn walk(index: &OwnerIndex, key: &ResourceKey, depth: usize) -> usize {
            if depth > MAX_OWNERSHIP_DEPTH {
                return depth;
            }
            index
                .owned_by
                .get(key)
                .map(|children| {
                    children
                        .iter()
                        .map(|c| walk(index, c, depth + 1))
                        .max()
                        .unwrap_or(depth)
                })
                .unwrap_or(depth)
        }
        walk(self, key, 0)
    }

    /// Check that making `owner` the controller of `child` keeps the graph
    /// acyclic and within the depth limit.
    pub fn check_edge(&self, child: &ResourceKey, owner: &ResourceKey) -> Result<(), String> {
        if child == owner {
            return Err("a resource cannot own itself".to_string());
        }
        let ancestors = self.ancestors(owner);
        if ancestors.contains(child) {
            return Err(format!("{} is already an ancestor of {}", child, owner));
        }
        let depth = ancestors.len() + 1 + self.height(child);
        if depth > MAX_OWNERSHIP_DEPTH {
            return Err(format!(
                "ownership chain would be {} levels deep (max {})",
                depth, MAX_OWNERSHIP_DEPTH
            ));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.owner_of.clear();
        self.owned_by.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: &str, name: &str) -> ResourceKey {
        ResourceKey::new(kind, name)
    }

    #[test]
    fn test_set_and_lookup() {
        let mut index = OwnerIndex::new();
        let xr = key("ApplicationDatabase", "orders");
        let rds = key("RDSInstance", "orders-rds");
        let vpc = key("VPC", "orders-vpc");

        index.set_owner(&rds, Some(&xr));
        index.set_owner(&vpc, Some(&xr));

        assert_eq!(index.owner_of(&rds), Some(&xr));
        assert_eq!(index.owned_by(&xr), vec![rds.clone(), vpc.clone()]);

        index.remove(&rds);
        assert_eq!(index.owned_by(&xr), vec![vpc]);
        assert_eq!(index.owner_of(&rds), None);
    }

    #[test]
    fn test_reassign_owner() {
        let mut index = OwnerIndex::new();
        let a = key("X", "a");
        let b = key("X", "b");
        let child = key("VPC", "c");

        index.set_owner(&child, Some(&a));
        index.set_owner(&child, Some(&b));
        assert!(index.owned_by(&a).is_empty());
        assert_eq!(index.owned_by(&b), vec![child]);
    }

    #[test]
    fn test_depth_limit() {
        let mut index = OwnerIndex::new();
        let claim = ResourceKey::namespaced("DatabaseClaim", "team-a", "orders");
        let xr = key("ApplicationDatabase", "team-a-orders");
        let mr = key("RDSInstance", "team-a-orders-rds");
        let extra = key("Subnet", "deep");

        assert!(index.check_edge(&xr, &claim).is_ok());
        index.set_owner(&xr, Some(&claim));
        assert!(index.check_edge(&mr, &xr).is_ok());
        index.set_owner(&mr, Some(&xr));

        // third level below the claim
        assert!(index.check_edge(&extra, &mr).is_err());
    }

    #[test]
    fn test_height_counts_existing_children() {
        let mut index = OwnerIndex::new();
        let xr = key("ApplicationDatabase", "orders");
        let mr = key("RDSInstance", "orders-rds");
        index.set_owner(&mr, Some(&xr));

        let claim = ResourceKey::namespaced("DatabaseClaim", "ns", "orders");
        let top = key("Platform", "top");
        index.set_owner(&claim, Some(&top));

        // top → claim → xr → mr would be three edges
        assert!(index.check_edge(&xr, &claim).is_err());
    }

    #[test]
    fn test_cycles_rejected() {
        let mut index = OwnerIndex::new();
        let a = key("X", "a");
        let b = key("X", "b");
        index.set_owner(&b, Some(&a));

        assert!(index.check_edge(&a, &b).is_err());
        assert!(index.check_edge(&a, &a).is_err());
    }
}
