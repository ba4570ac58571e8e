//! リソースキー
//!
//! (kind, namespace, name) の三つ組でリソースを識別します。

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// リソースの識別子
///
/// `namespace` が `None` の場合はクラスタスコープ（Composite など）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    /// クラスタスコープのキーを作成
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// namespace付きのキーを作成
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespace.is_some()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [kind, name] if !kind.is_empty() && !name.is_empty() => Ok(Self::new(*kind, *name)),
            [kind, ns, name] if !kind.is_empty() && !ns.is_empty() && !name.is_empty() => {
                Ok(Self::namespaced(*kind, *ns, *name))
            }
            _ => Err(CoreError::InvalidKey(s.to_string())),
        }
    }
}

/// watch / list 用のキープレフィックス
///
/// `kind` が `None` なら全種別、`namespace` が `None` なら全namespaceにマッチ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPrefix {
    pub kind: Option<String>,
    pub namespace: Option<String>,
}

impl KeyPrefix {
    /// すべてのキーにマッチ
    pub fn all() -> Self {
        Self::default()
    }

    /// 指定kindのキーにマッチ
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn matches(&self, key: &ResourceKey) -> bool {
        if let Some(kind) = &self.kind
            && kind != &key.kind
        {
            return false;
        }
        match &self.namespace {
            Some(ns) => key.namespace.as_deref() == Some(ns.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_roundtrip() {
        let cluster = ResourceKey::new("VPC", "orders-vpc");
        assert_eq!(cluster.to_string(), "VPC/orders-vpc");
        assert_eq!("VPC/orders-vpc".parse::<ResourceKey>().unwrap(), cluster);

        let ns = ResourceKey::namespaced("DatabaseClaim", "team-a", "orders");
        assert_eq!(ns.to_string(), "DatabaseClaim/team-a/orders");
        assert_eq!(
            "DatabaseClaim/team-a/orders".parse::<ResourceKey>().unwrap(),
            ns
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!("VPC".parse::<ResourceKey>().is_err());
        assert!("a/b/c/d".parse::<ResourceKey>().is_err());
        assert!("VPC/".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_prefix_matching() {
        let key = ResourceKey::namespaced("DatabaseClaim", "team-a", "orders");
        assert!(KeyPrefix::all().matches(&key));
        assert!(KeyPrefix::kind("DatabaseClaim").matches(&key));
        assert!(!KeyPrefix::kind("VPC").matches(&key));
        assert!(
            KeyPrefix::kind("DatabaseClaim")
                .in_namespace("team-a")
                .matches(&key)
        );
        assert!(
            !KeyPrefix::kind("DatabaseClaim")
                .in_namespace("team-b")
                .matches(&key)
        );
        assert!(!KeyPrefix::all().in_namespace("team-a").matches(&ResourceKey::new("VPC", "x")));
    }

    #[test]
    fn test_ordering_is_stable() {
        let mut keys = vec![
            ResourceKey::new("VPC", "b"),
            ResourceKey::new("RDSInstance", "a"),
            ResourceKey::new("VPC", "a"),
        ];
        keys.sort();
        assert_eq!(keys[0].kind, "RDSInstance");
        assert_eq!(keys[1].name, "a");
        assert_eq!(keys[2].name, "b");
    }
}
