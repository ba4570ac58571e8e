//! 宣言的オブジェクト
//!
//! ストア境界のワイヤーフォーマット（apiVersion / kind / metadata / spec / status）。

use super::condition::Conditions;
use super::key::ResourceKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// コントローラーが使用する既知のアノテーション
pub mod annotations {
    /// Managed Resourceが所有する外部オブジェクトのID
    pub const EXTERNAL_NAME: &str = "driftwood.io/external-name";
    /// 外部作成呼び出しの直前に書き込まれるマーカー
    pub const EXTERNAL_CREATE_PENDING: &str = "driftwood.io/external-create-pending";
    /// 外部作成が成功した時刻
    pub const EXTERNAL_CREATE_SUCCEEDED: &str = "driftwood.io/external-create-succeeded";
    /// Compositeに固定されたComposition名
    pub const COMPOSITION: &str = "driftwood.io/composition";
    /// XRを要求したClaim (namespace/name)
    pub const CLAIM: &str = "driftwood.io/claim";
    /// Compositeの子リソースを生成したテンプレート名
    pub const COMPOSITION_RESOURCE: &str = "driftwood.io/composition-resource";
}

/// 全コントローラー共通のファイナライザ
pub const FINALIZER: &str = "driftwood.io/finalizer";

/// オーナー参照
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub controller: bool,
}

impl OwnerReference {
    /// コントローラーとしてのオーナー参照を作成
    pub fn controller_of(owner: &ResourceKey) -> Self {
        Self {
            kind: owner.kind.clone(),
            namespace: owner.namespace.clone(),
            name: owner.name.clone(),
            controller: true,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// オブジェクトメタデータ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// spec変更時のみ増加
    #[serde(default)]
    pub generation: u64,
    /// 任意の書き込みで増加（楽観ロック用）
    #[serde(default)]
    pub resource_version: u64,
    /// 削除要求済み（Terminating）
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deletion_requested: bool,
}

/// オブジェクトの観測ステータス
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<u64>,
    /// プロバイダーから報告された外部オブジェクトの状態
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub observed: Value,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
    /// to-composite パッチなどで書き込まれる任意フィールド
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// ストアで管理されるリソース
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl Resource {
    pub fn new(api_version: impl Into<String>, key: &ResourceKey, spec: Value) -> Self {
        Self {
            api_version: api_version.into(),
            kind: key.kind.clone(),
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                ..Default::default()
            },
            spec,
            status: ResourceStatus::default(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.kind.clone(),
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: &ResourceKey) -> Self {
        self.metadata
            .owner_references
            .push(OwnerReference::controller_of(owner));
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    pub fn external_name(&self) -> Option<&str> {
        self.annotation(annotations::EXTERNAL_NAME)
    }

    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_requested
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == finalizer)
    }

    /// ファイナライザを追加（追加した場合 true）
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.metadata.finalizers.push(finalizer.to_string());
        true
    }

    /// ファイナライザを削除（削除した場合 true）
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != finalizer);
        before != self.metadata.finalizers.len()
    }

    /// controller=true のオーナー
    pub fn controller_owner(&self) -> Option<ResourceKey> {
        self.metadata
            .owner_references
            .iter()
            .find(|r| r.controller)
            .map(OwnerReference::key)
    }

    /// 最後に反映済みの generation と現在の generation が一致しているか
    pub fn is_generation_observed(&self) -> bool {
        self.status.observed_generation == Some(self.metadata.generation)
    }
}
