//! Composition定義
//!
//! 抽象リソース（Composite）を具体的な子リソース群に展開するテンプレート。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Composition - 1つのComposite kindを子リソース群へ写像するテンプレート
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    /// Composition名
    pub name: String,
    /// 対象のComposite kind
    pub composite_kind: String,
    /// compositionSelector でのマッチに使うラベル
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// 子リソースのテンプレート（宣言順が出力順）
    #[serde(default)]
    pub resources: Vec<ResourceTemplate>,
    /// 変換パイプライン（宣言順に実行）
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
}

impl Composition {
    pub fn resource(&self, name: &str) -> Option<&ResourceTemplate> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// ラベルセレクタにマッチするか（全キーが一致）
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|l| l == v))
    }
}

/// 子リソースのテンプレート
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// テンプレート名（子リソース名の導出に使用）
    pub name: String,
    /// 子リソースのkind
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// ベース値（spec の初期値）
    #[serde(default)]
    pub base: Value,
    /// パッチ（宣言順に適用）
    #[serde(default)]
    pub patches: Vec<Patch>,
}

/// パッチの適用ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchPolicy {
    /// ソースが存在しなければComposition失敗
    #[default]
    Required,
    /// ソースが存在しなければスキップ
    Optional,
}

/// パッチ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Patch {
    /// Compositeのフィールドを子へコピー
    FromComposite {
        from: String,
        to: String,
        #[serde(default)]
        transforms: Vec<Transform>,
        #[serde(default)]
        policy: PatchPolicy,
    },
    /// 文字列テンプレートを展開して子へ書き込む
    Interpolate {
        template: String,
        to: String,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    /// 子の観測ステータスをCompositeのstatusへ書き戻す
    ToComposite {
        from: String,
        to: String,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
}

impl Patch {
    pub fn transforms(&self) -> &[Transform] {
        match self {
            Patch::FromComposite { transforms, .. }
            | Patch::Interpolate { transforms, .. }
            | Patch::ToComposite { transforms, .. } => transforms,
        }
    }

    /// 子のspec構築時に適用されるパッチか
    pub fn applies_to_child(&self) -> bool {
        !matches!(self, Patch::ToComposite { .. })
    }
}

/// 文字列の大文字/小文字変換
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringCase {
    Upper,
    Lower,
}

/// 型変換のターゲット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertTarget {
    String,
    Integer,
    Float,
    Boolean,
}

/// 値の変換
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Transform {
    /// 列挙値マップ（small → db.t3.micro など）
    Map {
        pairs: BTreeMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// 数値変換: value * multiply + add をクランプ
    Math {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiply: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        add: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clamp_min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clamp_max: Option<f64>,
    },
    /// 文字列変換
    String {
        /// `{{ value }}` を含むteraテンプレート
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case: Option<StringCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trim_prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trim_suffix: Option<String>,
    },
    /// 型変換
    Convert { to: ConvertTarget },
}

/// パイプラインのステップ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// 関数名（FunctionRegistryのキー）
    pub function_ref: String,
    /// 関数への設定
    #[serde(default)]
    pub config: Value,
}
