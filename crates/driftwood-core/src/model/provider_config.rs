//! ProviderConfig
//!
//! Managed Resource から名前で参照される認証情報・接続設定の束。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 認証情報の取得元
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CredentialSource {
    /// 認証情報なし
    #[default]
    None,
    /// カタログに直接記述された値
    Inline { values: BTreeMap<String, String> },
    /// 環境変数（呼び出しごとに読み直す）
    Env { variables: Vec<String> },
    /// `KEY=VALUE` 形式のファイル
    File { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    /// 使用するプロバイダー名（ProviderRegistry のキー）
    pub provider: String,
    #[serde(default)]
    pub credentials: CredentialSource,
    /// プロバイダー固有の設定
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}
