use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("YAMLパースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("無効なマニフェスト: {0}")]
    InvalidManifest(String),

    #[error("無効なリソースキー: {0}")]
    InvalidKey(String),

    #[error("無効なフィールドパス '{path}': {message}")]
    InvalidFieldPath { path: String, message: String },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error("スキーマ違反 ({kind}.{field}): {message}")]
    SchemaViolation {
        kind: String,
        field: String,
        message: String,
    },

    #[error("定義 '{name}' は互換性のない変更です: {message}")]
    IncompatibleDefinition { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
