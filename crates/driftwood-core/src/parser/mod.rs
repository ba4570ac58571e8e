//! KDLパーサー
//!
//! カタログ（XRD / Composition / ProviderConfig）のKDLファイルをパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod composition;
mod definition;
mod provider_config;
mod value;

use composition::parse_composition;
use definition::parse_definition;
use provider_config::{parse_managed_kind, parse_provider_config};

pub use value::{children_to_json, kdl_value_to_json};

use crate::error::{CoreError, Result};
use crate::model::Catalog;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;
use tracing::debug;

/// KDLファイルをパースしてCatalogを生成
pub fn parse_catalog_file<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_catalog_str(&content)
}

/// KDL文字列をパース
///
/// 同名の定義が複数ある場合はエラー。参照整合性は [`Catalog::validate`] で検証する。
pub fn parse_catalog_str(content: &str) -> Result<Catalog> {
    let doc: KdlDocument = content.parse()?;
    let mut catalog = Catalog::default();

    for node in doc.nodes() {
        match node.name().value() {
            "definition" => {
                let (name, definition) = parse_definition(node)?;
                if catalog.definitions.insert(name.clone(), definition).is_some() {
                    return Err(duplicate("definition", &name));
                }
            }
            "composition" => {
                let (name, composition) = parse_composition(node)?;
                if catalog.compositions.insert(name.clone(), composition).is_some() {
                    return Err(duplicate("composition", &name));
                }
            }
            "provider-config" | "provider_config" => {
                let (name, config) = parse_provider_config(node)?;
                if catalog.provider_configs.insert(name.clone(), config).is_some() {
                    return Err(duplicate("provider-config", &name));
                }
            }
            "managed-kind" | "managed_kind" => {
                let (kind, provider) = parse_managed_kind(node)?;
                catalog.managed_kinds.insert(kind, provider);
            }
            other => {
                // 不明なノードはスキップ
                debug!(node = other, "Skipping unknown catalog node");
            }
        }
    }

    Ok(catalog)
}

fn duplicate(node: &str, name: &str) -> CoreError {
    CoreError::InvalidConfig(format!("{} '{}' is declared more than once", node, name))
}

#[cfg(test)]
mod tests;
