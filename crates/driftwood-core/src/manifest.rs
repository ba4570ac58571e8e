//! マニフェスト読み込み
//!
//! YAMLの宣言的オブジェクト（複数ドキュメント可）を読み込みます。
//! ディレクトリ指定時は `.yaml` / `.yml` をファイル名順に読み込みます。

use crate::error::{CoreError, Result};
use crate::model::Resource;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// YAML文字列からリソースを読み込む
pub fn parse_manifests_str(content: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        // 空ドキュメント（`---` のみ）はスキップ
        if value.is_null() {
            continue;
        }
        let resource: Resource = serde_yaml::from_value(value)?;
        validate_manifest(&resource)?;
        resources.push(resource);
    }
    Ok(resources)
}

/// ファイルまたはディレクトリからリソースを読み込む
pub fn load_manifests<P: AsRef<Path>>(path: P) -> Result<Vec<Resource>> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        manifest_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut resources = Vec::new();
    for file in files {
        let content = fs::read_to_string(&file).map_err(|e| CoreError::IoError {
            path: file.clone(),
            message: e.to_string(),
        })?;
        let loaded = parse_manifests_str(&content).map_err(|e| {
            CoreError::InvalidManifest(format!("{}: {}", file.display(), e))
        })?;
        debug!(file = %file.display(), count = loaded.len(), "Loaded manifests");
        resources.extend(loaded);
    }
    Ok(resources)
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    files.sort();
    Ok(files)
}

/// 利用者が書き込めるのは apiVersion / kind / metadata.{name,namespace,labels,annotations} / spec のみ
fn validate_manifest(resource: &Resource) -> Result<()> {
    if resource.api_version.is_empty() {
        return Err(CoreError::InvalidManifest("apiVersion is required".to_string()));
    }
    if resource.kind.is_empty() {
        return Err(CoreError::InvalidManifest("kind is required".to_string()));
    }
    if resource.metadata.name.is_empty() {
        return Err(CoreError::InvalidManifest(format!(
            "{}: metadata.name is required",
            resource.kind
        )));
    }
    if resource.metadata.name.contains('/')
        || resource
            .metadata
            .namespace
            .as_deref()
            .is_some_and(|ns| ns.is_empty() || ns.contains('/'))
    {
        return Err(CoreError::InvalidManifest(format!(
            "{}: name and namespace must be non-empty and must not contain '/'",
            resource.key()
        )));
    }
    if !resource.metadata.owner_references.is_empty() || !resource.metadata.finalizers.is_empty() {
        return Err(CoreError::InvalidManifest(format!(
            "{}: ownerReferences and finalizers are controller-managed",
            resource.key()
        )));
    }
    Ok(())
}
