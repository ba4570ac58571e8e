//! provider-config / managed-kind ノードのパース

use super::value::{first_string, prop_string};
use crate::error::{CoreError, Result};
use crate::model::{CredentialSource, ProviderConfig};
use kdl::KdlNode;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// provider-config ノードをパース
pub fn parse_provider_config(node: &KdlNode) -> Result<(String, ProviderConfig)> {
    let name = first_string(node)
        .ok_or_else(|| CoreError::InvalidConfig("provider-config requires a name".to_string()))?;

    let provider = prop_string(node, "provider").ok_or_else(|| {
        CoreError::InvalidConfig(format!("provider-config '{}' requires provider=", name))
    })?;

    let mut config = ProviderConfig {
        name: name.clone(),
        provider,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "credentials" => config.credentials = parse_credentials(&name, child)?,
                // 追加設定はsettingsに保存
                other => {
                    if let Some(value) = first_string(child) {
                        config.settings.insert(other.to_string(), value);
                    }
                }
            }
        }
    }

    Ok((name, config))
}

fn parse_credentials(config: &str, node: &KdlNode) -> Result<CredentialSource> {
    let source = prop_string(node, "source").unwrap_or_else(|| "inline".to_string());

    match source.as_str() {
        "none" => Ok(CredentialSource::None),
        "inline" => {
            let mut values = BTreeMap::new();
            if let Some(children) = node.children() {
                for child in children.nodes() {
                    if let Some(value) = first_string(child) {
                        values.insert(child.name().value().to_string(), value);
                    }
                }
            }
            Ok(CredentialSource::Inline { values })
        }
        "env" => {
            // credentials source="env" "AWS_ACCESS_KEY_ID" "AWS_SECRET_ACCESS_KEY"
            // または子ノード var "NAME"
            let mut variables: Vec<String> = node
                .entries()
                .iter()
                .filter(|e| e.name().is_none())
                .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
                .collect();
            if let Some(children) = node.children() {
                for child in children.nodes() {
                    if child.name().value() == "var"
                        && let Some(var) = first_string(child)
                    {
                        variables.push(var);
                    }
                }
            }
            Ok(CredentialSource::Env { variables })
        }
        "file" => {
            let path = prop_string(node, "path").ok_or_else(|| {
                CoreError::InvalidConfig(format!(
                    "provider-config '{}': file credentials require path=",
                    config
                ))
            })?;
            Ok(CredentialSource::File {
                path: PathBuf::from(path),
            })
        }
        other => Err(CoreError::InvalidConfig(format!(
            "provider-config '{}': unknown credential source '{}'",
            config, other
        ))),
    }
}

/// managed-kind "RDSInstance" provider="sim"
pub fn parse_managed_kind(node: &KdlNode) -> Result<(String, String)> {
    let kind = first_string(node)
        .ok_or_else(|| CoreError::InvalidConfig("managed-kind requires a kind".to_string()))?;
    let provider = prop_string(node, "provider").ok_or_else(|| {
        CoreError::InvalidConfig(format!("managed-kind '{}' requires provider=", kind))
    })?;
    Ok((kind, provider))
}
