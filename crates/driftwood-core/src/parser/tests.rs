use super::*;
use crate::model::{
    ConvertTarget, CredentialSource, FieldType, Patch, PatchPolicy, StringCase, Transform,
};
use serde_json::json;

const CATALOG: &str = r##"
definition "applicationdatabases.example.org" {
    group "example.org"
    composite-kind "ApplicationDatabase"
    claim-kind "DatabaseClaim"
    field "size" type="string" required=#true
    field "region" type="string" default="us-east-1"
    field "storageGb" type="integer"
    default-composition "aws-database"
}

composition "aws-database" {
    composite-kind "ApplicationDatabase"
    labels provider="aws" tier="gold"
    resource "rds" kind="RDSInstance" {
        base {
            providerConfigRef { name "default"; }
            forProvider {
                engine "postgres"
                multiAz #false
            }
        }
        patch from="spec.size" to="spec.forProvider.dbInstanceClass" {
            map small="db.t3.micro" medium="db.t3.medium" large="db.r5.large"
        }
        patch from="spec.region" to="spec.forProvider.region"
        interpolate "{{ name }}-db" to="spec.forProvider.identifier"
        patch from="spec.storageGb" to="spec.forProvider.allocatedStorage" optional=#true {
            math multiply=1 add=20 clamp-max=1000
        }
        to-composite from="status.observed.endpoint" to="status.endpoint"
    }
    resource "vpc" kind="VPC" {
        base {
            providerConfigRef { name "default"; }
            forProvider { cidrBlock "10.0.0.0/16"; }
        }
        patch from="spec.region" to="spec.forProvider.region"
    }
    pipeline {
        step "add-labels" { team "platform"; }
        step "sequence" { order "vpc" "rds"; }
    }
}

provider-config "default" provider="sim" {
    credentials source="inline" {
        token "dev"
    }
    endpoint "http://localhost:4566"
}

managed-kind "RDSInstance" provider="sim"
managed-kind "VPC" provider="sim"
"##;

#[test]
fn test_parse_full_catalog() {
    let catalog = parse_catalog_str(CATALOG).unwrap();

    assert_eq!(catalog.definitions.len(), 1);
    assert_eq!(catalog.compositions.len(), 1);
    assert_eq!(catalog.provider_configs.len(), 1);
    assert_eq!(catalog.managed_kinds.len(), 2);
    assert!(catalog.validate().is_ok());
}

#[test]
fn test_parse_definition() {
    let catalog = parse_catalog_str(CATALOG).unwrap();
    let xrd = &catalog.definitions["applicationdatabases.example.org"];

    assert_eq!(xrd.group.as_deref(), Some("example.org"));
    assert_eq!(xrd.composite_kind, "ApplicationDatabase");
    assert_eq!(xrd.claim_kind.as_deref(), Some("DatabaseClaim"));
    assert_eq!(xrd.default_composition.as_deref(), Some("aws-database"));
    assert_eq!(xrd.fields.len(), 3);

    let size = xrd.field("size").unwrap();
    assert!(size.required);
    assert_eq!(size.field_type, FieldType::String);

    let region = xrd.field("region").unwrap();
    assert!(!region.required);
    assert_eq!(region.default, Some(json!("us-east-1")));

    assert_eq!(xrd.field("storageGb").unwrap().field_type, FieldType::Integer);
}

#[test]
fn test_parse_composition_resources_in_order() {
    let catalog = parse_catalog_str(CATALOG).unwrap();
    let composition = &catalog.compositions["aws-database"];

    assert_eq!(composition.composite_kind, "ApplicationDatabase");
    assert_eq!(composition.labels["provider"], "aws");
    assert_eq!(composition.labels["tier"], "gold");

    let names: Vec<&str> = composition
        .resources
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["rds", "vpc"]);
}

#[test]
fn test_parse_base_document() {
    let catalog = parse_catalog_str(CATALOG).unwrap();
    let rds = catalog.compositions["aws-database"].resource("rds").unwrap();

    assert_eq!(rds.kind, "RDSInstance");
    assert_eq!(
        rds.base,
        json!({
            "providerConfigRef": {"name": "default"},
            "forProvider": {"engine": "postgres", "multiAz": false}
        })
    );
}

#[test]
fn test_parse_patches() {
    let catalog = parse_catalog_str(CATALOG).unwrap();
    let rds = catalog.compositions["aws-database"].resource("rds").unwrap();
    assert_eq!(rds.patches.len(), 5);

    match &rds.patches[0] {
        Patch::FromComposite {
            from,
            to,
            transforms,
            policy,
        } => {
            assert_eq!(from, "spec.size");
            assert_eq!(to, "spec.forProvider.dbInstanceClass");
            assert_eq!(*policy, PatchPolicy::Required);
            match &transforms[0] {
                Transform::Map { pairs, default } => {
                    assert_eq!(pairs["small"], json!("db.t3.micro"));
                    assert_eq!(pairs.len(), 3);
                    assert!(default.is_none());
                }
                other => panic!("expected map transform, got {other:?}"),
            }
        }
        other => panic!("expected from-composite patch, got {other:?}"),
    }

    match &rds.patches[2] {
        Patch::Interpolate { template, to, .. } => {
            assert_eq!(template, "{{ name }}-db");
            assert_eq!(to, "spec.forProvider.identifier");
        }
        other => panic!("expected interpolate patch, got {other:?}"),
    }

    match &rds.patches[3] {
        Patch::FromComposite {
            policy, transforms, ..
        } => {
            assert_eq!(*policy, PatchPolicy::Optional);
            assert_eq!(
                transforms[0],
                Transform::Math {
                    multiply: Some(1.0),
                    add: Some(20.0),
                    clamp_min: None,
                    clamp_max: Some(1000.0),
                }
            );
        }
        other => panic!("expected optional patch, got {other:?}"),
    }

    assert!(matches!(&rds.patches[4], Patch::ToComposite { to, .. } if to == "status.endpoint"));
}

#[test]
fn test_parse_pipeline() {
    let catalog = parse_catalog_str(CATALOG).unwrap();
    let pipeline = &catalog.compositions["aws-database"].pipeline;

    assert_eq!(pipeline.len(), 2);
    assert_eq!(pipeline[0].function_ref, "add-labels");
    assert_eq!(pipeline[0].config, json!({"team": "platform"}));
    assert_eq!(pipeline[1].function_ref, "sequence");
    assert_eq!(pipeline[1].config, json!({"order": ["vpc", "rds"]}));
}

#[test]
fn test_parse_provider_config() {
    let catalog = parse_catalog_str(CATALOG).unwrap();
    let config = &catalog.provider_configs["default"];

    assert_eq!(config.provider, "sim");
    assert_eq!(config.settings["endpoint"], "http://localhost:4566");
    match &config.credentials {
        CredentialSource::Inline { values } => assert_eq!(values["token"], "dev"),
        other => panic!("expected inline credentials, got {other:?}"),
    }
    assert_eq!(catalog.managed_kinds["VPC"], "sim");
}

#[test]
fn test_parse_env_and_file_credentials() {
    let kdl = r##"
        provider-config "env" provider="sim" {
            credentials source="env" "SIM_TOKEN" {
                var "SIM_REGION"
            }
        }
        provider-config "file" provider="sim" {
            credentials source="file" path="/etc/driftwood/creds"
        }
    "##;
    let catalog = parse_catalog_str(kdl).unwrap();

    assert_eq!(
        catalog.provider_configs["env"].credentials,
        CredentialSource::Env {
            variables: vec!["SIM_TOKEN".to_string(), "SIM_REGION".to_string()]
        }
    );
    assert!(matches!(
        &catalog.provider_configs["file"].credentials,
        CredentialSource::File { path } if path.to_str() == Some("/etc/driftwood/creds")
    ));
}

#[test]
fn test_parse_string_and_convert_transforms() {
    let kdl = r##"
        definition "x" { composite-kind "X"; }
        composition "c" {
            composite-kind "X"
            resource "r" kind="Bucket" {
                patch from="spec.name" to="spec.forProvider.bucket" {
                    string format="{{ value }}-bucket" case="lower" trim-prefix="tmp-"
                }
                patch from="spec.replicas" to="spec.forProvider.replicas" {
                    convert to="integer"
                }
                patch from="spec.size" to="spec.forProvider.class" {
                    map small="s" default="m"
                }
            }
        }
    "##;
    let catalog = parse_catalog_str(kdl).unwrap();
    let resource = catalog.compositions["c"].resource("r").unwrap();

    assert_eq!(
        resource.patches[0].transforms()[0],
        Transform::String {
            format: Some("{{ value }}-bucket".to_string()),
            case: Some(StringCase::Lower),
            trim_prefix: Some("tmp-".to_string()),
            trim_suffix: None,
        }
    );
    assert_eq!(
        resource.patches[1].transforms()[0],
        Transform::Convert {
            to: ConvertTarget::Integer
        }
    );
    match &resource.patches[2].transforms()[0] {
        Transform::Map { pairs, default } => {
            assert_eq!(pairs.len(), 1);
            assert_eq!(default, &Some(json!("m")));
        }
        other => panic!("expected map transform, got {other:?}"),
    }
}

#[test]
fn test_missing_names_are_errors() {
    assert!(parse_catalog_str(r#"definition { composite-kind "X"; }"#).is_err());
    assert!(parse_catalog_str(r#"definition "x" {}"#).is_err());
    assert!(parse_catalog_str(r#"composition "c" {}"#).is_err());
    assert!(parse_catalog_str(r#"provider-config "p""#).is_err());
    assert!(
        parse_catalog_str(
            r#"composition "c" { composite-kind "X"; resource "r" { patch to="spec.a"; } }"#
        )
        .is_err()
    );
}

#[test]
fn test_unknown_transform_is_error() {
    let kdl = r#"
        composition "c" {
            composite-kind "X"
            resource "r" kind="Bucket" {
                patch from="spec.a" to="spec.b" { reverse; }
            }
        }
    "#;
    assert!(parse_catalog_str(kdl).is_err());
}

#[test]
fn test_duplicate_names_are_errors() {
    let kdl = r#"
        definition "x" { composite-kind "X"; }
        definition "x" { composite-kind "Y"; }
    "#;
    assert!(parse_catalog_str(kdl).is_err());
}

#[test]
fn test_unknown_top_level_nodes_are_skipped() {
    let catalog = parse_catalog_str(r#"notes "ignored""#).unwrap();
    assert!(catalog.definitions.is_empty());
}

#[test]
fn test_parse_catalog_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.kdl");
    std::fs::write(&path, CATALOG).unwrap();

    let catalog = parse_catalog_file(&path).unwrap();
    assert_eq!(catalog.compositions.len(), 1);

    assert!(parse_catalog_file(dir.path().join("missing.kdl")).is_err());
}
