#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn demos() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
}

fn driftwoodd() -> Command {
    Command::cargo_bin("driftwoodd").unwrap()
}

/// CLIヘルプにサブコマンドが並ぶことを確認
#[test]
fn test_cli_help() {
    driftwoodd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("compose"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_cli_version() {
    driftwoodd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("driftwoodd"));
}

/// runのヘルプにチューニング用フラグが出ることを確認
#[test]
fn test_run_help() {
    driftwoodd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--catalog"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--resync"))
        .stdout(predicate::str::contains("--state"));
}

#[test]
fn test_validate_demo() {
    driftwoodd()
        .arg("validate")
        .arg("--catalog")
        .arg(demos().join("catalog.kdl"))
        .arg("--manifests")
        .arg(demos().join("manifests"))
        .assert()
        .success()
        .stdout(predicate::str::contains("aws-database"))
        .stdout(predicate::str::contains("ApplicationDatabase/orders"))
        .stdout(predicate::str::contains("DatabaseClaim/team-a/billing"));
}

/// スキーマ違反のマニフェストは終了コード1
#[test]
fn test_validate_rejects_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("broken.yaml");
    std::fs::write(
        &manifest,
        "apiVersion: example.org/v1\nkind: ApplicationDatabase\nmetadata:\n  name: broken\nspec:\n  region: us-west-2\n",
    )
    .unwrap();

    driftwoodd()
        .arg("validate")
        .arg("--catalog")
        .arg(demos().join("catalog.kdl"))
        .arg("--manifests")
        .arg(&manifest)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("size"));
}

#[test]
fn test_validate_rejects_missing_catalog() {
    driftwoodd()
        .args(["validate", "--catalog", "does-not-exist.kdl"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("カタログエラー"));
}

/// composeは子リソースをYAMLで出力し、保留中の子は出さない
#[test]
fn test_compose_demo() {
    driftwoodd()
        .arg("compose")
        .arg("--catalog")
        .arg(demos().join("catalog.kdl"))
        .arg("--manifest")
        .arg(demos().join("manifests/20-databases.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("name: orders-rds"))
        .stdout(predicate::str::contains("dbInstanceClass: db.t3.micro"))
        .stdout(predicate::str::contains("identifier: orders-db"))
        .stdout(predicate::str::contains("name: inventory-vpc"))
        .stdout(predicate::str::contains("name: inventory-rds").not())
        .stderr(predicate::str::contains("sequenced-database"));
}
