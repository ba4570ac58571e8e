//! Claim scenarios: the namespaced claim drives a cluster-scoped composite

mod common;

use common::{Harness, condition, database};
use driftwood_core::{KeyPrefix, READY, Resource, ResourceKey, SYNCED, annotations, reason};
use serde_json::json;

fn claim(namespace: &str, name: &str, spec: serde_json::Value) -> Resource {
    Resource::new(
        "example.org/v1",
        &ResourceKey::namespaced("DatabaseClaim", namespace, name),
        spec,
    )
}

fn claim_key() -> ResourceKey {
    ResourceKey::namespaced("DatabaseClaim", "team-a", "orders")
}

fn xr_key() -> ResourceKey {
    ResourceKey::new("ApplicationDatabase", "team-a-orders")
}

#[tokio::test]
async fn test_claim_provisions_composite() {
    let h = Harness::new();
    h.store
        .create(claim("team-a", "orders", json!({"size": "small"})).with_label("app", "orders"))
        .await
        .unwrap();

    h.reconcile(&claim_key()).await.unwrap();
    let composite = h.get(&xr_key()).await;
    assert_eq!(composite.controller_owner(), Some(claim_key()));
    assert_eq!(composite.annotation(annotations::CLAIM), Some("team-a/orders"));
    assert_eq!(composite.metadata.labels["app"], "orders");
    assert_eq!(composite.spec, json!({"size": "small"}));

    let c = h.get(&claim_key()).await;
    assert_eq!(condition(&c, READY).reason, reason::WAITING_FOR_CHILDREN);
    assert_eq!(
        c.status.fields["resourceRef"],
        json!({"kind": "ApplicationDatabase", "name": "team-a-orders"})
    );

    h.settle(5).await;
    let c = h.get(&claim_key()).await;
    assert_eq!(condition(&c, READY).reason, reason::AVAILABLE);
    assert!(condition(&c, SYNCED).status.is_true());
    assert_eq!(
        c.status.fields["endpoint"],
        "team-a-orders-rds.rdsinstance.memory.internal"
    );
    assert!(h.exists(&ResourceKey::new("RDSInstance", "team-a-orders-rds")).await);
}

#[tokio::test]
async fn test_claim_without_namespace_uses_default() {
    let h = Harness::new();
    let c = Resource::new(
        "example.org/v1",
        &ResourceKey::new("DatabaseClaim", "orders"),
        json!({"size": "small"}),
    );
    h.store.create(c).await.unwrap();

    h.reconcile(&ResourceKey::new("DatabaseClaim", "orders"))
        .await
        .unwrap();
    let composite = h
        .get(&ResourceKey::new("ApplicationDatabase", "default-orders"))
        .await;
    assert_eq!(composite.annotation(annotations::CLAIM), Some("default/orders"));
}

#[tokio::test]
async fn test_claim_spec_change_reaches_children() {
    let h = Harness::new();
    h.store
        .create(claim("team-a", "orders", json!({"size": "small"})))
        .await
        .unwrap();
    h.settle(5).await;

    let mut c = h.get(&claim_key()).await;
    c.spec = json!({"size": "medium"});
    let version = c.metadata.resource_version;
    h.store.put(c, Some(version)).await.unwrap();
    h.settle(3).await;

    assert_eq!(h.get(&xr_key()).await.spec, json!({"size": "medium"}));
    let db = h
        .get(&ResourceKey::new("RDSInstance", "team-a-orders-rds"))
        .await;
    assert_eq!(db.spec["forProvider"]["dbInstanceClass"], "db.t3.medium");
}

#[tokio::test]
async fn test_claim_refuses_foreign_composite() {
    let h = Harness::new();
    h.store
        .create(database("team-a-orders", json!({"size": "large"})))
        .await
        .unwrap();
    h.store
        .create(claim("team-a", "orders", json!({"size": "small"})))
        .await
        .unwrap();

    let err = h.reconcile(&claim_key()).await.unwrap_err();
    assert_eq!(err.reason(), reason::INVALID_SPEC);
    let composite = h.get(&xr_key()).await;
    assert!(composite.controller_owner().is_none());
    assert_eq!(composite.spec, json!({"size": "large"}));
}

#[tokio::test]
async fn test_claim_delete_tears_everything_down() {
    let h = Harness::new();
    h.store
        .create(claim("team-a", "orders", json!({"size": "small"})))
        .await
        .unwrap();
    h.settle(5).await;
    assert_eq!(h.provider.objects().await.len(), 2);

    h.store.delete(&claim_key(), None).await.unwrap();
    h.settle(1).await;
    let c = h.get(&claim_key()).await;
    assert_eq!(condition(&c, READY).reason, reason::DELETING);
    assert!(h.get(&xr_key()).await.is_terminating());

    h.settle(3).await;
    assert!(h.store.list(&KeyPrefix::all()).await.is_empty());
    assert!(h.provider.objects().await.is_empty());
}
