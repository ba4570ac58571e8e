//! Dispatcher behavior: requeue decisions, deadlines and full runs of the
//! controller manager under paused time.

mod common;

use async_trait::async_trait;
use common::{Harness, database};
use driftwood_controller::{
    Controller, ControllerConfig, Decision, LeaseConfig, ReconcileError, Reconciler, Requeue,
    Result,
};
use driftwood_core::{ConditionStatus, KeyPrefix, READY, Resource, ResourceKey, SYNCED, reason};
use driftwood_provider::ProviderError;
use driftwood_provider_memory::{Fault, MemoryProvider, Operation};
use driftwood_store::ResourceStore;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Fails with a conflict on its first `conflicts` passes.
struct Conflicting {
    conflicts: usize,
    passes: AtomicUsize,
}

#[async_trait]
impl Reconciler for Conflicting {
    fn kind(&self) -> &str {
        "Widget"
    }

    async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue> {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst);
        if pass < self.conflicts {
            return Err(ReconcileError::Conflict(format!("{} changed underneath", key)));
        }
        Ok(Requeue::None)
    }
}

/// Never finishes within any sensible deadline.
struct Stuck;

#[async_trait]
impl Reconciler for Stuck {
    fn kind(&self) -> &str {
        "Widget"
    }

    async fn reconcile(&self, _key: &ResourceKey) -> Result<Requeue> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Requeue::None)
    }
}

/// Touches its resource on every pass, then fails transiently.
struct Restless {
    store: ResourceStore,
    passes: AtomicUsize,
}

#[async_trait]
impl Reconciler for Restless {
    fn kind(&self) -> &str {
        "Widget"
    }

    async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue> {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst);
        let resource = self.store.get(key).await?;
        self.store
            .update_metadata(key, resource.metadata.resource_version, move |meta| {
                meta.annotations
                    .insert("example.org/pass".to_string(), pass.to_string());
            })
            .await?;
        Err(ReconcileError::TransientProvider(ProviderError::Network(
            "connection reset".to_string(),
        )))
    }
}

fn widget() -> ResourceKey {
    ResourceKey::new("Widget", "w")
}

async fn store_with_widget() -> ResourceStore {
    let store = ResourceStore::new();
    store
        .create(Resource::new("v1", &widget(), json!({})))
        .await
        .unwrap();
    store
}

/// Poll until `key` reports `Ready=True`, giving up after a minute of
/// virtual time.
async fn wait_ready(store: &ResourceStore, key: &ResourceKey) -> bool {
    for _ in 0..600 {
        if let Some(r) = store.try_get(key).await
            && r.status.conditions.is_true(READY)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_conflict_retries_without_failure() {
    let store = store_with_widget().await;
    let reconciler = Arc::new(Conflicting {
        conflicts: 1,
        passes: AtomicUsize::new(0),
    });
    let controller = Controller::new(reconciler.clone(), store.clone(), common::config());

    assert_eq!(controller.process(&widget()).await, Decision::Retry);
    assert_eq!(controller.queue().len().await, 1);
    assert_eq!(controller.queue().failures(&widget()).await, 0);
    assert!(store.get(&widget()).await.unwrap().status.conditions.is_empty());

    assert_eq!(controller.process(&widget()).await, Decision::Done);
    assert_eq!(reconciler.passes.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pass_deadline_backs_off() {
    let store = store_with_widget().await;
    let config = ControllerConfig {
        pass_deadline: Duration::from_secs(5),
        ..common::config()
    };
    let controller = Controller::new(Arc::new(Stuck), store.clone(), config);

    assert_eq!(
        controller.process(&widget()).await,
        Decision::Backoff(Duration::from_millis(500))
    );
    let r = store.get(&widget()).await.unwrap();
    let synced = r.status.conditions.get(SYNCED).unwrap();
    assert_eq!(synced.status, ConditionStatus::False);
    assert_eq!(synced.reason, reason::RECONCILE_ERROR);
    assert!(synced.message.contains("deadline"));
}

#[tokio::test]
async fn test_requeue_after_is_delayed() {
    let h = Harness::new();
    h.store.create(common::vpc("net", "10.0.0.0/16")).await.unwrap();
    let controller = h.controller("VPC");
    let key = ResourceKey::new("VPC", "net");

    assert_eq!(controller.process(&key).await, Decision::RequeueAfter(common::POLL));
    assert_eq!(controller.queue().len().await, 0);
    assert_eq!(controller.queue().delayed_len().await, 1);

    assert_eq!(controller.process(&key).await, Decision::Done);
}

#[tokio::test]
async fn test_resync_enqueues_every_key_of_kind() {
    let h = Harness::new();
    for name in ["a", "b", "c"] {
        h.store.create(common::vpc(name, "10.0.0.0/16")).await.unwrap();
    }
    h.store
        .create(database("orders", json!({"size": "small"})))
        .await
        .unwrap();

    let controller = h.controller("VPC");
    assert_eq!(controller.resync().await, 3);
    assert_eq!(controller.queue().len().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_manager_drives_composite_to_ready() {
    let Harness {
        store,
        provider,
        manager,
    } = Harness::with_provider(MemoryProvider::new("sim").with_ready_after(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let key = ResourceKey::new("ApplicationDatabase", "orders");
    store
        .create(database("orders", json!({"size": "small"})))
        .await
        .unwrap();
    assert!(wait_ready(&store, &key).await);

    let composite = store.get(&key).await.unwrap();
    assert_eq!(
        composite.status.fields["endpoint"],
        "orders-rds.rdsinstance.memory.internal"
    );
    assert_eq!(provider.objects_created().await, 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_manager_handles_deletion() {
    let Harness {
        store,
        provider,
        manager,
    } = Harness::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let key = ResourceKey::new("ApplicationDatabase", "orders");
    store
        .create(database("orders", json!({"size": "small"})))
        .await
        .unwrap();
    assert!(wait_ready(&store, &key).await);

    store.delete(&key, None).await.unwrap();
    let mut gone = false;
    for _ in 0..600 {
        if store.list(&KeyPrefix::all()).await.is_empty() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(gone);
    assert!(provider.objects().await.is_empty());

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_leader_runs_controllers_and_releases_lease() {
    let config = ControllerConfig {
        lease: LeaseConfig {
            name: "test-lease".to_string(),
            duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(1),
            enabled: true,
        },
        ..common::config()
    };
    let Harness { store, manager, .. } = Harness::with_config(MemoryProvider::new("sim"), config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let key = ResourceKey::new("ApplicationDatabase", "orders");
    store
        .create(database("orders", json!({"size": "small"})))
        .await
        .unwrap();
    assert!(wait_ready(&store, &key).await);
    assert!(store.lease("test-lease").await.is_some());

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
    assert!(store.lease("test-lease").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_own_writes_do_not_defeat_backoff() {
    let store = store_with_widget().await;
    let reconciler = Arc::new(Restless {
        store: store.clone(),
        passes: AtomicUsize::new(0),
    });
    let controller = Controller::new(reconciler.clone(), store.clone(), common::config());
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(controller.run(stop_rx));

    // passes at 0s, 0.5s, 1.5s and 3.5s
    let passes = || reconciler.passes.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(passes(), 1);
    tokio::time::sleep(Duration::from_millis(750)).await;
    assert_eq!(passes(), 2);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(passes(), 3);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(passes(), 3);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(passes(), 4);

    stop_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_spec_change_of_own_kind_is_picked_up() {
    let Harness {
        store,
        provider,
        manager,
    } = Harness::with_provider(MemoryProvider::new("sim").with_ready_after(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let key = ResourceKey::new("VPC", "net");
    store.create(common::vpc("net", "10.0.0.0/16")).await.unwrap();
    assert!(wait_ready(&store, &key).await);
    assert_eq!(provider.calls().await.update, 0);

    store.apply(common::vpc("net", "10.9.0.0/16")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.calls().await.update, 1);
    let id = store.get(&key).await.unwrap().external_name().unwrap().to_string();
    assert_eq!(provider.object(&id).await.unwrap().spec["cidrBlock"], "10.9.0.0/16");

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_running_manager_backs_off_throttled_create() {
    let Harness {
        store,
        provider,
        manager,
    } = Harness::new();
    provider.inject(Operation::Create, Fault::Throttle, 2).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let key = ResourceKey::new("VPC", "net");
    store.create(common::vpc("net", "10.0.0.0/16")).await.unwrap();

    // create attempts at 0s, 0.5s and 1.5s
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(provider.calls().await.create, 1);
    let r = store.get(&key).await.unwrap();
    assert_eq!(r.status.conditions.status_of(SYNCED), ConditionStatus::False);

    tokio::time::sleep(Duration::from_millis(750)).await;
    assert_eq!(provider.calls().await.create, 2);
    assert_eq!(provider.objects_created().await, 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(provider.calls().await.create, 3);
    assert_eq!(provider.objects_created().await, 1);
    let r = store.get(&key).await.unwrap();
    assert!(r.status.conditions.is_true(SYNCED));

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_running_manager_keeps_terminal_cadence() {
    let Harness {
        store,
        provider,
        manager,
    } = Harness::new();
    provider
        .inject(
            Operation::Create,
            Fault::InvalidSpec("cidrBlock is malformed".to_string()),
            1000,
        )
        .await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let key = ResourceKey::new("VPC", "net");
    store.create(common::vpc("net", "10.0.0.0/16")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.calls().await.create, 1);
    let r = store.get(&key).await.unwrap();
    let synced = r.status.conditions.get(SYNCED).unwrap();
    assert_eq!(synced.status, ConditionStatus::False);
    assert_eq!(synced.reason, reason::INVALID_SPEC);

    tokio::time::sleep(common::TERMINAL_RETRY).await;
    assert_eq!(provider.calls().await.create, 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_running_manager_leaves_top_level_resource_alone() {
    let Harness {
        store,
        manager,
        ..
    } = Harness::new();
    let user_vpc = common::vpc("orders-vpc", "192.168.0.0/16");
    store.create(user_vpc).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { manager.run(shutdown_rx).await });

    let xr = ResourceKey::new("ApplicationDatabase", "orders");
    store
        .create(database("orders", json!({"size": "small"})))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let composite = store.get(&xr).await.unwrap();
    let synced = composite.status.conditions.get(SYNCED).unwrap();
    assert_eq!(synced.status, ConditionStatus::False);
    assert_eq!(synced.reason, reason::INVALID_SPEC);

    let vpc = store.get(&ResourceKey::new("VPC", "orders-vpc")).await.unwrap();
    assert_eq!(vpc.controller_owner(), None);
    assert_eq!(vpc.spec["forProvider"]["cidrBlock"], "192.168.0.0/16");

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}
