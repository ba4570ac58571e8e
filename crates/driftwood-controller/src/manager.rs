//! Controller manager
//!
//! Builds one controller per kind from the provider registry and the
//! catalog, and runs them while this replica holds the leader lease.

use crate::dispatcher::{Controller, stopped};
use crate::error::Result;
use crate::leader::LeaderElector;
use crate::reconciler::{
    ClaimReconciler, CompositeReconciler, Context, ManagedReconciler, Reconciler, Requeue,
};
use driftwood_core::{KeyPrefix, ResourceKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Resolve once leadership is gone or its sender goes away.
async fn lost(leading: &mut watch::Receiver<bool>) {
    while *leading.borrow_and_update() {
        if leading.changed().await.is_err() {
            return;
        }
    }
}

fn is_shut_down(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

pub struct ControllerManager {
    ctx: Arc<Context>,
    reconcilers: BTreeMap<String, Arc<dyn Reconciler>>,
}

impl ControllerManager {
    pub fn new(ctx: Context) -> Self {
        let ctx = Arc::new(ctx);
        let mut reconcilers: BTreeMap<String, Arc<dyn Reconciler>> = BTreeMap::new();

        for kind in ctx.providers.managed_kinds() {
            reconcilers.insert(
                kind.to_string(),
                Arc::new(ManagedReconciler::new(kind, Arc::clone(&ctx))),
            );
        }
        for definition in ctx.catalog.definitions.values() {
            let composite = definition.composite_kind.clone();
            reconcilers.insert(
                composite.clone(),
                Arc::new(CompositeReconciler::new(composite.clone(), Arc::clone(&ctx))),
            );
            if let Some(claim) = &definition.claim_kind {
                reconcilers.insert(
                    claim.clone(),
                    Arc::new(ClaimReconciler::new(claim.clone(), composite, Arc::clone(&ctx))),
                );
            }
        }

        Self { ctx, reconcilers }
    }

    /// Register a reconciler for a kind not covered by the catalog.
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconcilers
            .insert(reconciler.kind().to_string(), reconciler);
        self
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.reconcilers.keys().map(String::as_str)
    }

    pub fn reconciler_for(&self, kind: &str) -> Option<Arc<dyn Reconciler>> {
        self.reconcilers.get(kind).cloned()
    }

    /// Run a single pass for `key` outside the dispatcher.
    pub async fn reconcile(&self, key: &ResourceKey) -> Option<Result<Requeue>> {
        let reconciler = self.reconcilers.get(&key.kind)?;
        Some(reconciler.reconcile(key).await)
    }

    /// One controller per kind, sharing the store.
    pub fn controllers(&self) -> Vec<Controller> {
        self.reconcilers
            .values()
            .map(|r| Controller::new(Arc::clone(r), self.ctx.store.clone(), self.ctx.config.clone()))
            .collect()
    }

    async fn run_controllers(&self, stop: watch::Receiver<bool>) {
        let handles: Vec<_> = self
            .controllers()
            .into_iter()
            .map(|controller| tokio::spawn(controller.run(stop.clone())))
            .collect();
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Controller panicked");
            }
        }
    }

    /// Standby replicas keep the store warm without reconciling.
    async fn warm_up(&self) {
        let resources = self.ctx.store.list(&KeyPrefix::all()).await;
        debug!(count = resources.len(), "Standby cache warm-up");
    }

    /// Run until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let lease = self.ctx.config.lease.clone();
        info!(kinds = self.reconcilers.len(), leader_election = lease.enabled, "Starting controller manager");

        if !lease.enabled {
            self.run_controllers(shutdown.clone()).await;
            stopped(&mut shutdown).await;
            info!("Controller manager stopped");
            return;
        }

        let elector = LeaderElector::new(self.ctx.store.clone(), lease.clone());
        let identity = elector.identity().to_string();
        let (leading_tx, mut leading) = watch::channel(false);
        let election = tokio::spawn(elector.run(leading_tx, shutdown.clone()));

        loop {
            // standby until elected
            while !*leading.borrow_and_update() {
                self.warm_up().await;
                tokio::select! {
                    _ = stopped(&mut shutdown) => break,
                    changed = leading.changed() => if changed.is_err() { break },
                }
            }
            if is_shut_down(&shutdown) || !*leading.borrow() {
                break;
            }

            info!(%identity, "Leading, starting controllers");
            let (stop_tx, stop_rx) = watch::channel(false);
            let running = self.run_controllers(stop_rx);
            tokio::pin!(running);
            let mut finished = false;
            tokio::select! {
                _ = &mut running => finished = true,
                _ = stopped(&mut shutdown) => {}
                _ = lost(&mut leading) => {}
            }
            if finished {
                // no kinds to run; hold the lease until something changes
                tokio::select! {
                    _ = stopped(&mut shutdown) => {}
                    _ = lost(&mut leading) => {}
                }
            }
            stop_tx.send_replace(true);
            if !finished {
                running.await;
            }

            if is_shut_down(&shutdown) {
                break;
            }
            info!(%identity, "Leadership lost, controllers stopped");
        }

        if let Err(e) = election.await {
            error!(error = %e, "Leader election task panicked");
        }
        info!("Controller manager stopped");
    }
}
