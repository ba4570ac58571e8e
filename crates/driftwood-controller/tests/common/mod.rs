//! Shared harness for controller integration tests
#![allow(dead_code)]

use driftwood_controller::{
    Context, Controller, ControllerConfig, ControllerManager, LeaseConfig, RateLimitConfig,
    Requeue, Result,
};
use driftwood_core::{Condition, KeyPrefix, Resource, ResourceKey, parse_catalog_str};
use driftwood_provider::{BackoffConfig, ProviderRegistry};
use driftwood_provider_memory::MemoryProvider;
use driftwood_store::ResourceStore;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const CATALOG: &str = r##"
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
    labels provider="aws"
    resource "rds" kind="RDSInstance" {
        base {
            providerConfigRef { name "default"; }
            forProvider { engine "postgres"; }
        }
        patch from="spec.size" to="spec.forProvider.dbInstanceClass" {
            map small="db.t3.micro" medium="db.t3.medium" large="db.r5.large"
        }
        patch from="spec.region" to="spec.forProvider.region"
        interpolate "{{ name }}-db" to="spec.forProvider.identifier"
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
    }
}

composition "sequenced-database" {
    composite-kind "ApplicationDatabase"
    labels provider="aws" ordering="sequenced"
    resource "vpc" kind="VPC" {
        base {
            providerConfigRef { name "default"; }
            forProvider { cidrBlock "10.1.0.0/16"; }
        }
        patch from="spec.region" to="spec.forProvider.region"
    }
    resource "rds" kind="RDSInstance" {
        base {
            providerConfigRef { name "default"; }
            forProvider { engine "postgres"; }
        }
        patch from="spec.size" to="spec.forProvider.dbInstanceClass" {
            map small="db.t3.micro" medium="db.t3.medium" large="db.r5.large"
        }
        patch from="spec.region" to="spec.forProvider.region"
    }
    pipeline {
        step "sequence" { order "vpc" "rds"; }
    }
}

provider-config "default" provider="sim" {
    credentials source="inline" {
        token "dev"
    }
}

managed-kind "RDSInstance" provider="sim"
managed-kind "VPC" provider="sim"
"##;

pub const POLL: Duration = Duration::from_secs(1);
pub const TERMINAL_RETRY: Duration = Duration::from_secs(300);

pub fn config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        resync_interval: Duration::from_secs(600),
        pass_deadline: Duration::from_secs(30),
        terminal_retry_interval: TERMINAL_RETRY,
        poll_interval: POLL,
        conflict_retries: 5,
        backoff: BackoffConfig {
            base_delay_ms: 500,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter: 0.0,
        },
        rate_limit: RateLimitConfig { qps: 0.0, burst: 1 },
        credential_ttl: Duration::from_secs(60),
        lease: LeaseConfig {
            enabled: false,
            ..LeaseConfig::default()
        },
    }
}

pub struct Harness {
    pub store: ResourceStore,
    pub provider: Arc<MemoryProvider>,
    pub manager: ControllerManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(MemoryProvider::new("sim"))
    }

    pub fn with_provider(provider: MemoryProvider) -> Self {
        Self::with_config(provider, config())
    }

    pub fn with_config(provider: MemoryProvider, config: ControllerConfig) -> Self {
        let catalog = parse_catalog_str(CATALOG).unwrap();
        let provider = Arc::new(provider);
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        registry.bind_catalog(&catalog).unwrap();

        let store = ResourceStore::new();
        let ctx = Context::new(store.clone(), registry, catalog, config);
        Self {
            store,
            provider,
            manager: ControllerManager::new(ctx),
        }
    }

    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue> {
        self.manager
            .reconcile(key)
            .await
            .expect("no reconciler for kind")
    }

    pub fn controller(&self, kind: &str) -> Controller {
        self.manager
            .controllers()
            .into_iter()
            .find(|c| c.kind() == kind)
            .expect("no controller for kind")
    }

    /// Reconcile every stored key, in key order, `rounds` times. Errors are
    /// dropped; the next round runs the pass again.
    pub async fn settle(&self, rounds: usize) {
        for _ in 0..rounds {
            for key in self.store.keys(&KeyPrefix::all()).await {
                if self.manager.reconciler_for(&key.kind).is_some() {
                    let _ = self.reconcile(&key).await;
                }
            }
        }
    }

    pub async fn get(&self, key: &ResourceKey) -> Resource {
        self.store.get(key).await.unwrap()
    }

    pub async fn exists(&self, key: &ResourceKey) -> bool {
        self.store.try_get(key).await.is_some()
    }
}

pub fn vpc(name: &str, cidr: &str) -> Resource {
    Resource::new(
        "sim.driftwood.io/v1",
        &ResourceKey::new("VPC", name),
        json!({
            "providerConfigRef": {"name": "default"},
            "forProvider": {"cidrBlock": cidr, "region": "us-east-1"},
        }),
    )
}

pub fn database(name: &str, spec: Value) -> Resource {
    Resource::new(
        "example.org/v1",
        &ResourceKey::new("ApplicationDatabase", name),
        spec,
    )
}

pub fn condition<'a>(resource: &'a Resource, type_: &str) -> &'a Condition {
    resource
        .status
        .conditions
        .get(type_)
        .unwrap_or_else(|| panic!("{} has no {} condition", resource.key(), type_))
}
