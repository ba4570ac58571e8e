//! In-memory provider implementation

use crate::fault::{Fault, FaultPlan, Operation};
use async_trait::async_trait;
use driftwood_core::FieldPath;
use driftwood_provider::{
    AuthStatus, CallContext, DiffPolicy, ExternalObject, Observation, ProviderClient,
    ProviderError, Result,
};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Fields the simulated cloud fills in on its own
const GENERATED_FIELDS: [&str; 4] = ["id", "arn", "endpoint", "state"];

/// Number of calls per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub observe: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

/// An object living in the simulated cloud
#[derive(Debug, Clone, PartialEq)]
pub struct CloudObject {
    pub id: String,
    pub kind: String,
    pub name: String,
    /// Idempotency tag supplied at creation
    pub tag: String,
    pub spec: Value,
    /// Observations since creation, drives readiness
    pub observations: u32,
}

impl CloudObject {
    fn state(&self) -> Value {
        let mut state = match &self.spec {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        state.insert("id".to_string(), json!(self.id));
        state.insert(
            "arn".to_string(),
            json!(format!("arn:memory:{}:{}", self.kind.to_lowercase(), self.id)),
        );
        state.insert(
            "endpoint".to_string(),
            json!(format!("{}.{}.memory.internal", self.name, self.kind.to_lowercase())),
        );
        Value::Object(state)
    }
}

#[derive(Debug, Default)]
struct CloudState {
    objects: BTreeMap<String, CloudObject>,
    next_id: u64,
    faults: FaultPlan,
    calls: CallCounts,
    objects_created: usize,
}

impl CloudState {
    fn find_by_tag(&self, tag: &str) -> Option<&CloudObject> {
        self.objects.values().find(|o| o.tag == tag)
    }
}

/// Simulated cloud provider
///
/// Keeps external objects in memory and behaves like a real API in the
/// ways reconcilers care about: objects take time to become ready, the
/// cloud adds fields of its own, and calls can be scripted to fail.
pub struct MemoryProvider {
    name: String,
    ready_after: u32,
    latency: Duration,
    required_fields: HashMap<String, Vec<String>>,
    ignored_fields: HashMap<String, Vec<FieldPath>>,
    required_credential: Option<String>,
    state: Mutex<CloudState>,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready_after: 0,
            latency: Duration::ZERO,
            required_fields: HashMap::new(),
            ignored_fields: HashMap::new(),
            required_credential: None,
            state: Mutex::new(CloudState::default()),
        }
    }

    /// Objects report ready only after `observations` observe calls.
    pub fn with_ready_after(mut self, observations: u32) -> Self {
        self.ready_after = observations;
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Creating `kind` without `field` fails as an invalid spec.
    pub fn with_required_field(mut self, kind: impl Into<String>, field: impl Into<String>) -> Self {
        self.required_fields
            .entry(kind.into())
            .or_default()
            .push(field.into());
        self
    }

    /// The cloud rewrites `path` on `kind` objects, so drift there is ignored.
    pub fn with_ignored_field(mut self, kind: impl Into<String>, path: FieldPath) -> Self {
        self.ignored_fields.entry(kind.into()).or_default().push(path);
        self
    }

    /// Calls fail authentication unless the credentials carry `key`.
    pub fn with_required_credential(mut self, key: impl Into<String>) -> Self {
        self.required_credential = Some(key.into());
        self
    }

    async fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().await
    }

    /// Queue `fault` for the next `times` calls of `operation`.
    pub async fn inject(&self, operation: Operation, fault: Fault, times: usize) {
        self.lock().await.faults.push(operation, fault, times);
    }

    pub async fn pending_faults(&self, operation: Operation) -> usize {
        self.lock().await.faults.pending(operation)
    }

    pub async fn calls(&self) -> CallCounts {
        self.lock().await.calls
    }

    /// Number of objects ever created, including ones deleted since
    pub async fn objects_created(&self) -> usize {
        self.lock().await.objects_created
    }

    pub async fn objects(&self) -> Vec<CloudObject> {
        self.lock().await.objects.values().cloned().collect()
    }

    pub async fn objects_of_kind(&self, kind: &str) -> Vec<CloudObject> {
        self.lock().await
            .objects
            .values()
            .filter(|o| o.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn object(&self, id: &str) -> Option<CloudObject> {
        self.lock().await.objects.get(id).cloned()
    }

    pub async fn find_by_tag(&self, tag: &str) -> Option<CloudObject> {
        self.lock().await.find_by_tag(tag).cloned()
    }

    /// Change an object behind the control plane's back.
    pub async fn tamper(&self, id: &str, path: &FieldPath, value: Value) -> bool {
        let mut state = self.lock().await;
        match state.objects.get_mut(id) {
            Some(object) => path.set(&mut object.spec, value).is_ok(),
            None => false,
        }
    }

    /// Delete an object behind the control plane's back.
    pub async fn remove_out_of_band(&self, id: &str) -> Option<CloudObject> {
        self.lock().await.objects.remove(id)
    }

    async fn enter(&self, ctx: &CallContext, operation: Operation) -> Result<Option<Fault>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        ctx.check_deadline()?;
        if let Some(key) = &self.required_credential {
            ctx.credentials.require(key)?;
        }

        let mut state = self.lock().await;
        match operation {
            Operation::Observe => state.calls.observe += 1,
            Operation::Create => state.calls.create += 1,
            Operation::Update => state.calls.update += 1,
            Operation::Delete => state.calls.delete += 1,
        }
        match state.faults.next(operation) {
            Some(fault) if fault.applies_effect() => Ok(Some(fault)),
            Some(fault) => {
                debug!(provider = %self.name, %operation, ?fault, "Injected fault");
                Err(fault.error(operation))
            }
            None => Ok(None),
        }
    }

    fn validate(&self, kind: &str, desired: &Value) -> Result<()> {
        let Some(required) = self.required_fields.get(kind) else {
            return Ok(());
        };
        for field in required {
            if desired.get(field).is_none_or(Value::is_null) {
                return Err(ProviderError::InvalidSpec(format!(
                    "{} requires '{}'",
                    kind, field
                )));
            }
        }
        Ok(())
    }
}

fn strip_generated(desired: &Value) -> Value {
    let mut spec = desired.clone();
    if let Some(map) = spec.as_object_mut() {
        for field in GENERATED_FIELDS {
            map.remove(field);
        }
    }
    spec
}

#[async_trait]
impl ProviderClient for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_auth(&self, ctx: &CallContext) -> Result<AuthStatus> {
        match &self.required_credential {
            Some(key) if ctx.credentials.get(key).is_none() => {
                Ok(AuthStatus::failed(format!("missing credential '{}'", key)))
            }
            _ => Ok(AuthStatus::ok(format!("memory/{}", self.name))),
        }
    }

    async fn observe(
        &self,
        ctx: &CallContext,
        external_id: Option<&str>,
        _desired: &Value,
    ) -> Result<Observation> {
        if let Some(fault) = self.enter(ctx, Operation::Observe).await? {
            return Err(fault.error(Operation::Observe));
        }

        let mut state = self.lock().await;
        let id = match external_id {
            Some(id) => Some(id.to_string()),
            None => state
                .find_by_tag(&ctx.idempotency_tag())
                .map(|o| o.id.clone()),
        };
        let Some(id) = id else {
            return Ok(Observation::Absent);
        };
        let Some(object) = state.objects.get_mut(&id) else {
            return Ok(Observation::Absent);
        };

        object.observations = object.observations.saturating_add(1);
        let ready = object.observations > self.ready_after;
        let mut observed = object.state();
        if let Some(map) = observed.as_object_mut() {
            let phase = if ready { "available" } else { "creating" };
            map.insert("state".to_string(), json!(phase));
        }

        Ok(Observation::Exists(ExternalObject {
            external_id: object.id.clone(),
            state: observed,
            ready,
        }))
    }

    async fn create(&self, ctx: &CallContext, desired: &Value) -> Result<String> {
        let fault = self.enter(ctx, Operation::Create).await?;
        self.validate(&ctx.resource.kind, desired)?;

        let tag = ctx.idempotency_tag();
        let mut state = self.lock().await;
        if let Some(existing) = state.find_by_tag(&tag) {
            return Err(ProviderError::Api {
                class: driftwood_provider::ErrorClass::Terminal,
                message: format!("object tagged {} already exists as {}", tag, existing.id),
            });
        }

        state.next_id += 1;
        let id = format!("{}-{:04}", ctx.resource.kind.to_lowercase(), state.next_id);
        state.objects.insert(
            id.clone(),
            CloudObject {
                id: id.clone(),
                kind: ctx.resource.kind.clone(),
                name: ctx.resource.name.clone(),
                tag,
                spec: strip_generated(desired),
                observations: 0,
            },
        );
        state.objects_created += 1;
        info!(provider = %self.name, resource = %ctx.resource, external_id = %id, "Created external object");

        match fault {
            Some(fault) => Err(fault.error(Operation::Create)),
            None => Ok(id),
        }
    }

    async fn update(&self, ctx: &CallContext, external_id: &str, desired: &Value) -> Result<()> {
        let fault = self.enter(ctx, Operation::Update).await?;
        self.validate(&ctx.resource.kind, desired)?;

        let mut state = self.lock().await;
        let object = state
            .objects
            .get_mut(external_id)
            .ok_or_else(|| ProviderError::NotFound(external_id.to_string()))?;

        let incoming = strip_generated(desired);
        match (object.spec.as_object_mut(), incoming) {
            (Some(current), Value::Object(fields)) => {
                for (name, value) in fields {
                    current.insert(name, value);
                }
            }
            (_, other) => object.spec = other,
        }
        info!(provider = %self.name, resource = %ctx.resource, external_id, "Updated external object");

        match fault {
            Some(fault) => Err(fault.error(Operation::Update)),
            None => Ok(()),
        }
    }

    async fn delete(&self, ctx: &CallContext, external_id: &str) -> Result<()> {
        let fault = self.enter(ctx, Operation::Delete).await?;

        match self.lock().await.objects.remove(external_id) {
            Some(_) => {
                info!(provider = %self.name, resource = %ctx.resource, external_id, "Deleted external object")
            }
            None => debug!(provider = %self.name, external_id, "Delete of absent object"),
        }

        match fault {
            Some(fault) => Err(fault.error(Operation::Delete)),
            None => Ok(()),
        }
    }

    fn diff_policy(&self, kind: &str) -> DiffPolicy {
        self.ignored_fields
            .get(kind)
            .into_iter()
            .flatten()
            .fold(DiffPolicy::new(), |policy, path| policy.ignore(path.clone()))
    }
}
