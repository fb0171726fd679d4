//! In-Memory Cluster Client
//!
//! Keeps objects in ordered maps and records every create and update, so
//! tests can assert on side effects. Reads, creates and updates can be made
//! to fail per object kind.

use crate::crd::MinIOInstance;
use crate::domain::ports::{ClusterClient, ObjectKey};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

const SECRET: &str = "Secret";
const SERVICE: &str = "Service";
const MINIO_INSTANCE: &str = "MinIOInstance";
const STATEFUL_SET: &str = "StatefulSet";

#[derive(Clone, Copy)]
enum Op {
    Get,
    Create,
    Update,
}

#[derive(Default)]
struct Failures {
    gets: BTreeSet<String>,
    creates: BTreeSet<String>,
    updates: BTreeSet<String>,
}

/// [`ClusterClient`] over in-process maps
#[derive(Default)]
pub struct InMemoryClusterClient {
    secrets: RwLock<BTreeMap<ObjectKey, Secret>>,
    services: RwLock<BTreeMap<ObjectKey, Service>>,
    instances: RwLock<BTreeMap<ObjectKey, MinIOInstance>>,
    stateful_sets: RwLock<BTreeMap<ObjectKey, StatefulSet>>,
    failures: RwLock<Failures>,
    created: RwLock<Vec<String>>,
    updated: RwLock<Vec<String>>,
    resource_version: RwLock<u64>,
}

impl InMemoryClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Make every read of `kind` fail with a server error
    pub fn fail_gets(&self, kind: &str) {
        self.failures.write().gets.insert(kind.to_string());
    }

    /// Make every create of `kind` fail with a server error
    pub fn fail_creates(&self, kind: &str) {
        self.failures.write().creates.insert(kind.to_string());
    }

    /// Make every update of `kind` fail with a server error
    pub fn fail_updates(&self, kind: &str) {
        self.failures.write().updates.insert(kind.to_string());
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        *self.failures.write() = Failures::default();
    }

    fn check(&self, op: Op, kind: &str) -> Result<()> {
        let failures = self.failures.read();
        let failing = match op {
            Op::Get => &failures.gets,
            Op::Create => &failures.creates,
            Op::Update => &failures.updates,
        };
        if failing.contains(kind) {
            return Err(Error::Kube(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: format!("injected failure for {}", kind),
                reason: "InternalError".to_string(),
                code: 500,
            })));
        }
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Objects created so far, as `Kind/namespace/name`, in order
    pub fn created(&self) -> Vec<String> {
        self.created.read().clone()
    }

    /// Objects updated so far, as `Kind/namespace/name`, in order
    pub fn updated(&self) -> Vec<String> {
        self.updated.read().clone()
    }

    pub fn secret(&self, key: &ObjectKey) -> Option<Secret> {
        self.secrets.read().get(key).cloned()
    }

    pub fn service(&self, key: &ObjectKey) -> Option<Service> {
        self.services.read().get(key).cloned()
    }

    pub fn minio_instance(&self, key: &ObjectKey) -> Option<MinIOInstance> {
        self.instances.read().get(key).cloned()
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Store a secret directly, bypassing the create log
    pub fn insert_secret(&self, secret: Secret) {
        let key = key_of(&secret);
        self.secrets.write().insert(key, secret);
    }

    /// Act as the MinIO operator: report `ready` replicas for the StatefulSet
    /// behind the workload resource `key`
    pub fn set_ready_replicas(&self, key: &ObjectKey, ready: i32) {
        let mut stateful_sets = self.stateful_sets.write();
        let sts = stateful_sets.entry(key.clone()).or_insert_with(|| StatefulSet {
            metadata: ObjectMeta {
                name: Some(key.name.clone()),
                namespace: Some(key.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        });
        let status = sts.status.get_or_insert_with(StatefulSetStatus::default);
        status.replicas = ready;
        status.ready_replicas = Some(ready);
    }

    // =========================================================================
    // Shared Operations
    // =========================================================================

    fn next_version(&self) -> String {
        let mut version = self.resource_version.write();
        *version += 1;
        version.to_string()
    }

    fn insert_new<K: Resource + Clone>(
        &self,
        store: &RwLock<BTreeMap<ObjectKey, K>>,
        kind: &str,
        object: &K,
    ) -> Result<()> {
        self.check(Op::Create, kind)?;
        let key = key_of(object);

        let mut objects = store.write();
        if objects.contains_key(&key) {
            return Err(Error::ResourceExists {
                kind: kind.to_string(),
                name: key.to_string(),
            });
        }

        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key.clone(), stored);
        self.created.write().push(format!("{}/{}", kind, key));
        Ok(())
    }

    fn replace_existing<K: Resource + Clone>(
        &self,
        store: &RwLock<BTreeMap<ObjectKey, K>>,
        kind: &str,
        object: &K,
    ) -> Result<()> {
        self.check(Op::Update, kind)?;
        let key = key_of(object);

        let mut objects = store.write();
        if !objects.contains_key(&key) {
            return Err(Error::ResourceNotFound {
                kind: kind.to_string(),
                name: key.to_string(),
            });
        }

        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key.clone(), stored);
        self.updated.write().push(format!("{}/{}", kind, key));
        Ok(())
    }

    fn lookup<K: Clone>(
        &self,
        store: &RwLock<BTreeMap<ObjectKey, K>>,
        kind: &str,
        key: &ObjectKey,
    ) -> Result<Option<K>> {
        self.check(Op::Get, kind)?;
        Ok(store.read().get(key).cloned())
    }
}

fn key_of<K: Resource>(object: &K) -> ObjectKey {
    ObjectKey::new(object.namespace().unwrap_or_default(), object.name_any())
}

#[async_trait]
impl ClusterClient for InMemoryClusterClient {
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>> {
        self.lookup(&self.secrets, SECRET, key)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        self.insert_new(&self.secrets, SECRET, secret)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<()> {
        self.replace_existing(&self.secrets, SECRET, secret)
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        self.insert_new(&self.services, SERVICE, service)
    }

    async fn get_minio_instance(&self, key: &ObjectKey) -> Result<Option<MinIOInstance>> {
        self.lookup(&self.instances, MINIO_INSTANCE, key)
    }

    async fn create_minio_instance(&self, instance: &MinIOInstance) -> Result<()> {
        self.insert_new(&self.instances, MINIO_INSTANCE, instance)
    }

    async fn update_minio_instance(&self, instance: &MinIOInstance) -> Result<()> {
        self.replace_existing(&self.instances, MINIO_INSTANCE, instance)
    }

    async fn get_stateful_set(&self, key: &ObjectKey) -> Result<Option<StatefulSet>> {
        self.lookup(&self.stateful_sets, STATEFUL_SET, key)
    }
}
