//! Domain Ports - Core trait definitions for the storage operator
//!
//! These traits define the boundaries between the reconciliation engine and
//! external systems: the cluster API and the in-cluster object store.
//! Adapters implement these traits to provide concrete functionality.

use crate::crd::MinIOInstance;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Secret, Service};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Object Identity
// =============================================================================

/// Namespaced name of a cluster object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Cluster Client Port
// =============================================================================

/// Port for reading and writing cluster objects.
///
/// `get_*` operations return `Ok(None)` when the object does not exist so
/// that absence stays distinct from a failed read. `create_*` operations
/// return [`crate::Error::ResourceExists`] on a name conflict.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a secret
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>>;

    /// Create a secret
    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    /// Replace an existing secret
    async fn update_secret(&self, secret: &Secret) -> Result<()>;

    /// Create a service
    async fn create_service(&self, service: &Service) -> Result<()>;

    /// Get a MinIO workload resource
    async fn get_minio_instance(&self, key: &ObjectKey) -> Result<Option<MinIOInstance>>;

    /// Create a MinIO workload resource
    async fn create_minio_instance(&self, instance: &MinIOInstance) -> Result<()>;

    /// Replace an existing MinIO workload resource
    async fn update_minio_instance(&self, instance: &MinIOInstance) -> Result<()>;

    /// Get the StatefulSet the MinIO operator runs for an instance
    async fn get_stateful_set(&self, key: &ObjectKey) -> Result<Option<StatefulSet>>;
}

// =============================================================================
// Object Store Port
// =============================================================================

/// Connection details for an S3-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEndpoint {
    /// Base URL, e.g. http://demo-minio-service.registry:9000
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Port for bucket operations against an object store
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create a bucket
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
}

/// Opens [`BucketStore`] connections
pub trait BucketStoreFactory: Send + Sync {
    /// Connect to an endpoint with the given credentials
    fn connect(&self, endpoint: &BucketEndpoint) -> Result<BucketStoreRef>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClusterClientRef = Arc<dyn ClusterClient>;
pub type BucketStoreRef = Arc<dyn BucketStore>;
pub type BucketStoreFactoryRef = Arc<dyn BucketStoreFactory>;
