//! Desired-State Generator
//!
//! Pure construction of every object the engine manages. All names derive
//! from the owning cluster's name, so repeated reconciliations address the
//! same objects.

use crate::config::StorageSettings;
use crate::crd::{
    CertificateConfig, HarborCluster, InClusterSpec, MinIOInstance, MinIOInstanceSpec, Zone,
};
use crate::domain::ports::{BucketEndpoint, ObjectKey};
use crate::error::{Error, Result};
use crate::storage::kind::ExternalBackend;
use k8s_openapi::api::core::v1::{
    EnvVar, HTTPGetAction, LocalObjectReference, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    Probe, ResourceRequirements, Secret, Service, ServicePort, ServiceSpec,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;

// =============================================================================
// Naming
// =============================================================================

pub const EXTERNAL_SECRET_SUFFIX: &str = "harbor-cluster-storage";
pub const CREDS_SECRET_SUFFIX: &str = "minio-creds-secret";
pub const SERVICE_SUFFIX: &str = "minio-service";
pub const ZONE_SUFFIX: &str = "zone-harbor";

/// Credential secret keys
pub const ACCESS_KEY: &str = "accesskey";
pub const SECRET_KEY: &str = "secretkey";

const MINIO_PORT: i32 = 9000;
const MOUNT_PATH: &str = "/export";
const DEFAULT_STORAGE_CLASS: &str = "default";
const DEFAULT_VOLUME_SIZE: &str = "10Gi";
const DEFAULT_CPU: &str = "250m";
const DEFAULT_MEMORY: &str = "512Mi";

/// Labels carried by every generated object and used as the service selector
pub fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("type".to_string(), "harbor-cluster-minio".to_string()),
        ("app".to_string(), "minio".to_string()),
    ])
}

// =============================================================================
// Cluster Identity
// =============================================================================

/// Name, namespace and owner reference of the cluster resource
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterIdentity {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
}

impl ClusterIdentity {
    /// Extract the identity; the cluster must have a name, namespace and uid
    pub fn from_cluster(cluster: &HarborCluster) -> Result<Self> {
        let namespace = cluster.namespace().ok_or_else(|| {
            Error::InvalidClusterIdentity(format!("cluster {} has no namespace", cluster.name_any()))
        })?;
        let owner = cluster.controller_owner_ref(&()).ok_or_else(|| {
            Error::InvalidClusterIdentity(format!(
                "cluster {}/{} has no name or uid",
                namespace,
                cluster.name_any()
            ))
        })?;

        Ok(Self {
            name: cluster.name_any(),
            namespace,
            owner,
        })
    }

    fn child_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Access/secret key pair of the in-cluster store
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        Self {
            access_key: random_string(20),
            secret_key: random_string(40),
        }
    }

    /// Read the key pair from the credential secret
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        Ok(Self {
            access_key: secret_value(secret, ACCESS_KEY)?,
            secret_key: secret_value(secret, SECRET_KEY)?,
        })
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn secret_value(secret: &Secret, key: &str) -> Result<String> {
    let missing = || Error::MissingCredentials {
        secret: secret.name_any(),
        key: key.to_string(),
    };
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(missing)?;
    let value = String::from_utf8(bytes.0.clone()).map_err(|_| missing())?;
    if value.is_empty() {
        return Err(missing());
    }
    Ok(value)
}

// =============================================================================
// Desired State
// =============================================================================

/// Builds the desired objects for one cluster
pub struct DesiredState<'a> {
    identity: &'a ClusterIdentity,
    settings: &'a StorageSettings,
}

impl<'a> DesiredState<'a> {
    pub fn new(identity: &'a ClusterIdentity, settings: &'a StorageSettings) -> Self {
        Self { identity, settings }
    }

    pub fn external_secret_key(&self) -> ObjectKey {
        self.key(self.identity.child_name(EXTERNAL_SECRET_SUFFIX))
    }

    pub fn creds_secret_key(&self) -> ObjectKey {
        self.key(self.identity.child_name(CREDS_SECRET_SUFFIX))
    }

    pub fn service_key(&self) -> ObjectKey {
        self.key(self.identity.child_name(SERVICE_SUFFIX))
    }

    /// The workload resource and the StatefulSet behind it share this name
    pub fn minio_key(&self) -> ObjectKey {
        self.key(self.identity.name.clone())
    }

    fn key(&self, name: String) -> ObjectKey {
        ObjectKey::new(self.identity.namespace.clone(), name)
    }

    /// Image the in-cluster store should run
    pub fn image(&self, version: &str) -> String {
        format!("{}:{}", self.settings.minio_image, version)
    }

    /// Connection details of the in-cluster store
    pub fn endpoint(&self, credentials: &Credentials) -> BucketEndpoint {
        BucketEndpoint {
            url: format!(
                "http://{}.{}:{}",
                self.service_key().name,
                self.identity.namespace,
                self.settings.service_port
            ),
            access_key: credentials.access_key.clone(),
            secret_key: credentials.secret_key.clone(),
            region: self.settings.region.clone(),
        }
    }

    fn object_meta(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.identity.namespace.clone()),
            labels: Some(labels()),
            owner_references: Some(vec![self.identity.owner.clone()]),
            ..Default::default()
        }
    }

    fn opaque_secret(&self, name: String, data: BTreeMap<String, String>) -> Secret {
        Secret {
            metadata: self.object_meta(name),
            type_: Some("Opaque".to_string()),
            data: Some(
                data.into_iter()
                    .map(|(k, v)| (k, ByteString(v.into_bytes())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    // =========================================================================
    // External path
    // =========================================================================

    /// The single secret describing an external provider
    pub fn external_secret(&self, backend: &ExternalBackend) -> Secret {
        self.opaque_secret(
            self.external_secret_key().name,
            backend.source().secret_data(),
        )
    }

    // =========================================================================
    // In-cluster path
    // =========================================================================

    pub fn creds_secret(&self, credentials: &Credentials) -> Secret {
        self.opaque_secret(
            self.creds_secret_key().name,
            BTreeMap::from([
                (ACCESS_KEY.to_string(), credentials.access_key.clone()),
                (SECRET_KEY.to_string(), credentials.secret_key.clone()),
            ]),
        )
    }

    pub fn service(&self) -> Service {
        Service {
            metadata: self.object_meta(self.service_key().name),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(labels()),
                ports: Some(vec![ServicePort {
                    port: self.settings.service_port,
                    target_port: Some(IntOrString::Int(MINIO_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn minio_instance(&self, spec: &InClusterSpec) -> MinIOInstance {
        let mut instance = MinIOInstance::new(
            &self.identity.name,
            MinIOInstanceSpec {
                selector: Some(LabelSelector {
                    match_labels: Some(labels()),
                    ..Default::default()
                }),
                metadata: Some(ObjectMeta {
                    labels: Some(labels()),
                    ..Default::default()
                }),
                image: self.image(&spec.version),
                zones: vec![Zone {
                    name: self.identity.child_name(ZONE_SUFFIX),
                    servers: spec.replicas,
                }],
                volumes_per_server: 1,
                mount_path: MOUNT_PATH.to_string(),
                volume_claim_template: Some(
                    spec.volume_claim_template
                        .clone()
                        .unwrap_or_else(default_volume_claim),
                ),
                creds_secret: Some(LocalObjectReference {
                    name: Some(self.creds_secret_key().name),
                }),
                pod_management_policy: Some("Parallel".to_string()),
                request_auto_cert: false,
                cert_config: Some(CertificateConfig::default()),
                env: vec![EnvVar {
                    name: "MINIO_BROWSER".to_string(),
                    value: Some("on".to_string()),
                    ..Default::default()
                }],
                resources: spec
                    .resources
                    .clone()
                    .filter(|r| *r != ResourceRequirements::default())
                    .unwrap_or_else(default_resources),
                liveness: Some(health_probe("/minio/health/live")),
                readiness: Some(health_probe("/minio/health/ready")),
            },
        );
        instance.metadata = self.object_meta(self.identity.name.clone());
        instance
    }
}

fn default_resources() -> ResourceRequirements {
    let amounts = BTreeMap::from([
        ("cpu".to_string(), Quantity(DEFAULT_CPU.to_string())),
        ("memory".to_string(), Quantity(DEFAULT_MEMORY.to_string())),
    ]);
    ResourceRequirements {
        limits: Some(amounts.clone()),
        requests: Some(amounts),
        ..Default::default()
    }
}

fn default_volume_claim() -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: Some(DEFAULT_STORAGE_CLASS.to_string()),
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(DEFAULT_VOLUME_SIZE.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn health_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(MINIO_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(120),
        period_seconds: Some(60),
        ..Default::default()
    }
}
