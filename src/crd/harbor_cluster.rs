//! HarborCluster CRD
//!
//! The registry cluster resource. Only the storage section is owned by this
//! operator; it declares exactly one storage mode, either an in-cluster MinIO
//! deployment or one of the external providers.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// HarborCluster CRD
// =============================================================================

/// HarborCluster declares a managed registry cluster and its storage backend.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "goharbor.io",
    version = "v1",
    kind = "HarborCluster",
    plural = "harborclusters",
    shortname = "hc",
    status = "HarborClusterStatus",
    printcolumn = r#"{"name": "Storage", "type": "string", "jsonPath": ".spec.storage.kind"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HarborClusterSpec {
    /// Object storage backing the registry
    pub storage: StorageSpec,
}

// =============================================================================
// Storage Spec
// =============================================================================

/// Storage declaration. `kind` selects which of the provider bundles applies;
/// the others are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// One of: inCluster, s3, azure, gcs, swift, oss
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_cluster: Option<InClusterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Spec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oss: Option<OssSpec>,
}

/// In-cluster MinIO deployment settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InClusterSpec {
    /// Number of MinIO servers. 1 runs standalone, otherwise distributed.
    pub replicas: i32,

    /// MinIO release tag, e.g. RELEASE.2020-08-13T02-39-50Z
    pub version: String,

    /// Resource requirements for each server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Volume claim template for each server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<PersistentVolumeClaim>,
}

/// Amazon S3 (or S3-compatible) provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct S3Spec {
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region_endpoint: String,
    pub encrypt: bool,
    pub key_id: String,
    pub secure: bool,
    pub chunk_size: String,
    pub root_directory: String,
    pub storage_class: String,
    pub v4_auth: bool,
}

/// Azure Blob provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureSpec {
    pub account_name: String,
    pub account_key: String,
    pub container: String,
    pub realm: String,
}

/// Google Cloud Storage provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GcsSpec {
    pub bucket: String,
    /// Base64 encoded service account key
    pub encoded_key: String,
    pub root_directory: String,
    pub chunk_size: String,
}

/// OpenStack Swift provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SwiftSpec {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub container: String,
    pub region: String,
    pub tenant: String,
    pub tenant_id: String,
    pub domain: String,
    pub domain_id: String,
    pub trust_id: String,
    pub insecure_skip_verify: bool,
    pub prefix: String,
    pub secret_key: String,
    pub auth_version: String,
    pub endpoint_type: String,
    pub tempurl_container_key: bool,
    pub tempurl_methods: String,
    pub chunk_size: String,
}

/// Alibaba Cloud OSS provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OssSpec {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub region: String,
    pub bucket: String,
    pub endpoint: String,
    pub internal: bool,
    pub encrypt: bool,
    pub secure: bool,
    pub root_directory: String,
    pub chunk_size: String,
}

// =============================================================================
// Status
// =============================================================================

/// Status of the HarborCluster
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HarborClusterStatus {
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<HarborClusterCondition>,

    /// Properties exposed by the storage backend once ready
    #[serde(default)]
    pub storage_properties: Vec<Property>,
}

/// A named output value, e.g. the name of a generated secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Condition type for the storage component
pub const STORAGE_READY: &str = "StorageReady";

/// Condition for cluster status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HarborClusterCondition {
    /// Type of condition
    pub r#type: String,
    /// Status: True, False, Unknown
    pub status: ConditionStatus,
    /// Last transition time
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

/// Condition status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

// =============================================================================
// Implementations
// =============================================================================

impl HarborClusterStatus {
    /// Set a condition, replacing existing if same type
    pub fn set_condition(&mut self, condition: HarborClusterCondition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }

    /// Get a condition by type
    pub fn condition(&self, condition_type: &str) -> Option<&HarborClusterCondition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Check if storage is ready
    pub fn is_storage_ready(&self) -> bool {
        self.condition(STORAGE_READY)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}
