//! MinIOInstance CRD
//!
//! Mirror of the workload resource served by the MinIO operator. This
//! operator only creates and patches it; the MinIO operator owns the schema
//! and turns it into a StatefulSet of the same name.

use k8s_openapi::api::core::v1::{
    EnvVar, LocalObjectReference, PersistentVolumeClaim, Probe, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Desired state of a MinIO deployment
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "operator.min.io",
    version = "v1",
    kind = "MinIOInstance",
    plural = "minioinstances",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase", default)]
pub struct MinIOInstanceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Labels and annotations applied to the MinIO pods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,

    pub image: String,

    pub zones: Vec<Zone>,

    pub volumes_per_server: i32,

    pub mount_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<PersistentVolumeClaim>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creds_secret: Option<LocalObjectReference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_management_policy: Option<String>,

    pub request_auto_cert: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_config: Option<CertificateConfig>,

    pub env: Vec<EnvVar>,

    pub resources: ResourceRequirements,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<Probe>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Probe>,
}

/// A group of MinIO servers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub name: String,
    pub servers: i32,
}

/// Certificate request settings for auto-cert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateConfig {
    pub common_name: String,
    pub organization_name: Vec<String>,
    #[serde(rename = "dnsNames")]
    pub dns_names: Vec<String>,
}

impl MinIOInstance {
    /// Total number of servers across all zones
    pub fn servers(&self) -> i32 {
        self.spec.zones.iter().map(|z| z.servers).sum()
    }

    /// Container image the instance runs
    pub fn image(&self) -> &str {
        &self.spec.image
    }
}
