//! Status Reporter
//!
//! Normalized outcome of a storage reconciliation: a tri-state condition, a
//! stable reason code, a human message and, when ready, the properties the
//! rest of the cluster consumes (secret names).

use crate::crd::{ConditionStatus, HarborClusterCondition, Property, STORAGE_READY};
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable reason codes carried by [`ReconcileStatus`]
pub mod reason {
    // NotReady
    pub const INVALID_CLUSTER_IDENTITY: &str = "InvalidClusterIdentity";
    pub const INVALID_STORAGE_SPEC: &str = "InvalidStorageSpec";
    pub const NO_MATCHING_PROVISIONER: &str = "NoMatchingProvisioner";
    pub const GET_EXTERNAL_SECRET: &str = "GetExternalSecretError";
    pub const UPDATE_EXTERNAL_SECRET: &str = "UpdateExternalSecretError";
    pub const CREATE_S3_SECRET: &str = "CreateS3SecretError";
    pub const CREATE_AZURE_SECRET: &str = "CreateAzureSecretError";
    pub const CREATE_GCS_SECRET: &str = "CreateGcsSecretError";
    pub const CREATE_SWIFT_SECRET: &str = "CreateSwiftSecretError";
    pub const CREATE_OSS_SECRET: &str = "CreateOssSecretError";
    pub const GET_MINIO: &str = "GetMinIOError";
    pub const GET_MINIO_STATEFULSET: &str = "GetMinIOStatefulSetError";
    pub const GET_MINIO_CREDS: &str = "GetMinIOCredsError";
    pub const CREATE_MINIO_CREDS_SECRET: &str = "CreateMinIOCredsSecretError";
    pub const CREATE_MINIO_SERVICE: &str = "CreateMinIOServiceError";
    pub const CREATE_MINIO_CR: &str = "CreateMinIOCRError";
    pub const SCALE_MINIO: &str = "ScaleMinIOError";
    pub const UPDATE_MINIO: &str = "UpdateMinIOError";
    pub const CREATE_DEFAULT_BUCKET: &str = "CreateDefaultBucketError";

    // Unknown
    pub const PROVISIONING: &str = "Provisioning";
    pub const SCALING: &str = "Scaling";
    pub const UPDATING: &str = "Updating";
    pub const WAITING_FOR_REPLICAS: &str = "WaitingForReplicas";

    // Ready
    pub const EXTERNAL_SECRET_DRIFTED: &str = "ExternalSecretDrifted";
}

// =============================================================================
// Condition Kind
// =============================================================================

/// Tri-state storage condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Ready,
    NotReady,
    Unknown,
}

impl ConditionKind {
    /// Condition status written to the cluster resource
    pub fn condition_status(&self) -> ConditionStatus {
        match self {
            ConditionKind::Ready => ConditionStatus::True,
            ConditionKind::NotReady => ConditionStatus::False,
            ConditionKind::Unknown => ConditionStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionKind::Ready => write!(f, "Ready"),
            ConditionKind::NotReady => write!(f, "NotReady"),
            ConditionKind::Unknown => write!(f, "Unknown"),
        }
    }
}

// =============================================================================
// Reconcile Status
// =============================================================================

/// Outcome of one reconciliation call. Built fresh every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileStatus {
    pub kind: ConditionKind,
    pub reason: String,
    pub message: String,
    /// Always `Some` for Ready, `None` otherwise
    pub properties: Option<Vec<Property>>,
    pub last_transition_time: DateTime<Utc>,
}

impl ReconcileStatus {
    /// Storage is usable; `properties` lists what was provisioned
    pub fn ready(properties: Vec<Property>) -> Self {
        Self {
            kind: ConditionKind::Ready,
            reason: String::new(),
            message: String::new(),
            properties: Some(properties),
            last_transition_time: Utc::now(),
        }
    }

    /// Reconciliation failed at the step named by `reason`
    pub fn not_ready(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::NotReady,
            reason: reason.into(),
            message: message.into(),
            properties: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Work was accepted and convergence is still in progress
    pub fn unknown(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Unknown,
            reason: reason.into(),
            message: message.into(),
            properties: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Attach a reason and message, e.g. to a Ready status
    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = reason.into();
        self.message = message.into();
        self
    }

    pub fn is_ready(&self) -> bool {
        self.kind == ConditionKind::Ready
    }

    /// Value of a named property, if present
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .as_ref()?
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Convert into the cluster resource's storage condition
    pub fn to_condition(&self) -> HarborClusterCondition {
        HarborClusterCondition {
            r#type: STORAGE_READY.to_string(),
            status: self.kind.condition_status(),
            last_transition_time: Some(self.last_transition_time),
            reason: non_empty(&self.reason),
            message: non_empty(&self.message),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Keep the previous transition time when the condition status did not change
pub fn merge_condition(
    previous: Option<&HarborClusterCondition>,
    mut next: HarborClusterCondition,
) -> HarborClusterCondition {
    if let Some(prev) = previous {
        if prev.status == next.status && prev.last_transition_time.is_some() {
            next.last_transition_time = prev.last_transition_time;
        }
    }
    next
}

// =============================================================================
// Reconcile Error
// =============================================================================

/// Failure of a reconciliation step. Carries the NotReady status that
/// describes it so callers can publish it.
#[derive(thiserror::Error, Debug)]
#[error("{}: {source}", .status.reason)]
pub struct ReconcileError {
    pub status: ReconcileStatus,
    #[source]
    pub source: Error,
}

impl ReconcileError {
    /// Wrap `source` with the reason code of the failing step
    pub fn new(reason: &str, source: Error) -> Self {
        Self {
            status: ReconcileStatus::not_ready(reason, source.to_string()),
            source,
        }
    }

    pub fn reason(&self) -> &str {
        &self.status.reason
    }
}

impl From<ReconcileError> for Error {
    fn from(err: ReconcileError) -> Self {
        err.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ready_always_has_properties() {
        let status = ReconcileStatus::ready(vec![]);
        assert!(status.is_ready());
        assert_eq!(status.properties, Some(vec![]));

        let status = ReconcileStatus::not_ready(reason::GET_MINIO, "boom");
        assert!(status.properties.is_none());

        let status = ReconcileStatus::unknown(reason::PROVISIONING, "");
        assert!(status.properties.is_none());
    }

    #[test]
    fn test_property_lookup() {
        let status = ReconcileStatus::ready(vec![
            Property::new("s3Secret", "demo-harbor-cluster-storage"),
            Property::new("other", "x"),
        ]);
        assert_eq!(status.property("s3Secret"), Some("demo-harbor-cluster-storage"));
        assert_eq!(status.property("missing"), None);
    }

    #[test]
    fn test_to_condition() {
        let condition = ReconcileStatus::not_ready(reason::SCALE_MINIO, "bad").to_condition();
        assert_eq!(condition.r#type, STORAGE_READY);
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some(reason::SCALE_MINIO));

        let condition = ReconcileStatus::ready(vec![]).to_condition();
        assert_eq!(condition.status, ConditionStatus::True);
        assert!(condition.reason.is_none());
        assert!(condition.message.is_none());
    }

    #[test]
    fn test_merge_condition_keeps_time_when_unchanged() {
        let earlier = Utc::now() - Duration::minutes(10);
        let mut previous = ReconcileStatus::unknown(reason::PROVISIONING, "").to_condition();
        previous.last_transition_time = Some(earlier);

        let next = ReconcileStatus::unknown(reason::WAITING_FOR_REPLICAS, "").to_condition();
        let merged = merge_condition(Some(&previous), next);
        assert_eq!(merged.last_transition_time, Some(earlier));
        assert_eq!(merged.reason.as_deref(), Some(reason::WAITING_FOR_REPLICAS));

        let next = ReconcileStatus::ready(vec![]).to_condition();
        let merged = merge_condition(Some(&previous), next);
        assert_ne!(merged.last_transition_time, Some(earlier));
    }

    #[test]
    fn test_reconcile_error_carries_status() {
        let err = ReconcileError::new(
            reason::GET_EXTERNAL_SECRET,
            Error::Internal("api unreachable".into()),
        );
        assert_eq!(err.reason(), reason::GET_EXTERNAL_SECRET);
        assert_eq!(err.status.kind, ConditionKind::NotReady);
        assert!(err.status.message.contains("api unreachable"));
        assert!(err.to_string().starts_with(reason::GET_EXTERNAL_SECRET));
    }
}
