//! Error types for the Cluster Storage Operator
//!
//! Provides structured error types for the storage reconciliation engine,
//! its cluster API and object store collaborators, and the operator runtime.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Invalid cluster identity: {0}")]
    InvalidClusterIdentity(String),

    // =========================================================================
    // Storage Spec Errors
    // =========================================================================
    #[error("No matching provisioner for storage kind: {kind:?}")]
    NoMatchingProvisioner { kind: String },

    #[error("Invalid storage spec: {0}")]
    InvalidStorageSpec(String),

    #[error("Scaling from standalone to distributed mode is not supported (1 -> {desired} servers)")]
    StandaloneToDistributed { desired: i32 },

    #[error("Invalid replica count for distributed mode: {replicas} (supply an even count from 4 to 16)")]
    InvalidReplicaCount { replicas: i32 },

    #[error("Credential key {key} missing from secret {secret}")]
    MissingCredentials { secret: String, key: String },

    // =========================================================================
    // Object Store Errors
    // =========================================================================
    #[error("Object store connection error: {0}")]
    ObjectStoreConnection(#[from] reqwest::Error),

    #[error("Object store {operation} failed for bucket {bucket}: HTTP {status}")]
    ObjectStoreRequest {
        operation: String,
        bucket: String,
        status: u16,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_) | Error::ObjectStoreConnection(_) => ErrorAction::RequeueWithBackoff,

            // The object store answered but refused; give the workload time to settle
            Error::ObjectStoreRequest { .. } | Error::MissingCredentials { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(30))
            }

            // Spec violations stay broken until the spec changes
            Error::Configuration(_)
            | Error::InvalidClusterIdentity(_)
            | Error::NoMatchingProvisioner { .. }
            | Error::InvalidStorageSpec(_)
            | Error::StandaloneToDistributed { .. }
            | Error::InvalidReplicaCount { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::ObjectStoreConnection(_))
    }

    /// Check if this error is a spec validation failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NoMatchingProvisioner { .. }
                | Error::InvalidStorageSpec(_)
                | Error::StandaloneToDistributed { .. }
                | Error::InvalidReplicaCount { .. }
        )
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::ObjectStoreRequest {
            operation: "create_bucket".into(),
            bucket: "harbor".into(),
            status: 503,
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(30))
        );

        let err = Error::InvalidReplicaCount { replicas: 3 };
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::ResourceExists {
            kind: "Secret".into(),
            name: "demo-minio-creds-secret".into(),
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let validation = Error::StandaloneToDistributed { desired: 4 };
        assert!(!validation.is_retryable());
        assert!(!validation.is_transient());
        assert!(validation.is_validation());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_validation());

        let missing = Error::MissingCredentials {
            secret: "demo-minio-creds-secret".into(),
            key: "accesskey".into(),
        };
        assert!(missing.is_retryable());
    }

    #[test]
    fn test_error_messages_are_distinct() {
        let scale = Error::InvalidReplicaCount { replicas: 3 }.to_string();
        let unknown = Error::NoMatchingProvisioner { kind: "ceph".into() }.to_string();
        assert!(scale.contains("4 to 16"));
        assert!(unknown.contains("ceph"));
        assert_ne!(scale, unknown);
    }
}
