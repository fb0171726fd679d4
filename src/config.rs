//! Operator configuration
//!
//! Settings are read from an optional YAML file. Every field has a default,
//! so an empty file (or no file at all) yields a working configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

// =============================================================================
// Operator Configuration
// =============================================================================

/// Top-level operator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Field manager used for status patches
    pub field_manager: String,
    /// Storage engine settings
    pub storage: StorageSettings,
    /// Requeue intervals
    pub requeue: RequeueConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            field_manager: "cluster-storage-operator".to_string(),
            storage: StorageSettings::default(),
            requeue: RequeueConfig::default(),
        }
    }
}

/// Settings consumed by the storage reconciliation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// MinIO image repository; the spec version is appended as the tag
    pub minio_image: String,
    /// Bucket created once the in-cluster store is ready
    pub default_bucket: String,
    /// Region used to sign requests against the in-cluster store
    pub region: String,
    /// Port the MinIO service listens on
    pub service_port: i32,
    /// Timeout for a single object store request
    pub request_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            minio_image: "minio/minio".to_string(),
            default_bucket: "harbor".to_string(),
            region: "us-east-1".to_string(),
            service_port: 9000,
            request_timeout_secs: 10,
        }
    }
}

impl StorageSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How soon a cluster is looked at again after each outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequeueConfig {
    /// After storage reported ready or already converged
    pub ready_secs: u64,
    /// While provisioning, scaling or updating
    pub pending_secs: u64,
    /// After a retryable failure
    pub error_secs: u64,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            ready_secs: 300,
            pending_secs: 15,
            error_secs: 60,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl OperatorConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: OperatorConfig = if raw.trim().is_empty() {
            OperatorConfig::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.field_manager.is_empty() {
            return Err(Error::Configuration("fieldManager must not be empty".into()));
        }
        if self.storage.minio_image.is_empty() {
            return Err(Error::Configuration("storage.minioImage must not be empty".into()));
        }
        if self.storage.default_bucket.is_empty() {
            return Err(Error::Configuration(
                "storage.defaultBucket must not be empty".into(),
            ));
        }
        if !(1..=65535).contains(&self.storage.service_port) {
            return Err(Error::Configuration(format!(
                "storage.servicePort out of range: {}",
                self.storage.service_port
            )));
        }
        if self.storage.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "storage.requestTimeoutSecs must be positive".into(),
            ));
        }
        if self.requeue.ready_secs == 0 || self.requeue.pending_secs == 0 || self.requeue.error_secs == 0 {
            return Err(Error::Configuration("requeue intervals must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = OperatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.default_bucket, "harbor");
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.service_port, 9000);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = OperatorConfig::from_yaml(
            r#"
storage:
  defaultBucket: registry
requeue:
  pendingSecs: 5
"#,
        )
        .unwrap();

        assert_eq!(config.storage.default_bucket, "registry");
        assert_eq!(config.storage.minio_image, "minio/minio");
        assert_eq!(config.requeue.pending_secs, 5);
        assert_eq!(config.requeue.ready_secs, 300);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = OperatorConfig::from_yaml("  \n").unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = OperatorConfig::from_yaml("storage:\n  servicePort: 70000\n");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fieldManager: test-manager").unwrap();
        writeln!(file, "storage:\n  region: eu-central-1").unwrap();

        let config = OperatorConfig::load(file.path()).unwrap();
        assert_eq!(config.field_manager, "test-manager");
        assert_eq!(config.storage.region, "eu-central-1");
    }
}
