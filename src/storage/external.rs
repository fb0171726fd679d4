//! External Provisioners
//!
//! Each external provider contributes exactly one opaque secret holding its
//! configuration. Providers differ only in which fields they render, so they
//! share one capability, [`SecretSource`], and one provisioner.

use crate::crd::{AzureSpec, GcsSpec, OssSpec, Property, S3Spec, SwiftSpec};
use crate::domain::ports::ClusterClient;
use crate::error::{Error, Result};
use crate::storage::desired::DesiredState;
use crate::storage::kind::{ExternalBackend, StorageKind};
use crate::storage::status::{reason, ReconcileError, ReconcileStatus};
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use tracing::{debug, info};

// =============================================================================
// Secret Source Capability
// =============================================================================

/// A provider configuration that renders into one secret
pub trait SecretSource: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Name of the output property that references the secret
    fn property_name(&self) -> &'static str;

    /// Reason code reported when creating the secret fails
    fn create_reason(&self) -> &'static str;

    /// Fields that must be non-empty, as (key, value)
    fn required_fields(&self) -> Vec<(&'static str, &str)>;

    /// Secret payload; booleans are rendered as "true" / "false"
    fn secret_data(&self) -> BTreeMap<String, String>;

    fn validate(&self) -> Result<()> {
        for (key, value) in self.required_fields() {
            if value.trim().is_empty() {
                return Err(Error::InvalidStorageSpec(format!(
                    "storage.{}.{} is required",
                    self.kind(),
                    key
                )));
            }
        }
        Ok(())
    }
}

fn data<const N: usize>(entries: [(&str, String); N]) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl SecretSource for S3Spec {
    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }

    fn property_name(&self) -> &'static str {
        "s3Secret"
    }

    fn create_reason(&self) -> &'static str {
        reason::CREATE_S3_SECRET
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("region", self.region.as_str()),
            ("bucket", self.bucket.as_str()),
            ("accessKey", self.access_key.as_str()),
            ("secretKey", self.secret_key.as_str()),
        ]
    }

    fn secret_data(&self) -> BTreeMap<String, String> {
        data([
            ("region", self.region.clone()),
            ("bucket", self.bucket.clone()),
            ("accesskey", self.access_key.clone()),
            ("secretkey", self.secret_key.clone()),
            ("regionendpoint", self.region_endpoint.clone()),
            ("encrypt", self.encrypt.to_string()),
            ("keyid", self.key_id.clone()),
            ("secure", self.secure.to_string()),
            ("chunksize", self.chunk_size.clone()),
            ("rootdirectory", self.root_directory.clone()),
            ("storageclass", self.storage_class.clone()),
            ("v4auth", self.v4_auth.to_string()),
        ])
    }
}

impl SecretSource for AzureSpec {
    fn kind(&self) -> StorageKind {
        StorageKind::Azure
    }

    fn property_name(&self) -> &'static str {
        "azureSecret"
    }

    fn create_reason(&self) -> &'static str {
        reason::CREATE_AZURE_SECRET
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("accountName", self.account_name.as_str()),
            ("accountKey", self.account_key.as_str()),
            ("container", self.container.as_str()),
        ]
    }

    fn secret_data(&self) -> BTreeMap<String, String> {
        data([
            ("accountname", self.account_name.clone()),
            ("accountkey", self.account_key.clone()),
            ("container", self.container.clone()),
            ("realm", self.realm.clone()),
        ])
    }
}

impl SecretSource for GcsSpec {
    fn kind(&self) -> StorageKind {
        StorageKind::Gcs
    }

    fn property_name(&self) -> &'static str {
        "gcsSecret"
    }

    fn create_reason(&self) -> &'static str {
        reason::CREATE_GCS_SECRET
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("bucket", self.bucket.as_str()), ("encodedKey", self.encoded_key.as_str())]
    }

    fn secret_data(&self) -> BTreeMap<String, String> {
        data([
            ("bucket", self.bucket.clone()),
            ("encodedkey", self.encoded_key.clone()),
            ("rootdirectory", self.root_directory.clone()),
            ("chunksize", self.chunk_size.clone()),
        ])
    }
}

impl SecretSource for SwiftSpec {
    fn kind(&self) -> StorageKind {
        StorageKind::Swift
    }

    fn property_name(&self) -> &'static str {
        "swiftSecret"
    }

    fn create_reason(&self) -> &'static str {
        reason::CREATE_SWIFT_SECRET
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("authUrl", self.auth_url.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("container", self.container.as_str()),
        ]
    }

    fn secret_data(&self) -> BTreeMap<String, String> {
        data([
            ("authurl", self.auth_url.clone()),
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("container", self.container.clone()),
            ("region", self.region.clone()),
            ("tenant", self.tenant.clone()),
            ("tenantid", self.tenant_id.clone()),
            ("domain", self.domain.clone()),
            ("domainid", self.domain_id.clone()),
            ("trustid", self.trust_id.clone()),
            ("insecureskipverify", self.insecure_skip_verify.to_string()),
            ("prefix", self.prefix.clone()),
            ("secretkey", self.secret_key.clone()),
            ("authversion", self.auth_version.clone()),
            ("endpointtype", self.endpoint_type.clone()),
            ("tempurlcontainerkey", self.tempurl_container_key.to_string()),
            ("tempurlmethods", self.tempurl_methods.clone()),
            ("chunksize", self.chunk_size.clone()),
        ])
    }
}

impl SecretSource for OssSpec {
    fn kind(&self) -> StorageKind {
        StorageKind::Oss
    }

    fn property_name(&self) -> &'static str {
        "ossSecret"
    }

    fn create_reason(&self) -> &'static str {
        reason::CREATE_OSS_SECRET
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("accessKeyId", self.access_key_id.as_str()),
            ("accessKeySecret", self.access_key_secret.as_str()),
            ("region", self.region.as_str()),
            ("bucket", self.bucket.as_str()),
        ]
    }

    fn secret_data(&self) -> BTreeMap<String, String> {
        data([
            ("accesskeyid", self.access_key_id.clone()),
            ("accesskeysecret", self.access_key_secret.clone()),
            ("region", self.region.clone()),
            ("bucket", self.bucket.clone()),
            ("endpoint", self.endpoint.clone()),
            ("internal", self.internal.to_string()),
            ("encrypt", self.encrypt.to_string()),
            ("secure", self.secure.to_string()),
            ("rootdirectory", self.root_directory.clone()),
            ("chunksize", self.chunk_size.clone()),
        ])
    }
}

// =============================================================================
// External Provisioner
// =============================================================================

/// Creates and updates the external provider secret
pub struct ExternalProvisioner<'a> {
    client: &'a dyn ClusterClient,
    desired: &'a DesiredState<'a>,
}

impl<'a> ExternalProvisioner<'a> {
    pub fn new(client: &'a dyn ClusterClient, desired: &'a DesiredState<'a>) -> Self {
        Self { client, desired }
    }

    /// Ready status naming the provider secret
    pub fn ready_status(&self, backend: &ExternalBackend) -> ReconcileStatus {
        ReconcileStatus::ready(vec![Property::new(
            backend.source().property_name(),
            self.desired.external_secret_key().name,
        )])
    }

    /// Create the provider secret and report it as the single output property
    pub async fn provision(
        &self,
        backend: &ExternalBackend,
    ) -> std::result::Result<ReconcileStatus, ReconcileError> {
        let secret = self.desired.external_secret(backend);
        let source = backend.source();

        info!(
            "Provisioning {} storage secret {}",
            backend.kind(),
            self.desired.external_secret_key()
        );

        self.client
            .create_secret(&secret)
            .await
            .map_err(|e| ReconcileError::new(source.create_reason(), e))?;

        Ok(self.ready_status(backend))
    }

    /// Replace the observed secret's data with the desired data
    pub async fn update(
        &self,
        backend: &ExternalBackend,
        observed: &Secret,
        desired: Secret,
    ) -> std::result::Result<ReconcileStatus, ReconcileError> {
        let mut updated = observed.clone();
        updated.data = desired.data;
        updated.type_ = desired.type_;
        updated.metadata.labels = desired.metadata.labels;

        info!(
            "External {} storage secret {} drifted from spec, updating",
            backend.kind(),
            self.desired.external_secret_key()
        );

        self.client
            .update_secret(&updated)
            .await
            .map_err(|e| ReconcileError::new(reason::UPDATE_EXTERNAL_SECRET, e))?;

        debug!("External storage secret updated");

        Ok(self.ready_status(backend).with_reason(
            reason::EXTERNAL_SECRET_DRIFTED,
            format!(
                "secret {} differed from the {} spec and was updated",
                self.desired.external_secret_key().name,
                backend.kind()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans_render_as_literals() {
        let s3 = S3Spec {
            encrypt: true,
            ..Default::default()
        };
        let data = s3.secret_data();
        assert_eq!(data["encrypt"], "true");
        assert_eq!(data["secure"], "false");
        assert_eq!(data["v4auth"], "false");
    }

    #[test]
    fn test_every_provider_field_is_rendered() {
        assert_eq!(S3Spec::default().secret_data().len(), 12);
        assert_eq!(AzureSpec::default().secret_data().len(), 4);
        assert_eq!(GcsSpec::default().secret_data().len(), 4);
        assert_eq!(SwiftSpec::default().secret_data().len(), 18);
        assert_eq!(OssSpec::default().secret_data().len(), 10);
    }

    #[test]
    fn test_swift_and_oss_render_their_own_fields() {
        let swift = SwiftSpec {
            auth_url: "https://keystone/v3".into(),
            ..Default::default()
        };
        assert_eq!(swift.secret_data()["authurl"], "https://keystone/v3");
        assert!(!swift.secret_data().contains_key("accesskeyid"));

        let oss = OssSpec {
            access_key_id: "LTAI".into(),
            internal: true,
            ..Default::default()
        };
        assert_eq!(oss.secret_data()["accesskeyid"], "LTAI");
        assert_eq!(oss.secret_data()["internal"], "true");
        assert!(!oss.secret_data().contains_key("authurl"));
    }

    #[test]
    fn test_validate_names_missing_field() {
        let azure = AzureSpec {
            account_name: "acct".into(),
            account_key: "key".into(),
            ..Default::default()
        };
        let err = azure.validate().unwrap_err().to_string();
        assert!(err.contains("storage.azure.container"));
    }

    #[test]
    fn test_property_names_are_distinct() {
        let names = [
            S3Spec::default().property_name(),
            AzureSpec::default().property_name(),
            GcsSpec::default().property_name(),
            SwiftSpec::default().property_name(),
            OssSpec::default().property_name(),
        ];
        let unique: std::collections::BTreeSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
