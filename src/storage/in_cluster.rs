//! In-Cluster Provisioner
//!
//! Drives the self-hosted MinIO deployment: first-time provisioning of the
//! credential secret, service and workload resource, the scale and image
//! update actions, and the readiness check with default bucket bootstrap.

use crate::crd::{MinIOInstance, Property};
use crate::domain::ports::{BucketStoreFactory, ClusterClient};
use crate::error::{Error, Result};
use crate::storage::desired::{Credentials, DesiredState};
use crate::storage::diff;
use crate::storage::status::{reason, ReconcileError, ReconcileStatus};
use tracing::{debug, info};

/// Output property naming the credential secret
pub const CREDS_SECRET_PROPERTY: &str = "minioCredsSecret";

type StepResult = std::result::Result<ReconcileStatus, ReconcileError>;

/// Treat a name conflict as success; anything else is a failure
fn tolerate_exists(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::ResourceExists { kind, name }) => {
            debug!("{} {} already exists, keeping it", kind, name);
            Ok(())
        }
        other => other,
    }
}

pub struct InClusterProvisioner<'a> {
    client: &'a dyn ClusterClient,
    buckets: &'a dyn BucketStoreFactory,
    desired: &'a DesiredState<'a>,
    default_bucket: &'a str,
}

impl<'a> InClusterProvisioner<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        buckets: &'a dyn BucketStoreFactory,
        desired: &'a DesiredState<'a>,
        default_bucket: &'a str,
    ) -> Self {
        Self {
            client,
            buckets,
            desired,
            default_bucket,
        }
    }

    // =========================================================================
    // Provision
    // =========================================================================

    /// Create the credential secret, service and workload resource in that
    /// order. Objects that already exist are kept as they are, so a retry
    /// after a partial failure never regenerates credentials.
    pub async fn provision(&self, instance: &MinIOInstance) -> StepResult {
        info!(
            "Provisioning in-cluster storage {} with {} servers",
            self.desired.minio_key(),
            instance.servers()
        );

        let credentials = Credentials::generate();
        tolerate_exists(
            self.client
                .create_secret(&self.desired.creds_secret(&credentials))
                .await,
        )
        .map_err(|e| ReconcileError::new(reason::CREATE_MINIO_CREDS_SECRET, e))?;

        tolerate_exists(self.client.create_service(&self.desired.service()).await)
            .map_err(|e| ReconcileError::new(reason::CREATE_MINIO_SERVICE, e))?;

        tolerate_exists(self.client.create_minio_instance(instance).await)
            .map_err(|e| ReconcileError::new(reason::CREATE_MINIO_CR, e))?;

        Ok(ReconcileStatus::unknown(
            reason::PROVISIONING,
            format!(
                "created MinIO {} with {} servers",
                self.desired.minio_key(),
                instance.servers()
            ),
        ))
    }

    // =========================================================================
    // Drift Actions
    // =========================================================================

    /// Give the observed resource the desired zone layout
    pub async fn scale(&self, observed: &MinIOInstance, desired: &MinIOInstance) -> StepResult {
        let (from, to) = (observed.servers(), desired.servers());
        info!("Scaling MinIO {} from {} to {} servers", self.desired.minio_key(), from, to);

        let mut scaled = observed.clone();
        scaled.spec.zones = desired.spec.zones.clone();

        self.client
            .update_minio_instance(&scaled)
            .await
            .map_err(|e| ReconcileError::new(reason::SCALE_MINIO, e))?;

        Ok(ReconcileStatus::unknown(
            reason::SCALING,
            format!("scaling from {} to {} servers", from, to),
        ))
    }

    /// Set the image of the observed resource
    pub async fn update(&self, observed: &MinIOInstance, image: &str) -> StepResult {
        info!(
            "Updating MinIO {} image from {} to {}",
            self.desired.minio_key(),
            observed.image(),
            image
        );

        let mut updated = observed.clone();
        updated.spec.image = image.to_string();

        self.client
            .update_minio_instance(&updated)
            .await
            .map_err(|e| ReconcileError::new(reason::UPDATE_MINIO, e))?;

        Ok(ReconcileStatus::unknown(
            reason::UPDATING,
            format!("updating image to {}", image),
        ))
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    /// Ready once every desired server reports ready and the default bucket
    /// exists. A StatefulSet that does not exist yet counts as zero ready.
    pub async fn check_readiness(&self, desired_servers: i32) -> StepResult {
        let key = self.desired.minio_key();
        let ready = self
            .client
            .get_stateful_set(&key)
            .await
            .map_err(|e| ReconcileError::new(reason::GET_MINIO_STATEFULSET, e))?
            .and_then(|sts| sts.status)
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);

        if !diff::is_ready(ready, desired_servers) {
            debug!("MinIO {} has {}/{} ready replicas", key, ready, desired_servers);
            return Ok(ReconcileStatus::unknown(
                reason::WAITING_FOR_REPLICAS,
                format!("{} of {} servers ready", ready, desired_servers),
            ));
        }

        self.bootstrap_bucket().await?;

        Ok(ReconcileStatus::ready(vec![Property::new(
            CREDS_SECRET_PROPERTY,
            self.desired.creds_secret_key().name,
        )]))
    }

    /// Create the default bucket if it is absent
    async fn bootstrap_bucket(&self) -> std::result::Result<(), ReconcileError> {
        let creds_key = self.desired.creds_secret_key();
        let secret = self
            .client
            .get_secret(&creds_key)
            .await
            .and_then(|found| {
                found.ok_or_else(|| Error::ResourceNotFound {
                    kind: "Secret".to_string(),
                    name: creds_key.to_string(),
                })
            })
            .map_err(|e| ReconcileError::new(reason::GET_MINIO_CREDS, e))?;
        let credentials = Credentials::from_secret(&secret)
            .map_err(|e| ReconcileError::new(reason::GET_MINIO_CREDS, e))?;

        self.ensure_bucket(&credentials)
            .await
            .map_err(|e| ReconcileError::new(reason::CREATE_DEFAULT_BUCKET, e))
    }

    async fn ensure_bucket(&self, credentials: &Credentials) -> Result<()> {
        let endpoint = self.desired.endpoint(credentials);
        let bucket = self.default_bucket;
        let store = self.buckets.connect(&endpoint)?;

        if store.bucket_exists(bucket).await? {
            debug!("Default bucket {} already exists at {}", bucket, endpoint.url);
            return Ok(());
        }

        info!("Creating default bucket {} at {}", bucket, endpoint.url);
        store.create_bucket(bucket).await
    }
}
