//! Storage Reconciler
//!
//! One reconciliation call per cluster resource: resolve the declared storage
//! kind, compare observed objects with desired ones and take at most one
//! corrective action. The reconciler keeps no memory between calls.

use crate::config::StorageSettings;
use crate::crd::{HarborCluster, InClusterSpec};
use crate::domain::ports::{BucketStoreFactoryRef, ClusterClientRef};
use crate::error::Error;
use crate::storage::desired::{ClusterIdentity, DesiredState};
use crate::storage::diff::{self, ExternalAction, InClusterAction};
use crate::storage::external::ExternalProvisioner;
use crate::storage::in_cluster::InClusterProvisioner;
use crate::storage::kind::{ExternalBackend, StorageBackend};
use crate::storage::status::{reason, ReconcileError, ReconcileStatus};
use kube::ResourceExt;
use tracing::{debug, instrument};

/// `Ok(None)` means nothing needed doing
pub type ReconcileResult = std::result::Result<Option<ReconcileStatus>, ReconcileError>;

/// Reconciles the storage of [`HarborCluster`] resources
pub struct StorageReconciler {
    client: ClusterClientRef,
    buckets: BucketStoreFactoryRef,
    settings: StorageSettings,
}

impl StorageReconciler {
    pub fn new(
        client: ClusterClientRef,
        buckets: BucketStoreFactoryRef,
        settings: StorageSettings,
    ) -> Self {
        Self {
            client,
            buckets,
            settings,
        }
    }

    /// Run one reconciliation for `cluster`
    #[instrument(
        skip(self, cluster),
        fields(cluster = %cluster.name_any(), namespace = cluster.namespace().as_deref().unwrap_or(""))
    )]
    pub async fn reconcile(&self, cluster: &HarborCluster) -> ReconcileResult {
        let backend = StorageBackend::resolve(&cluster.spec.storage).map_err(|e| {
            let reason = match e {
                Error::NoMatchingProvisioner { .. } => reason::NO_MATCHING_PROVISIONER,
                _ => reason::INVALID_STORAGE_SPEC,
            };
            ReconcileError::new(reason, e)
        })?;
        let identity = ClusterIdentity::from_cluster(cluster)
            .map_err(|e| ReconcileError::new(reason::INVALID_CLUSTER_IDENTITY, e))?;
        let desired = DesiredState::new(&identity, &self.settings);

        debug!("Reconciling {} storage", backend.kind());

        match backend {
            StorageBackend::External(external) => self.reconcile_external(&desired, &external).await,
            StorageBackend::InCluster(spec) => self.reconcile_in_cluster(&desired, &spec).await,
        }
    }

    /// Status of an external backend whose secret already matches the spec.
    ///
    /// A converged pass reports nothing, so the controller uses this to
    /// repair a published status that still shows an earlier failure.
    /// Returns `None` for the in-cluster kind and for specs that do not resolve.
    pub fn converged_status(&self, cluster: &HarborCluster) -> Option<ReconcileStatus> {
        let StorageBackend::External(backend) = StorageBackend::resolve(&cluster.spec.storage).ok()?
        else {
            return None;
        };
        let identity = ClusterIdentity::from_cluster(cluster).ok()?;
        let desired = DesiredState::new(&identity, &self.settings);
        Some(ExternalProvisioner::new(self.client.as_ref(), &desired).ready_status(&backend))
    }

    async fn reconcile_external(
        &self,
        desired: &DesiredState<'_>,
        backend: &ExternalBackend,
    ) -> ReconcileResult {
        let provisioner = ExternalProvisioner::new(self.client.as_ref(), desired);
        let desired_secret = desired.external_secret(backend);
        let observed = self
            .client
            .get_secret(&desired.external_secret_key())
            .await
            .map_err(|e| ReconcileError::new(reason::GET_EXTERNAL_SECRET, e))?;

        match (diff::plan_external(observed.as_ref(), &desired_secret), observed) {
            (ExternalAction::Converged, _) => {
                debug!("External storage secret already converged");
                Ok(None)
            }
            (ExternalAction::Update, Some(observed)) => provisioner
                .update(backend, &observed, desired_secret)
                .await
                .map(Some),
            (ExternalAction::Provision, _) | (ExternalAction::Update, None) => {
                provisioner.provision(backend).await.map(Some)
            }
        }
    }

    async fn reconcile_in_cluster(
        &self,
        desired: &DesiredState<'_>,
        spec: &InClusterSpec,
    ) -> ReconcileResult {
        let provisioner = InClusterProvisioner::new(
            self.client.as_ref(),
            self.buckets.as_ref(),
            desired,
            &self.settings.default_bucket,
        );
        let desired_instance = desired.minio_instance(spec);
        let observed = self
            .client
            .get_minio_instance(&desired.minio_key())
            .await
            .map_err(|e| ReconcileError::new(reason::GET_MINIO, e))?;

        let action = diff::plan_in_cluster(observed.as_ref(), &desired_instance).map_err(|e| {
            let reason = if observed.is_some() {
                reason::SCALE_MINIO
            } else {
                reason::INVALID_STORAGE_SPEC
            };
            ReconcileError::new(reason, e)
        })?;
        debug!("Planned in-cluster action {:?}", action);

        let status = match (action, observed) {
            (InClusterAction::Provision, _) | (_, None) => {
                provisioner.provision(&desired_instance).await?
            }
            (InClusterAction::Scale { .. }, Some(observed)) => {
                provisioner.scale(&observed, &desired_instance).await?
            }
            (InClusterAction::Update { to, .. }, Some(observed)) => {
                provisioner.update(&observed, &to).await?
            }
            (InClusterAction::CheckReadiness, Some(_)) => {
                provisioner.check_readiness(desired_instance.servers()).await?
            }
        };
        Ok(Some(status))
    }
}
