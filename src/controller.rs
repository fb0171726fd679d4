//! HarborCluster controller
//!
//! Drives the storage engine from the `kube` runtime. Each pass runs one
//! engine reconciliation, folds the outcome into the cluster status, records
//! metrics and decides when to look at the cluster again.

use crate::config::{OperatorConfig, RequeueConfig};
use crate::crd::{HarborCluster, HarborClusterStatus, MinIOInstance, STORAGE_READY};
use crate::error::{Error, ErrorAction, Result};
use crate::metrics::{
    Metrics, OUTCOME_CONVERGED, OUTCOME_NOT_READY, OUTCOME_READY, OUTCOME_UNKNOWN,
};
use crate::storage::{
    merge_condition, ConditionKind, ReconcileResult, ReconcileStatus, StorageKind,
    StorageReconciler,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// =============================================================================
// Context
// =============================================================================

/// Shared state handed to every reconciliation
pub struct Context {
    pub client: Client,
    pub engine: StorageReconciler,
    pub config: OperatorConfig,
    pub metrics: Metrics,
}

impl Context {
    pub fn new(
        client: Client,
        engine: StorageReconciler,
        config: OperatorConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            engine,
            config,
            metrics,
        }
    }
}

// =============================================================================
// Status Folding
// =============================================================================

/// Fold an engine outcome into the previous cluster status.
///
/// A converged outcome leaves a Ready status with properties alone. Anything
/// else published before it is replaced by `converged`, the Ready status of
/// the backend that needed no action. The storage condition keeps its previous
/// transition time while its status is unchanged, and the published properties
/// are only replaced by a Ready outcome.
pub fn next_status(
    previous: Option<&HarborClusterStatus>,
    outcome: &ReconcileResult,
    converged: Option<&ReconcileStatus>,
) -> Option<HarborClusterStatus> {
    let status = match (outcome, converged) {
        (Ok(Some(status)), _) => status,
        (Ok(None), Some(ready)) if is_stale(previous) => ready,
        (Ok(None), _) => return None,
        (Err(err), _) => &err.status,
    };

    let mut next = previous.cloned().unwrap_or_default();
    let condition = merge_condition(next.condition(STORAGE_READY), status.to_condition());
    next.set_condition(condition);
    if let Some(properties) = &status.properties {
        next.storage_properties = properties.clone();
    }
    Some(next)
}

fn is_stale(previous: Option<&HarborClusterStatus>) -> bool {
    previous.map_or(true, |status| {
        !status.is_storage_ready() || status.storage_properties.is_empty()
    })
}

/// Metrics label for an outcome
pub fn outcome_label(outcome: &ReconcileResult) -> &'static str {
    match outcome {
        Ok(None) => OUTCOME_CONVERGED,
        Ok(Some(ReconcileStatus {
            kind: ConditionKind::Ready,
            ..
        })) => OUTCOME_READY,
        Ok(Some(_)) => OUTCOME_UNKNOWN,
        Err(_) => OUTCOME_NOT_READY,
    }
}

/// Requeue interval after a successful pass
pub fn requeue_after(status: Option<&ReconcileStatus>, requeue: &RequeueConfig) -> Duration {
    match status {
        Some(status) if status.kind == ConditionKind::Unknown => {
            Duration::from_secs(requeue.pending_secs)
        }
        _ => Duration::from_secs(requeue.ready_secs),
    }
}

fn kind_label(cluster: &HarborCluster) -> &'static str {
    cluster
        .spec
        .storage
        .kind
        .parse::<StorageKind>()
        .map(|kind| kind.as_str())
        .unwrap_or("invalid")
}

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile one HarborCluster
pub async fn reconcile(cluster: Arc<HarborCluster>, ctx: Arc<Context>) -> Result<Action> {
    let started = Instant::now();
    let outcome = ctx.engine.reconcile(&cluster).await;

    ctx.metrics
        .observe(kind_label(&cluster), outcome_label(&outcome), started.elapsed());

    let converged = match &outcome {
        Ok(None) => ctx.engine.converged_status(&cluster),
        _ => None,
    };
    if let Some(status) = next_status(cluster.status.as_ref(), &outcome, converged.as_ref()) {
        patch_status(&cluster, &ctx, status).await?;
    }

    match outcome {
        Ok(status) => {
            if let Some(status) = &status {
                info!(
                    "Storage of {} is {} {}",
                    cluster.name_any(),
                    status.kind,
                    status.reason
                );
            }
            Ok(Action::requeue(requeue_after(
                status.as_ref(),
                &ctx.config.requeue,
            )))
        }
        Err(err) => {
            warn!("Storage of {} is not ready: {}", cluster.name_any(), err);
            Err(err.into())
        }
    }
}

async fn patch_status(
    cluster: &HarborCluster,
    ctx: &Context,
    status: HarborClusterStatus,
) -> Result<()> {
    let Some(namespace) = cluster.namespace() else {
        debug!("Skipping status update of {}, it has no namespace", cluster.name_any());
        return Ok(());
    };

    let api: Api<HarborCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let params = PatchParams {
        field_manager: Some(ctx.config.field_manager.clone()),
        ..Default::default()
    };
    let patch = json!({ "status": status });

    api.patch_status(&cluster.name_any(), &params, &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Map an error to the controller's next action
pub fn error_policy(cluster: Arc<HarborCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    error!("Reconciliation of {} failed: {}", cluster.name_any(), error);
    action_for(error, &ctx.config.requeue)
}

/// Requeue decision for a failed pass
pub fn action_for(error: &Error, requeue: &RequeueConfig) -> Action {
    match error.action() {
        ErrorAction::RequeueWithBackoff => {
            Action::requeue(Duration::from_secs(requeue.error_secs))
        }
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

// =============================================================================
// Run
// =============================================================================

/// Run the controller until shutdown. Watches all namespaces unless
/// `namespace` is set.
pub async fn run(ctx: Arc<Context>, namespace: Option<String>) {
    let client = ctx.client.clone();
    let (clusters, secrets, services, instances) = match &namespace {
        Some(ns) => (
            Api::<HarborCluster>::namespaced(client.clone(), ns),
            Api::<Secret>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
            Api::<MinIOInstance>::namespaced(client, ns),
        ),
        None => (
            Api::<HarborCluster>::all(client.clone()),
            Api::<Secret>::all(client.clone()),
            Api::<Service>::all(client.clone()),
            Api::<MinIOInstance>::all(client),
        ),
    };

    info!(
        "Starting HarborCluster controller in {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );

    Controller::new(clusters, watcher::Config::default())
        .owns(secrets, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .owns(instances, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!("Reconciled {}", object.name),
                Err(e) => debug!("Reconcile loop error: {}", e),
            }
        })
        .await;

    info!("HarborCluster controller stopped");
}
