//! Convergence/Diff Engine
//!
//! Compares observed objects against desired ones by value and classifies
//! the single corrective action a reconciliation should take. Nothing here
//! performs I/O.

use crate::crd::MinIOInstance;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Secret;

/// Smallest and largest server counts MinIO accepts in distributed mode
pub const MIN_DISTRIBUTED_SERVERS: i32 = 4;
pub const MAX_DISTRIBUTED_SERVERS: i32 = 16;

// =============================================================================
// External Path
// =============================================================================

/// What to do about the external provider secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalAction {
    /// No secret yet
    Provision,
    /// Secret exists but its data differs from the spec
    Update,
    /// Secret matches the spec byte for byte
    Converged,
}

/// Classify the external path
pub fn plan_external(observed: Option<&Secret>, desired: &Secret) -> ExternalAction {
    match observed {
        None => ExternalAction::Provision,
        Some(observed) if secret_data_diverged(observed, desired) => ExternalAction::Update,
        Some(_) => ExternalAction::Converged,
    }
}

/// Byte-for-byte comparison of secret payloads. A missing map equals an empty one.
pub fn secret_data_diverged(observed: &Secret, desired: &Secret) -> bool {
    let observed = observed.data.clone().unwrap_or_default();
    let desired = desired.data.clone().unwrap_or_default();
    observed != desired
}

// =============================================================================
// In-Cluster Path
// =============================================================================

/// What to do about the in-cluster workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InClusterAction {
    /// No workload resource yet
    Provision,
    /// Change the server count
    Scale { from: i32, to: i32 },
    /// Change the image
    Update { from: String, to: String },
    /// Nothing to change; decide readiness
    CheckReadiness,
}

/// Classify the in-cluster path. Scale is evaluated before update, and both
/// before readiness. A first provision is held to the same server counts a
/// scale would accept.
pub fn plan_in_cluster(
    observed: Option<&MinIOInstance>,
    desired: &MinIOInstance,
) -> Result<InClusterAction> {
    let observed = match observed {
        None => {
            check_provision(desired.servers())?;
            return Ok(InClusterAction::Provision);
        }
        Some(observed) => observed,
    };

    let (from, to) = (observed.servers(), desired.servers());
    if check_scale(from, to)? {
        return Ok(InClusterAction::Scale { from, to });
    }

    if check_update(observed, desired) {
        return Ok(InClusterAction::Update {
            from: observed.image().to_string(),
            to: desired.image().to_string(),
        });
    }

    Ok(InClusterAction::CheckReadiness)
}

/// Decide whether moving from `current` to `desired` servers is a scale
/// action. Errors when the move is not allowed.
///
/// MinIO builds erasure-coding sets of 4 to 16 drives, so a distributed
/// deployment needs an even server count in that range. A standalone (single
/// server) deployment cannot become distributed.
pub fn check_scale(current: i32, desired: i32) -> Result<bool> {
    if current == desired {
        return Ok(false);
    }
    if current == 1 {
        return Err(Error::StandaloneToDistributed { desired });
    }
    if is_valid_distributed(desired) {
        return Ok(true);
    }
    Err(Error::InvalidReplicaCount { replicas: desired })
}

/// A new deployment is either standalone or a valid distributed layout
pub fn check_provision(servers: i32) -> Result<()> {
    if servers == 1 || is_valid_distributed(servers) {
        return Ok(());
    }
    Err(Error::InvalidReplicaCount { replicas: servers })
}

/// Even and within the erasure-coding range
pub fn is_valid_distributed(servers: i32) -> bool {
    servers % 2 == 0 && (MIN_DISTRIBUTED_SERVERS..=MAX_DISTRIBUTED_SERVERS).contains(&servers)
}

/// Only the image is compared; other field differences are not update triggers
pub fn check_update(observed: &MinIOInstance, desired: &MinIOInstance) -> bool {
    observed.image() != desired.image()
}

/// Ready exactly when every desired server reports ready
pub fn is_ready(ready_replicas: i32, desired_replicas: i32) -> bool {
    ready_replicas == desired_replicas
}
