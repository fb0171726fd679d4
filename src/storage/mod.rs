//! Storage reconciliation engine
//!
//! - [`kind`]: storage kind resolution into a closed backend type
//! - [`desired`]: deterministic construction of managed objects
//! - [`diff`]: observed vs desired comparison and action planning
//! - [`external`]: provider secrets for external object stores
//! - [`in_cluster`]: the self-hosted MinIO deployment
//! - [`status`]: normalized outcome reporting
//! - [`reconciler`]: the per-call state machine

pub mod desired;
pub mod diff;
pub mod external;
pub mod in_cluster;
pub mod kind;
pub mod reconciler;
pub mod status;

pub use desired::{ClusterIdentity, Credentials, DesiredState};
pub use diff::{ExternalAction, InClusterAction};
pub use external::{ExternalProvisioner, SecretSource};
pub use in_cluster::{InClusterProvisioner, CREDS_SECRET_PROPERTY};
pub use kind::{ExternalBackend, StorageBackend, StorageKind};
pub use reconciler::{ReconcileResult, StorageReconciler};
pub use status::{merge_condition, reason, ConditionKind, ReconcileError, ReconcileStatus};
