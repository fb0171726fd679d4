//! Cluster Storage Operator
//!
//! A Kubernetes operator that provisions and maintains the storage backend of
//! a registry cluster: either a self-hosted MinIO deployment or a secret
//! describing an external S3, Azure, GCS, Swift or OSS object store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      HarborCluster Controller                        │
//! │        (kube runtime: watch, status patch, metrics, requeue)         │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                         Storage Reconciler                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────────┐   │
//! │  │ Kind resolve │  │ Desired state│  │   Convergence / Diff      │   │
//! │  └──────────────┘  └──────────────┘  └───────────────────────────┘   │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────┐  │
//! │  │  External Provisioners   │  │      In-Cluster Provisioner      │  │
//! │  │ (S3/Azure/GCS/Swift/OSS) │  │ (creds, service, MinIO, bucket)  │  │
//! │  └──────────────────────────┘  └──────────────────────────────────┘  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                               Ports                                  │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────┐  │
//! │  │      ClusterClient       │  │   BucketStore / Factory (S3 V4)  │  │
//! │  └──────────────────────────┘  └──────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`storage`]: the reconciliation engine
//! - [`controller`]: runtime controller around the engine
//! - [`client`]: cluster client adapters
//! - [`bucket`]: object store adapters
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: port definitions
//! - [`config`]: operator configuration
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod bucket;
pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use bucket::{InMemoryBuckets, S3BucketStoreFactory};

pub use client::{InMemoryClusterClient, KubeClusterClient};

pub use config::{OperatorConfig, RequeueConfig, StorageSettings};

pub use crd::{
    HarborCluster, HarborClusterSpec, HarborClusterStatus, MinIOInstance, MinIOInstanceSpec,
    Property, StorageSpec,
};

pub use domain::ports::{
    BucketEndpoint, BucketStore, BucketStoreFactory, ClusterClient, ObjectKey,
};

pub use error::{Error, ErrorAction, Result};

pub use metrics::Metrics;

pub use storage::{
    ConditionKind, ReconcileError, ReconcileResult, ReconcileStatus, StorageKind,
    StorageReconciler,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
