//! Custom Resource Definitions
//!
//! This module contains all CRD types:
//! - HarborCluster: the registry cluster resource and its storage declaration
//! - MinIOInstance: the workload resource consumed by the MinIO operator

pub mod harbor_cluster;
pub mod minio_instance;

pub use harbor_cluster::*;
pub use minio_instance::*;
