//! Cluster client adapters
//!
//! - [`kubernetes`]: production adapter over the Kubernetes API
//! - [`memory`]: in-memory adapter with failure injection for tests

pub mod kubernetes;
pub mod memory;

pub use kubernetes::KubeClusterClient;
pub use memory::InMemoryClusterClient;
