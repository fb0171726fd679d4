//! Object store adapters
//!
//! - [`s3`]: S3 REST API with Signature V4, used against in-cluster MinIO
//! - [`memory`]: in-memory buckets for tests

pub mod memory;
pub mod s3;

pub use memory::InMemoryBuckets;
pub use s3::{S3BucketStore, S3BucketStoreFactory};
