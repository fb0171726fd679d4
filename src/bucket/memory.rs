//! In-Memory Bucket Store
//!
//! One shared bucket namespace per endpoint URL. Records every connection
//! and bucket creation for assertions.

use crate::domain::ports::{BucketEndpoint, BucketStore, BucketStoreFactory, BucketStoreRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, BTreeSet<String>>,
    connections: Vec<BucketEndpoint>,
    created: Vec<String>,
    unreachable: bool,
    failing_status: Option<u16>,
}

/// [`BucketStoreFactory`] whose stores share in-process state
#[derive(Default, Clone)]
pub struct InMemoryBuckets {
    state: Arc<RwLock<State>>,
}

impl InMemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every connection attempt
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unreachable = unreachable;
    }

    /// Answer every bucket request with this HTTP status
    pub fn fail_requests(&self, status: u16) {
        self.state.write().failing_status = Some(status);
    }

    /// Endpoints connected to so far
    pub fn connections(&self) -> Vec<BucketEndpoint> {
        self.state.read().connections.clone()
    }

    /// Buckets created so far, as `url/bucket`
    pub fn created(&self) -> Vec<String> {
        self.state.read().created.clone()
    }

    pub fn contains(&self, url: &str, bucket: &str) -> bool {
        self.state
            .read()
            .buckets
            .get(url)
            .map_or(false, |buckets| buckets.contains(bucket))
    }
}

impl BucketStoreFactory for InMemoryBuckets {
    fn connect(&self, endpoint: &BucketEndpoint) -> Result<BucketStoreRef> {
        let mut state = self.state.write();
        if state.unreachable {
            return Err(Error::Internal(format!(
                "object store {} is unreachable",
                endpoint.url
            )));
        }
        state.connections.push(endpoint.clone());
        Ok(Arc::new(InMemoryBucketStore {
            url: endpoint.url.clone(),
            state: self.state.clone(),
        }))
    }
}

struct InMemoryBucketStore {
    url: String,
    state: Arc<RwLock<State>>,
}

impl InMemoryBucketStore {
    fn check(&self, operation: &str, bucket: &str) -> Result<()> {
        match self.state.read().failing_status {
            Some(status) => Err(Error::ObjectStoreRequest {
                operation: operation.to_string(),
                bucket: bucket.to_string(),
                status,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.check("HeadBucket", bucket)?;
        Ok(self
            .state
            .read()
            .buckets
            .get(&self.url)
            .map_or(false, |buckets| buckets.contains(bucket)))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.check("CreateBucket", bucket)?;
        let mut state = self.state.write();
        let inserted = state
            .buckets
            .entry(self.url.clone())
            .or_default()
            .insert(bucket.to_string());
        if inserted {
            state.created.push(format!("{}/{}", self.url, bucket));
        }
        Ok(())
    }
}
