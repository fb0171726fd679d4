//! S3 REST adapter for [`BucketStore`]
//!
//! Talks path-style S3 to the in-cluster MinIO service and signs each request
//! with AWS Signature Version 4.

use crate::domain::ports::{BucketEndpoint, BucketStore, BucketStoreFactory, BucketStoreRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode, Url};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";
const DEFAULT_REGION: &str = "us-east-1";
const ALREADY_OWNED: &str = "BucketAlreadyOwnedByYou";

// =============================================================================
// Signature V4
// =============================================================================

pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Internal(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the per-day signing key
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// Signs requests for one set of credentials
#[derive(Clone)]
pub struct Signer {
    access_key: String,
    secret_key: String,
    region: String,
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
}

impl Signer {
    pub fn new(endpoint: &BucketEndpoint) -> Self {
        Self {
            access_key: endpoint.access_key.clone(),
            secret_key: endpoint.secret_key.clone(),
            region: endpoint.region.clone(),
        }
    }

    /// Canonical request for a query-less path-style request
    pub fn canonical_request(
        method: &Method,
        path: &str,
        host: &str,
        amz_date: &str,
        payload_hash: &str,
    ) -> String {
        format!(
            "{}\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
            method.as_str(),
            path,
            host,
            payload_hash,
            amz_date,
            SIGNED_HEADERS,
            payload_hash
        )
    }

    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(payload);

        let canonical =
            Self::canonical_request(method, url.path(), &host_header(url)?, &amz_date, &payload_hash);
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            sha256_hex(canonical.as_bytes())
        );

        let key = signing_key(&self.secret_key, &date, &self.region, SERVICE)?;
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        Ok(SignedHeaders {
            amz_date,
            content_sha256: payload_hash,
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.access_key, scope, SIGNED_HEADERS, signature
            ),
        })
    }
}

/// `host[:port]` exactly as the HTTP client sends it
fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Configuration(format!("object store URL {} has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

// =============================================================================
// Bucket Store
// =============================================================================

/// Opens [`S3BucketStore`] connections with a shared request timeout
pub struct S3BucketStoreFactory {
    timeout: Duration,
}

impl S3BucketStoreFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BucketStoreFactory for S3BucketStoreFactory {
    fn connect(&self, endpoint: &BucketEndpoint) -> Result<BucketStoreRef> {
        Ok(Arc::new(S3BucketStore::new(endpoint, self.timeout)?))
    }
}

pub struct S3BucketStore {
    base: Url,
    http: HttpClient,
    signer: Signer,
    region: String,
}

impl S3BucketStore {
    pub fn new(endpoint: &BucketEndpoint, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&endpoint.url).map_err(|e| {
            Error::Configuration(format!("invalid object store URL {}: {}", endpoint.url, e))
        })?;
        let http = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            base,
            http,
            signer: Signer::new(endpoint),
            region: endpoint.region.clone(),
        })
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url> {
        self.base
            .join(&format!("/{}", urlencoding::encode(bucket)))
            .map_err(|e| Error::Configuration(format!("invalid bucket name {}: {}", bucket, e)))
    }

    /// Body of a create request; empty for the default region
    fn create_body(&self) -> Vec<u8> {
        if self.region.is_empty() || self.region == DEFAULT_REGION {
            return Vec::new();
        }
        format!(
            "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
            self.region
        )
        .into_bytes()
    }

    async fn send(&self, method: Method, bucket: &str, body: Vec<u8>) -> Result<reqwest::Response> {
        let url = self.bucket_url(bucket)?;
        let signed = self.signer.sign(&method, &url, &body, Utc::now())?;

        debug!("{} {}", method, url);

        let response = self
            .http
            .request(method, url)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header("authorization", signed.authorization)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let response = self.send(Method::HEAD, bucket, Vec::new()).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::ObjectStoreRequest {
                operation: "HeadBucket".to_string(),
                bucket: bucket.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let response = self.send(Method::PUT, bucket, self.create_body()).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT && body.contains(ALREADY_OWNED) {
            debug!("Bucket {} already owned by these credentials", bucket);
            return Ok(());
        }

        Err(Error::ObjectStoreRequest {
            operation: "CreateBucket".to_string(),
            bucket: bucket.to_string(),
            status: status.as_u16(),
        })
    }
}
