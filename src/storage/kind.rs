//! Storage kind resolution
//!
//! Turns the loosely typed storage declaration of the cluster resource into a
//! closed sum type. Every later decision matches on [`StorageBackend`], so an
//! unsupported kind is rejected here once instead of falling through later.

use crate::crd::{AzureSpec, GcsSpec, InClusterSpec, OssSpec, S3Spec, StorageSpec, SwiftSpec};
use crate::error::{Error, Result};
use crate::storage::external::SecretSource;
use std::str::FromStr;

/// Storage kinds a cluster may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    InCluster,
    S3,
    Azure,
    Gcs,
    Swift,
    Oss,
}

impl StorageKind {
    pub const ALL: [StorageKind; 6] = [
        StorageKind::InCluster,
        StorageKind::S3,
        StorageKind::Azure,
        StorageKind::Gcs,
        StorageKind::Swift,
        StorageKind::Oss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::InCluster => "inCluster",
            StorageKind::S3 => "s3",
            StorageKind::Azure => "azure",
            StorageKind::Gcs => "gcs",
            StorageKind::Swift => "swift",
            StorageKind::Oss => "oss",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StorageKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::NoMatchingProvisioner {
                kind: s.to_string(),
            })
    }
}

// =============================================================================
// Resolved Backend
// =============================================================================

/// An external provider together with its configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalBackend {
    S3(S3Spec),
    Azure(AzureSpec),
    Gcs(GcsSpec),
    Swift(SwiftSpec),
    Oss(OssSpec),
}

impl ExternalBackend {
    /// The provider's secret-producing capability
    pub fn source(&self) -> &dyn SecretSource {
        match self {
            ExternalBackend::S3(spec) => spec,
            ExternalBackend::Azure(spec) => spec,
            ExternalBackend::Gcs(spec) => spec,
            ExternalBackend::Swift(spec) => spec,
            ExternalBackend::Oss(spec) => spec,
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            ExternalBackend::S3(_) => StorageKind::S3,
            ExternalBackend::Azure(_) => StorageKind::Azure,
            ExternalBackend::Gcs(_) => StorageKind::Gcs,
            ExternalBackend::Swift(_) => StorageKind::Swift,
            ExternalBackend::Oss(_) => StorageKind::Oss,
        }
    }
}

/// The single active storage mode of a cluster
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    InCluster(InClusterSpec),
    External(ExternalBackend),
}

impl StorageBackend {
    /// Resolve and validate the declaration. Only the bundle matching `kind`
    /// is inspected; it must be present and carry its required fields.
    pub fn resolve(spec: &StorageSpec) -> Result<Self> {
        let kind: StorageKind = spec.kind.parse()?;

        let backend = match kind {
            StorageKind::InCluster => {
                let in_cluster = required(spec.in_cluster.as_ref(), kind)?;
                validate_in_cluster(in_cluster)?;
                return Ok(StorageBackend::InCluster(in_cluster.clone()));
            }
            StorageKind::S3 => ExternalBackend::S3(required(spec.s3.as_ref(), kind)?.clone()),
            StorageKind::Azure => {
                ExternalBackend::Azure(required(spec.azure.as_ref(), kind)?.clone())
            }
            StorageKind::Gcs => ExternalBackend::Gcs(required(spec.gcs.as_ref(), kind)?.clone()),
            StorageKind::Swift => {
                ExternalBackend::Swift(required(spec.swift.as_ref(), kind)?.clone())
            }
            StorageKind::Oss => ExternalBackend::Oss(required(spec.oss.as_ref(), kind)?.clone()),
        };

        backend.source().validate()?;
        Ok(StorageBackend::External(backend))
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            StorageBackend::InCluster(_) => StorageKind::InCluster,
            StorageBackend::External(external) => external.kind(),
        }
    }
}

fn required<T>(bundle: Option<&T>, kind: StorageKind) -> Result<&T> {
    bundle.ok_or_else(|| {
        Error::InvalidStorageSpec(format!("storage.{} is required for kind {}", kind, kind))
    })
}

fn validate_in_cluster(spec: &InClusterSpec) -> Result<()> {
    if spec.replicas < 1 {
        return Err(Error::InvalidStorageSpec(format!(
            "storage.inCluster.replicas must be at least 1, got {}",
            spec.replicas
        )));
    }
    if spec.version.trim().is_empty() {
        return Err(Error::InvalidStorageSpec(
            "storage.inCluster.version is required".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn s3() -> S3Spec {
        S3Spec {
            region: "us-west-2".into(),
            bucket: "registry".into(),
            access_key: "AKID".into(),
            secret_key: "SECRET".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in StorageKind::ALL {
            assert_eq!(kind.as_str().parse::<StorageKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_has_no_provisioner() {
        let err = "ceph".parse::<StorageKind>().unwrap_err();
        assert_matches!(err, Error::NoMatchingProvisioner { kind } if kind == "ceph");

        // Kinds are case sensitive
        assert!("S3".parse::<StorageKind>().is_err());
        assert!("".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_resolve_external() {
        let spec = StorageSpec {
            kind: "s3".into(),
            s3: Some(s3()),
            ..Default::default()
        };
        let backend = StorageBackend::resolve(&spec).unwrap();
        assert_eq!(backend.kind(), StorageKind::S3);
        assert_matches!(backend, StorageBackend::External(ExternalBackend::S3(_)));
    }

    #[test]
    fn test_resolve_ignores_other_bundles() {
        // A stale, incomplete azure bundle must not matter when kind is s3
        let spec = StorageSpec {
            kind: "s3".into(),
            s3: Some(s3()),
            azure: Some(AzureSpec::default()),
            ..Default::default()
        };
        assert!(StorageBackend::resolve(&spec).is_ok());
    }

    #[test]
    fn test_resolve_missing_bundle() {
        let spec = StorageSpec {
            kind: "gcs".into(),
            ..Default::default()
        };
        assert_matches!(
            StorageBackend::resolve(&spec),
            Err(Error::InvalidStorageSpec(msg)) if msg.contains("storage.gcs")
        );
    }

    #[test]
    fn test_resolve_empty_required_field() {
        let mut bundle = s3();
        bundle.bucket = "  ".into();
        let spec = StorageSpec {
            kind: "s3".into(),
            s3: Some(bundle),
            ..Default::default()
        };
        assert_matches!(
            StorageBackend::resolve(&spec),
            Err(Error::InvalidStorageSpec(msg)) if msg.contains("bucket")
        );
    }

    #[test]
    fn test_resolve_in_cluster() {
        let spec = StorageSpec {
            kind: "inCluster".into(),
            in_cluster: Some(InClusterSpec {
                replicas: 4,
                version: "RELEASE.1".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(
            StorageBackend::resolve(&spec),
            Ok(StorageBackend::InCluster(s)) if s.replicas == 4
        );

        let spec = StorageSpec {
            kind: "inCluster".into(),
            in_cluster: Some(InClusterSpec {
                replicas: 0,
                version: "RELEASE.1".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(
            StorageBackend::resolve(&spec),
            Err(Error::InvalidStorageSpec(_))
        );
    }
}
