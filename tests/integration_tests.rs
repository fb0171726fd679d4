//! End-to-end storage reconciliation against the in-memory collaborators

use cluster_storage_operator::crd::{
    AzureSpec, GcsSpec, HarborCluster, HarborClusterSpec, InClusterSpec, OssSpec, S3Spec,
    StorageSpec, SwiftSpec,
};
use cluster_storage_operator::storage::{reason, ConditionKind, CREDS_SECRET_PROPERTY};
use cluster_storage_operator::{
    Error, InMemoryBuckets, InMemoryClusterClient, ObjectKey, StorageReconciler, StorageSettings,
};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use std::sync::Arc;

const NAMESPACE: &str = "registry";
const VERSION: &str = "RELEASE.2020-01-03T19-12-21Z";

// =============================================================================
// Fixtures
// =============================================================================

struct Harness {
    client: Arc<InMemoryClusterClient>,
    buckets: InMemoryBuckets,
    reconciler: StorageReconciler,
}

impl Harness {
    fn new() -> Self {
        let client = Arc::new(InMemoryClusterClient::new());
        let buckets = InMemoryBuckets::new();
        let reconciler = StorageReconciler::new(
            client.clone(),
            Arc::new(buckets.clone()),
            StorageSettings::default(),
        );
        Self {
            client,
            buckets,
            reconciler,
        }
    }
}

fn cluster(storage: StorageSpec) -> HarborCluster {
    let mut cluster = HarborCluster::new("demo", HarborClusterSpec { storage });
    cluster.metadata.namespace = Some(NAMESPACE.into());
    cluster.metadata.uid = Some("8d3c5a8e-0000-4000-8000-000000000001".into());
    cluster
}

fn in_cluster(replicas: i32) -> StorageSpec {
    StorageSpec {
        kind: "inCluster".into(),
        in_cluster: Some(InClusterSpec {
            replicas,
            version: VERSION.into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn in_cluster_version(replicas: i32, version: &str) -> StorageSpec {
    let mut spec = in_cluster(replicas);
    if let Some(in_cluster) = spec.in_cluster.as_mut() {
        in_cluster.version = version.into();
    }
    spec
}

fn s3(bucket: &str) -> StorageSpec {
    StorageSpec {
        kind: "s3".into(),
        s3: Some(S3Spec {
            region: "us-west-2".into(),
            bucket: bucket.into(),
            access_key: "AKIAEXAMPLE".into(),
            secret_key: "secret".into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn external_specs() -> Vec<(StorageSpec, &'static str)> {
    vec![
        (s3("registry"), "s3Secret"),
        (
            StorageSpec {
                kind: "azure".into(),
                azure: Some(AzureSpec {
                    account_name: "account".into(),
                    account_key: "key".into(),
                    container: "registry".into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            "azureSecret",
        ),
        (
            StorageSpec {
                kind: "gcs".into(),
                gcs: Some(GcsSpec {
                    bucket: "registry".into(),
                    encoded_key: "eyJrZXkiOiJ2YWx1ZSJ9".into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            "gcsSecret",
        ),
        (
            StorageSpec {
                kind: "swift".into(),
                swift: Some(SwiftSpec {
                    auth_url: "https://keystone.example.com/v3".into(),
                    username: "registry".into(),
                    password: "password".into(),
                    container: "registry".into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            "swiftSecret",
        ),
        (
            StorageSpec {
                kind: "oss".into(),
                oss: Some(OssSpec {
                    access_key_id: "LTAIEXAMPLE".into(),
                    access_key_secret: "secret".into(),
                    region: "oss-cn-hangzhou".into(),
                    bucket: "registry".into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            "ossSecret",
        ),
    ]
}

fn minio_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, "demo")
}

fn creds_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, "demo-minio-creds-secret")
}

fn external_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, "demo-harbor-cluster-storage")
}

// =============================================================================
// In-Cluster
// =============================================================================

#[tokio::test]
async fn test_in_cluster_end_to_end() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));

    // First pass provisions everything and waits
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.kind, ConditionKind::Unknown);
    assert_eq!(status.reason, reason::PROVISIONING);
    assert!(status.properties.is_none());
    assert_eq!(
        harness.client.created(),
        vec![
            "Secret/registry/demo-minio-creds-secret",
            "Service/registry/demo-minio-service",
            "MinIOInstance/registry/demo",
        ]
    );

    // The StatefulSet is not there yet
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.kind, ConditionKind::Unknown);
    assert_eq!(status.reason, reason::WAITING_FOR_REPLICAS);

    // Partially ready
    harness.client.set_ready_replicas(&minio_key(), 3);
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.kind, ConditionKind::Unknown);
    assert!(harness.buckets.connections().is_empty());

    // All servers ready: bucket bootstrap and Ready
    harness.client.set_ready_replicas(&minio_key(), 4);
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.kind, ConditionKind::Ready);
    let properties = status.properties.as_ref().unwrap();
    assert_eq!(properties.len(), 1);
    assert_eq!(
        status.property(CREDS_SECRET_PROPERTY),
        Some("demo-minio-creds-secret")
    );

    assert!(harness
        .buckets
        .contains("http://demo-minio-service.registry:9000", "harbor"));

    // The bucket store was reached with the stored credentials
    let secret = harness.client.secret(&creds_key()).unwrap();
    let data = secret.data.unwrap();
    let connection = &harness.buckets.connections()[0];
    assert_eq!(connection.access_key.as_bytes(), data["accesskey"].0.as_slice());
    assert_eq!(connection.secret_key.as_bytes(), data["secretkey"].0.as_slice());
    assert_eq!(connection.region, "us-east-1");
}

#[tokio::test]
async fn test_in_cluster_reconcile_is_idempotent() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));

    harness.reconciler.reconcile(&cluster).await.unwrap();
    harness.client.set_ready_replicas(&minio_key(), 4);

    let first = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    let second = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();

    assert_eq!(first.kind, ConditionKind::Ready);
    assert_eq!(second.kind, ConditionKind::Ready);
    assert_eq!(first.properties, second.properties);
    assert_eq!(harness.client.created().len(), 3);
    assert!(harness.client.updated().is_empty());
    assert_eq!(harness.buckets.created().len(), 1);
}

#[tokio::test]
async fn test_retry_after_partial_provision_keeps_credentials() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));

    harness.client.fail_creates("MinIOInstance");
    let err = harness.reconciler.reconcile(&cluster).await.unwrap_err();
    assert_eq!(err.reason(), reason::CREATE_MINIO_CR);
    assert_eq!(err.status.kind, ConditionKind::NotReady);
    let original = harness.client.secret(&creds_key()).unwrap();

    harness.client.heal();
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.reason, reason::PROVISIONING);

    let retained = harness.client.secret(&creds_key()).unwrap();
    assert_eq!(original.data, retained.data);
    assert!(harness.client.minio_instance(&minio_key()).is_some());
}

#[tokio::test]
async fn test_scale_distributed() {
    let harness = Harness::new();
    harness.reconciler.reconcile(&cluster(in_cluster(4))).await.unwrap();

    let status = harness
        .reconciler
        .reconcile(&cluster(in_cluster(8)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.kind, ConditionKind::Unknown);
    assert_eq!(status.reason, reason::SCALING);

    let instance = harness.client.minio_instance(&minio_key()).unwrap();
    assert_eq!(instance.servers(), 8);
    assert_eq!(instance.spec.zones.len(), 1);
    assert_eq!(harness.client.updated(), vec!["MinIOInstance/registry/demo"]);

    // Readiness is judged against the new count
    harness.client.set_ready_replicas(&minio_key(), 4);
    let status = harness
        .reconciler
        .reconcile(&cluster(in_cluster(8)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.reason, reason::WAITING_FOR_REPLICAS);
}

#[tokio::test]
async fn test_standalone_cannot_become_distributed() {
    let harness = Harness::new();
    harness.reconciler.reconcile(&cluster(in_cluster(1))).await.unwrap();

    let err = harness
        .reconciler
        .reconcile(&cluster(in_cluster(4)))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::SCALE_MINIO);
    assert!(matches!(err.source, Error::StandaloneToDistributed { desired: 4 }));
    assert!(harness.client.updated().is_empty());
}

#[tokio::test]
async fn test_bucket_failure_is_not_ready() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));
    harness.reconciler.reconcile(&cluster).await.unwrap();
    harness.client.set_ready_replicas(&minio_key(), 4);

    harness.buckets.fail_requests(503);
    let err = harness.reconciler.reconcile(&cluster).await.unwrap_err();
    assert_eq!(err.reason(), reason::CREATE_DEFAULT_BUCKET);
    assert!(err.status.properties.is_none());
    assert!(err.source.is_retryable());
}

#[tokio::test]
async fn test_extra_ready_replicas_keep_waiting() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));
    harness.reconciler.reconcile(&cluster).await.unwrap();

    harness.client.set_ready_replicas(&minio_key(), 5);
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.kind, ConditionKind::Unknown);
    assert_eq!(status.reason, reason::WAITING_FOR_REPLICAS);
    assert!(harness.buckets.connections().is_empty());
}

#[tokio::test]
async fn test_first_provision_with_invalid_count_creates_nothing() {
    let harness = Harness::new();

    let err = harness
        .reconciler
        .reconcile(&cluster(in_cluster(2)))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::INVALID_STORAGE_SPEC);
    assert!(matches!(err.source, Error::InvalidReplicaCount { replicas: 2 }));
    assert!(harness.client.created().is_empty());
}

#[tokio::test]
async fn test_image_update_failure_is_not_ready() {
    let harness = Harness::new();
    harness.reconciler.reconcile(&cluster(in_cluster(4))).await.unwrap();

    harness.client.fail_updates("MinIOInstance");
    let err = harness
        .reconciler
        .reconcile(&cluster(in_cluster_version(4, "RELEASE.2021-01-01T00-00-00Z")))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::UPDATE_MINIO);
    assert_eq!(err.status.kind, ConditionKind::NotReady);
    assert!(err.source.is_transient());

    let instance = harness.client.minio_instance(&minio_key()).unwrap();
    assert_eq!(instance.image(), format!("minio/minio:{}", VERSION));
    assert!(harness.client.updated().is_empty());
}

#[tokio::test]
async fn test_stateful_set_lookup_failure() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));
    harness.reconciler.reconcile(&cluster).await.unwrap();

    harness.client.fail_gets("StatefulSet");
    let err = harness.reconciler.reconcile(&cluster).await.unwrap_err();
    assert_eq!(err.reason(), reason::GET_MINIO_STATEFULSET);
    assert!(err.source.is_transient());
}

#[tokio::test]
async fn test_missing_credentials_block_bucket_bootstrap() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));
    harness.reconciler.reconcile(&cluster).await.unwrap();
    harness.client.set_ready_replicas(&minio_key(), 4);

    // Someone stripped the keys from the credential secret
    harness.client.insert_secret(Secret {
        metadata: ObjectMeta {
            name: Some(creds_key().name),
            namespace: Some(NAMESPACE.into()),
            ..Default::default()
        },
        ..Default::default()
    });

    let err = harness.reconciler.reconcile(&cluster).await.unwrap_err();
    assert_eq!(err.reason(), reason::GET_MINIO_CREDS);
    assert!(matches!(err.source, Error::MissingCredentials { .. }));
    assert!(harness.buckets.connections().is_empty());
}

#[tokio::test]
async fn test_unreachable_bucket_store_recovers() {
    let harness = Harness::new();
    let cluster = cluster(in_cluster(4));
    harness.reconciler.reconcile(&cluster).await.unwrap();
    harness.client.set_ready_replicas(&minio_key(), 4);

    harness.buckets.set_unreachable(true);
    let err = harness.reconciler.reconcile(&cluster).await.unwrap_err();
    assert_eq!(err.reason(), reason::CREATE_DEFAULT_BUCKET);
    assert!(harness.buckets.created().is_empty());

    harness.buckets.set_unreachable(false);
    let status = harness.reconciler.reconcile(&cluster).await.unwrap().unwrap();
    assert_eq!(status.kind, ConditionKind::Ready);
    assert_eq!(harness.buckets.created().len(), 1);
}

// =============================================================================
// External
// =============================================================================

#[tokio::test]
async fn test_every_external_kind_provisions_one_secret() {
    for (spec, property) in external_specs() {
        let harness = Harness::new();
        let kind = spec.kind.clone();

        let status = harness
            .reconciler
            .reconcile(&cluster(spec))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(status.kind, ConditionKind::Ready, "kind {}", kind);
        assert_eq!(
            status.property(property),
            Some("demo-harbor-cluster-storage"),
            "kind {}",
            kind
        );
        assert_eq!(status.properties.as_ref().unwrap().len(), 1);
        assert_eq!(
            harness.client.created(),
            vec!["Secret/registry/demo-harbor-cluster-storage"]
        );
    }
}

#[tokio::test]
async fn test_unknown_kind_has_no_side_effects() {
    let harness = Harness::new();
    let spec = StorageSpec {
        kind: "ceph".into(),
        ..Default::default()
    };

    let err = harness.reconciler.reconcile(&cluster(spec)).await.unwrap_err();
    assert_eq!(err.reason(), reason::NO_MATCHING_PROVISIONER);
    assert_eq!(err.status.kind, ConditionKind::NotReady);
    assert!(err.status.properties.is_none());
    assert!(harness.client.created().is_empty());
}

#[tokio::test]
async fn test_missing_bundle_is_invalid_spec() {
    let harness = Harness::new();
    let spec = StorageSpec {
        kind: "azure".into(),
        ..Default::default()
    };

    let err = harness.reconciler.reconcile(&cluster(spec)).await.unwrap_err();
    assert_eq!(err.reason(), reason::INVALID_STORAGE_SPEC);
    assert!(harness.client.created().is_empty());
}

#[tokio::test]
async fn test_external_drift_is_corrected() {
    let harness = Harness::new();
    harness.reconciler.reconcile(&cluster(s3("a"))).await.unwrap();

    // Identical spec: nothing to do
    assert!(harness
        .reconciler
        .reconcile(&cluster(s3("a")))
        .await
        .unwrap()
        .is_none());

    // Bucket changed: the secret is rewritten in place
    let status = harness
        .reconciler
        .reconcile(&cluster(s3("b")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.kind, ConditionKind::Ready);
    assert_eq!(status.reason, reason::EXTERNAL_SECRET_DRIFTED);
    assert_eq!(status.property("s3Secret"), Some("demo-harbor-cluster-storage"));

    let secret = harness.client.secret(&external_key()).unwrap();
    assert_eq!(secret.data.unwrap()["bucket"].0, b"b");
    assert_eq!(
        harness.client.updated(),
        vec!["Secret/registry/demo-harbor-cluster-storage"]
    );
    assert_eq!(harness.client.created().len(), 1);

    // Converged again
    assert!(harness
        .reconciler
        .reconcile(&cluster(s3("b")))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_external_lookup_failure() {
    let harness = Harness::new();
    harness.client.fail_gets("Secret");

    let err = harness
        .reconciler
        .reconcile(&cluster(s3("registry")))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::GET_EXTERNAL_SECRET);
    assert!(err.source.is_transient());
    assert!(harness.client.created().is_empty());
}

#[tokio::test]
async fn test_external_create_failure_uses_provider_reason() {
    let harness = Harness::new();
    harness.client.fail_creates("Secret");

    let err = harness
        .reconciler
        .reconcile(&cluster(s3("registry")))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::CREATE_S3_SECRET);
}

#[tokio::test]
async fn test_external_update_failure_keeps_secret() {
    let harness = Harness::new();
    harness.reconciler.reconcile(&cluster(s3("a"))).await.unwrap();

    harness.client.fail_updates("Secret");
    let err = harness
        .reconciler
        .reconcile(&cluster(s3("b")))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::UPDATE_EXTERNAL_SECRET);
    assert!(err.status.properties.is_none());

    let secret = harness.client.secret(&external_key()).unwrap();
    assert_eq!(secret.data.unwrap()["bucket"].0, b"a");
    assert!(harness.client.updated().is_empty());
}
