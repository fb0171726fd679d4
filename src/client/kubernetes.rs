//! Kubernetes API adapter for [`ClusterClient`]

use crate::crd::MinIOInstance;
use crate::domain::ports::{ClusterClient, ObjectKey};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// [`ClusterClient`] backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    async fn get<K>(&self, key: &ObjectKey) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn create<K>(&self, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = object_key(object)?;
        let kind = K::kind(&Default::default()).to_string();
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);

        match api.create(&self.post_params(), object).await {
            Ok(_) => {
                debug!("Created {} {}", kind, key);
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::ResourceExists {
                kind,
                name: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace<K>(&self, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = object_key(object)?;
        let kind = K::kind(&Default::default()).to_string();
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);

        match api.replace(&key.name, &self.post_params(), object).await {
            Ok(_) => {
                debug!("Replaced {} {}", kind, key);
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::ResourceNotFound {
                kind,
                name: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn object_key<K: Resource>(object: &K) -> Result<ObjectKey> {
    let namespace = object.namespace().ok_or_else(|| {
        Error::Internal(format!("{} has no namespace", object.name_any()))
    })?;
    Ok(ObjectKey::new(namespace, object.name_any()))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>> {
        self.get(key).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        self.create(secret).await
    }

    async fn update_secret(&self, secret: &Secret) -> Result<()> {
        self.replace(secret).await
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        self.create(service).await
    }

    async fn get_minio_instance(&self, key: &ObjectKey) -> Result<Option<MinIOInstance>> {
        self.get(key).await
    }

    async fn create_minio_instance(&self, instance: &MinIOInstance) -> Result<()> {
        self.create(instance).await
    }

    async fn update_minio_instance(&self, instance: &MinIOInstance) -> Result<()> {
        self.replace(instance).await
    }

    async fn get_stateful_set(&self, key: &ObjectKey) -> Result<Option<StatefulSet>> {
        self.get(key).await
    }
}
