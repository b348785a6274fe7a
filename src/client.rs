//! Cluster API seam used by the installer hooks
//!
//! The hooks only need a handful of verbs on cluster-scoped objects. They go
//! through [`ClusterApi`] so the same code runs against a live API server
//! (via `kube::Api`) and against mocks in tests.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[cfg(test)]
use mockall::automock;

use crate::crd::SecurityContextConstraints;

/// Get/create/replace/delete/list on objects of kind `K`
///
/// Errors are returned as raw `kube::Error` so callers can classify
/// AlreadyExists, NotFound and Conflict the same way for every backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi<K: Send + Sync + 'static>: Send + Sync {
    /// Fetch an object by name
    async fn get(&self, name: &str) -> Result<K, kube::Error>;

    /// Create a new object; fails with 409 AlreadyExists if the name is taken
    async fn create(&self, obj: &K) -> Result<K, kube::Error>;

    /// Write the full object back; fails with 409 Conflict on a stale resourceVersion
    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error>;

    /// Delete an object by name
    async fn delete(&self, name: &str) -> Result<(), kube::Error>;

    /// Names of all objects of this kind
    async fn list_names(&self) -> Result<Vec<String>, kube::Error>;
}

#[async_trait]
impl<K> ClusterApi<K> for Api<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<K, kube::Error> {
        Api::get(self, name).await
    }

    async fn create(&self, obj: &K) -> Result<K, kube::Error> {
        Api::create(self, &PostParams::default(), obj).await
    }

    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error> {
        Api::replace(self, name, &PostParams::default(), obj).await
    }

    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        Api::delete(self, name, &DeleteParams::default())
            .await
            .map(|_| ())
    }

    async fn list_names(&self) -> Result<Vec<String>, kube::Error> {
        let list = Api::list(self, &ListParams::default()).await?;
        Ok(list.items.iter().map(|obj| obj.name_any()).collect())
    }
}

/// Handles to every cluster API the installers may touch
#[derive(Clone)]
pub struct ClusterClients {
    pub crds: Arc<dyn ClusterApi<CustomResourceDefinition>>,
    pub webhooks: Arc<dyn ClusterApi<MutatingWebhookConfiguration>>,
    pub role_bindings: Arc<dyn ClusterApi<ClusterRoleBinding>>,
    /// Only present on OpenShift clusters
    pub security: Option<Arc<dyn ClusterApi<SecurityContextConstraints>>>,
}

impl ClusterClients {
    /// Build all handles from one kube client.
    ///
    /// `openshift` controls whether the SecurityContextConstraints API is
    /// wired in; on vanilla Kubernetes that group does not exist.
    pub fn from_client(client: Client, openshift: bool) -> Self {
        let security: Option<Arc<dyn ClusterApi<SecurityContextConstraints>>> = if openshift {
            Some(Arc::new(Api::<SecurityContextConstraints>::all(
                client.clone(),
            )))
        } else {
            None
        };

        Self {
            crds: Arc::new(Api::<CustomResourceDefinition>::all(client.clone())),
            webhooks: Arc::new(Api::<MutatingWebhookConfiguration>::all(client.clone())),
            role_bindings: Arc::new(Api::<ClusterRoleBinding>::all(client)),
            security,
        }
    }
}
