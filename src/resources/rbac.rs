//! ClusterRoleBinding for the mesh installation namespace
//!
//! Binds `cluster-admin` to the default service account of the namespace the
//! chart is released into. The binding name comes from the installer
//! (`consul-crb`, `istio-crb`).

use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use crate::client::ClusterApi;
use crate::installer::error::{Error, Result, is_already_exists, is_not_found};
use crate::resources::common::standard_labels;

const CLUSTER_ADMIN_ROLE: &str = "cluster-admin";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Build the binding for `namespace`
pub fn cluster_role_binding(name: &str, namespace: &str, mesh: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(standard_labels(mesh)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: CLUSTER_ADMIN_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: "default".to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Create the binding unless one with that name already exists
pub async fn ensure_cluster_role_binding(
    api: &dyn ClusterApi<ClusterRoleBinding>,
    name: &str,
    namespace: &str,
    mesh: &str,
) -> Result<()> {
    let crb = cluster_role_binding(name, namespace, mesh);
    match api.create(&crb).await {
        Ok(_) => {
            info!(name, namespace, "Created cluster role binding");
            Ok(())
        }
        Err(e) if is_already_exists(&e) => {
            debug!(name, "Cluster role binding already exists");
            Ok(())
        }
        Err(source) => Err(Error::RoleBinding {
            name: name.to_string(),
            source,
        }),
    }
}

/// Delete the binding; a missing binding is fine
pub async fn remove_cluster_role_binding(
    api: &dyn ClusterApi<ClusterRoleBinding>,
    name: &str,
) -> Result<()> {
    match api.delete(name).await {
        Ok(()) => {
            info!(name, "Deleted cluster role binding");
            Ok(())
        }
        Err(e) if is_not_found(&e) => Ok(()),
        Err(source) => Err(Error::RoleBinding {
            name: name.to_string(),
            source,
        }),
    }
}
