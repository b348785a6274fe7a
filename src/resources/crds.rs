//! CustomResourceDefinition bootstrap
//!
//! Some charts are rendered with their CRDs turned off (`global.crds: false`
//! for Istio), so the definitions have to be registered before the chart is
//! installed. Creation is idempotent: a definition that is already present is
//! left alone.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;
use serde::Deserialize;
use tracing::{debug, info};

use crate::client::ClusterApi;
use crate::installer::error::{Error, Result, is_already_exists, is_not_found};

const CRD_KIND: &str = "CustomResourceDefinition";

/// Parse every CRD out of a multi-document YAML manifest.
///
/// Empty and comment-only documents are skipped. Any other kind is rejected,
/// since the manifest is expected to contain definitions only.
pub fn crds_from_manifest(manifest: &str) -> Result<Vec<CustomResourceDefinition>> {
    let mut crds = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default();
        if kind != CRD_KIND {
            return Err(Error::InvalidManifest(format!(
                "expected {CRD_KIND}, found kind {kind:?}"
            )));
        }

        let crd: CustomResourceDefinition = serde_yaml::from_value(value)?;
        if crd.metadata.name.as_deref().is_none_or(str::is_empty) {
            return Err(Error::InvalidManifest(
                "CustomResourceDefinition without metadata.name".to_string(),
            ));
        }
        crds.push(crd);
    }
    Ok(crds)
}

/// Create each CRD in order.
///
/// AlreadyExists counts as success. Any other failure stops the loop and is
/// returned with the offending CRD name; definitions created before it stay
/// registered.
pub async fn create_crds(
    api: &dyn ClusterApi<CustomResourceDefinition>,
    crds: &[CustomResourceDefinition],
) -> Result<()> {
    for crd in crds {
        let name = crd.name_any();
        match api.create(crd).await {
            Ok(_) => info!(crd = %name, "Created CRD"),
            Err(e) if is_already_exists(&e) => debug!(crd = %name, "CRD already registered"),
            Err(source) => return Err(Error::CrdCreate { name, source }),
        }
    }
    Ok(())
}

/// Delete every registered CRD whose name ends with `suffix`
/// (e.g. `.istio.io`). Returns the names that were removed.
pub async fn delete_crds_matching(
    api: &dyn ClusterApi<CustomResourceDefinition>,
    suffix: &str,
) -> Result<Vec<String>> {
    let names = api.list_names().await?;
    let mut deleted = Vec::new();
    for name in names.into_iter().filter(|n| n.ends_with(suffix)) {
        match api.delete(&name).await {
            Ok(()) => {
                info!(crd = %name, "Deleted CRD");
                deleted.push(name);
            }
            Err(e) if is_not_found(&e) => debug!(crd = %name, "CRD already gone"),
            Err(source) => return Err(Error::CrdDelete { name, source }),
        }
    }
    Ok(deleted)
}
