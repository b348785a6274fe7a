//! Istio installer
//!
//! The chart is deployed with `global.crds: false`, so the Istio CRDs are
//! registered here first. On OpenShift the Istio service accounts also need
//! the `anyuid` SCC before their pods can start.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::info;

use crate::client::ClusterApi;
use crate::crd::{Install, SecurityContextConstraints};
use crate::installer::error::{Result, RetryConfig};
use crate::installer::{ISTIO_PROFILE, Installer, InstallerOptions, ProductProfile};
use crate::resources::crds::{create_crds, crds_from_manifest, delete_crds_matching};
use crate::resources::overrides::istio_overrides;
use crate::resources::scc::{ANYUID_SCC, grant_users, service_account_user};

/// Istio CRDs registered ahead of the chart
pub const ISTIO_CRDS_MANIFEST: &str = include_str!("../../manifests/istio-crds.yaml");

/// Suffix shared by every Istio CRD name
pub const ISTIO_CRD_SUFFIX: &str = ".istio.io";

/// Service accounts created by the Istio chart that run as arbitrary UIDs
pub const ISTIO_SERVICE_ACCOUNTS: [&str; 12] = [
    "default",
    "istio-ingress-service-account",
    "prometheus",
    "istio-egressgateway-service-account",
    "istio-citadel-service-account",
    "istio-ingressgateway-service-account",
    "istio-cleanup-old-ca-service-account",
    "istio-mixer-post-install-account",
    "istio-mixer-service-account",
    "istio-pilot-service-account",
    "istio-sidecar-injector-service-account",
    "istio-galley-service-account",
];

pub struct IstioInstaller {
    crd_api: Arc<dyn ClusterApi<CustomResourceDefinition>>,
    security: Option<Arc<dyn ClusterApi<SecurityContextConstraints>>>,
    crds: Vec<CustomResourceDefinition>,
    purge_crds_on_uninstall: bool,
    retry: RetryConfig,
}

impl IstioInstaller {
    /// Parse the bundled CRD manifest and bind the cluster handles.
    ///
    /// `security` is `None` off OpenShift, which skips the SCC grant.
    pub fn new(
        crd_api: Arc<dyn ClusterApi<CustomResourceDefinition>>,
        security: Option<Arc<dyn ClusterApi<SecurityContextConstraints>>>,
        options: &InstallerOptions,
    ) -> Result<Self> {
        Self::with_manifest(ISTIO_CRDS_MANIFEST, crd_api, security, options)
    }

    /// Same as [`IstioInstaller::new`] with a caller-supplied CRD manifest
    pub fn with_manifest(
        manifest: &str,
        crd_api: Arc<dyn ClusterApi<CustomResourceDefinition>>,
        security: Option<Arc<dyn ClusterApi<SecurityContextConstraints>>>,
        options: &InstallerOptions,
    ) -> Result<Self> {
        let crds = crds_from_manifest(manifest)?;
        Ok(Self {
            crd_api,
            security,
            crds,
            purge_crds_on_uninstall: options.purge_crds_on_uninstall,
            retry: options.retry.clone(),
        })
    }

    /// CRDs parsed at construction
    pub fn crds(&self) -> &[CustomResourceDefinition] {
        &self.crds
    }

    /// Identities granted the `anyuid` SCC for a release in `namespace`
    pub fn scc_users(namespace: &str) -> Vec<String> {
        ISTIO_SERVICE_ACCOUNTS
            .iter()
            .map(|sa| service_account_user(namespace, sa))
            .collect()
    }
}

#[async_trait]
impl Installer for IstioInstaller {
    fn profile(&self) -> &ProductProfile {
        &ISTIO_PROFILE
    }

    fn overrides_yaml(&self, install: &Install) -> String {
        istio_overrides(install.spec.encryption.as_ref())
    }

    async fn pre_helm_install(&self, install: &Install) -> Result<()> {
        create_crds(self.crd_api.as_ref(), &self.crds).await?;
        info!(count = self.crds.len(), "Istio CRDs registered");

        let Some(security) = &self.security else {
            return Ok(());
        };
        let namespace = self.install_namespace(install);
        grant_users(
            security.as_ref(),
            ANYUID_SCC,
            &Self::scc_users(&namespace),
            &self.retry,
        )
        .await?;
        info!(%namespace, "Istio service accounts granted anyuid");
        Ok(())
    }

    async fn post_helm_install(&self, _install: &Install, _release_name: &str) -> Result<()> {
        Ok(())
    }

    async fn post_helm_uninstall(&self) -> Result<()> {
        if !self.purge_crds_on_uninstall {
            return Ok(());
        }
        let deleted = delete_crds_matching(self.crd_api.as_ref(), ISTIO_CRD_SUFFIX).await?;
        info!(count = deleted.len(), "Istio CRDs removed");
        Ok(())
    }
}
