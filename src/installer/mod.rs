//! Installer lifecycle protocol
//!
//! Every mesh product implements [`Installer`]. The pipeline calls the hooks
//! in a fixed order around the chart deployment:
//!
//! 1. `pre_helm_install` - cluster prerequisites (CRDs, security grants)
//! 2. chart deployment with `overrides_yaml` as values (external deployer)
//! 3. `post_helm_install` - repair of objects the chart gets wrong
//!
//! [`MeshInstaller`] is the closed set of products; it is chosen once from the
//! request's [`MeshType`] and every hook is a single `match`.

pub mod consul;
pub mod error;
pub mod istio;
pub mod pipeline;

use async_trait::async_trait;

use crate::client::ClusterClients;
use crate::crd::{Install, MeshType};

pub use consul::ConsulInstaller;
pub use error::{BackoffConfig, Error, Result, RetryConfig};
pub use istio::IstioInstaller;
pub use pipeline::{ChartDeployer, ChartRelease, InstallPhase, Pipeline};

/// Constant metadata of one mesh product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductProfile {
    /// Namespace the chart is released into unless the request overrides it
    pub default_namespace: &'static str,
    /// ClusterRoleBinding managed for the release
    pub crb_name: &'static str,
    /// Ignore namespace overrides from the request
    pub hardcoded_namespace: bool,
}

impl ProductProfile {
    /// Namespace a request resolves to under this profile
    pub fn namespace_for(&self, install: &Install) -> String {
        match &install.spec.installation_namespace {
            Some(ns) if !self.hardcoded_namespace && !ns.is_empty() => ns.clone(),
            _ => self.default_namespace.to_string(),
        }
    }
}

pub const CONSUL_PROFILE: ProductProfile = ProductProfile {
    default_namespace: "consul",
    crb_name: "consul-crb",
    hardcoded_namespace: false,
};

pub const ISTIO_PROFILE: ProductProfile = ProductProfile {
    default_namespace: "istio-system",
    crb_name: "istio-crb",
    hardcoded_namespace: false,
};

impl MeshType {
    pub fn profile(&self) -> &'static ProductProfile {
        match self {
            MeshType::Consul => &CONSUL_PROFILE,
            MeshType::Istio => &ISTIO_PROFILE,
        }
    }
}

/// Lifecycle hooks of one mesh product
#[async_trait]
pub trait Installer: Send + Sync {
    fn profile(&self) -> &ProductProfile;

    fn default_namespace(&self) -> &str {
        self.profile().default_namespace
    }

    fn use_hardcoded_namespace(&self) -> bool {
        self.profile().hardcoded_namespace
    }

    fn crb_name(&self) -> &str {
        self.profile().crb_name
    }

    /// Namespace the chart for `install` is released into
    fn install_namespace(&self, install: &Install) -> String {
        self.profile().namespace_for(install)
    }

    /// Fully resolved chart values for this request. Never fails.
    fn overrides_yaml(&self, install: &Install) -> String;

    /// Runs before the chart for `install` is deployed
    async fn pre_helm_install(&self, install: &Install) -> Result<()>;

    /// Runs after the chart is deployed as `release_name`
    async fn post_helm_install(&self, install: &Install, release_name: &str) -> Result<()>;

    /// Runs after the chart release is removed
    async fn post_helm_uninstall(&self) -> Result<()> {
        Ok(())
    }
}

/// Knobs that are not part of the install request
#[derive(Clone, Debug, Default)]
pub struct InstallerOptions {
    /// Remove product CRDs after uninstall. They are left registered by default
    /// because other releases may still use them.
    pub purge_crds_on_uninstall: bool,
    /// Conflict retry for security policy grants
    pub retry: RetryConfig,
}

/// One installer per supported product
pub enum MeshInstaller {
    Consul(ConsulInstaller),
    Istio(IstioInstaller),
}

impl MeshInstaller {
    /// Select and construct the installer for `mesh`
    pub fn new(
        mesh: MeshType,
        clients: &ClusterClients,
        options: &InstallerOptions,
    ) -> Result<Self> {
        let installer = match mesh {
            MeshType::Consul => MeshInstaller::Consul(ConsulInstaller::new(clients.webhooks.clone())),
            MeshType::Istio => MeshInstaller::Istio(IstioInstaller::new(
                clients.crds.clone(),
                clients.security.clone(),
                options,
            )?),
        };
        tracing::debug!(mesh = %mesh, "Selected installer");
        Ok(installer)
    }

    pub fn mesh_type(&self) -> MeshType {
        match self {
            MeshInstaller::Consul(_) => MeshType::Consul,
            MeshInstaller::Istio(_) => MeshType::Istio,
        }
    }
}

#[async_trait]
impl Installer for MeshInstaller {
    fn profile(&self) -> &ProductProfile {
        match self {
            MeshInstaller::Consul(i) => i.profile(),
            MeshInstaller::Istio(i) => i.profile(),
        }
    }

    fn overrides_yaml(&self, install: &Install) -> String {
        match self {
            MeshInstaller::Consul(i) => i.overrides_yaml(install),
            MeshInstaller::Istio(i) => i.overrides_yaml(install),
        }
    }

    async fn pre_helm_install(&self, install: &Install) -> Result<()> {
        match self {
            MeshInstaller::Consul(i) => i.pre_helm_install(install).await,
            MeshInstaller::Istio(i) => i.pre_helm_install(install).await,
        }
    }

    async fn post_helm_install(&self, install: &Install, release_name: &str) -> Result<()> {
        match self {
            MeshInstaller::Consul(i) => i.post_helm_install(install, release_name).await,
            MeshInstaller::Istio(i) => i.post_helm_install(install, release_name).await,
        }
    }

    async fn post_helm_uninstall(&self) -> Result<()> {
        match self {
            MeshInstaller::Consul(i) => i.post_helm_uninstall().await,
            MeshInstaller::Istio(i) => i.post_helm_uninstall().await,
        }
    }
}
