//! Fixed install and uninstall sequences around an external chart deployer

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use tracing::{info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::client::ClusterApi;
use crate::crd::Install;
use crate::installer::Installer;
use crate::installer::error::{Error, Result};
use crate::resources::overrides::unresolved_tokens;
use crate::resources::rbac::{ensure_cluster_role_binding, remove_cluster_role_binding};

/// Everything the deployer needs to install or remove a chart release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRelease {
    pub name: String,
    pub namespace: String,
    /// Chart reference (repo/chart, path or URL)
    pub chart: String,
    /// Rendered values YAML
    pub values: String,
}

/// Deploys and removes chart releases (helm or equivalent)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChartDeployer: Send + Sync {
    async fn deploy(&self, release: &ChartRelease) -> Result<()>;

    async fn uninstall(&self, release: &ChartRelease) -> Result<()>;
}

/// Steps of the install and uninstall sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallPhase {
    PreInstall,
    RoleBinding,
    ChartDeploy,
    PostInstall,
    Complete,
    ChartUninstall,
    PostUninstall,
    RoleBindingRemoved,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallPhase::PreInstall => write!(f, "PreInstall"),
            InstallPhase::RoleBinding => write!(f, "RoleBinding"),
            InstallPhase::ChartDeploy => write!(f, "ChartDeploy"),
            InstallPhase::PostInstall => write!(f, "PostInstall"),
            InstallPhase::Complete => write!(f, "Complete"),
            InstallPhase::ChartUninstall => write!(f, "ChartUninstall"),
            InstallPhase::PostUninstall => write!(f, "PostUninstall"),
            InstallPhase::RoleBindingRemoved => write!(f, "RoleBindingRemoved"),
        }
    }
}

/// Tag an error with the phase it happened in
fn in_phase(phase: InstallPhase) -> impl FnOnce(Error) -> Error {
    move |source| Error::PhaseFailed {
        phase,
        source: Box::new(source),
    }
}

/// Runs an installer's hooks around a chart deployer, one step at a time.
///
/// Nothing is rolled back on failure; the error names the phase reached.
pub struct Pipeline<'a, I: Installer + ?Sized> {
    installer: &'a I,
    deployer: &'a dyn ChartDeployer,
    role_bindings: &'a dyn ClusterApi<ClusterRoleBinding>,
}

impl<'a, I: Installer + ?Sized> Pipeline<'a, I> {
    pub fn new(
        installer: &'a I,
        deployer: &'a dyn ChartDeployer,
        role_bindings: &'a dyn ClusterApi<ClusterRoleBinding>,
    ) -> Self {
        Self {
            installer,
            deployer,
            role_bindings,
        }
    }

    /// Release description for `install`
    pub fn release(&self, install: &Install, release_name: &str, chart: &str) -> ChartRelease {
        ChartRelease {
            name: release_name.to_string(),
            namespace: self.installer.install_namespace(install),
            chart: chart.to_string(),
            values: self.installer.overrides_yaml(install),
        }
    }

    /// PreInstall -> RoleBinding -> ChartDeploy -> PostInstall
    #[instrument(skip(self, install), fields(mesh = %install.spec.mesh_type))]
    pub async fn install(
        &self,
        install: &Install,
        release_name: &str,
        chart: &str,
    ) -> Result<ChartRelease> {
        let release = self.release(install, release_name, chart);
        let leftover = unresolved_tokens(&release.values);
        if !leftover.is_empty() {
            return Err(Error::UnresolvedTokens(leftover));
        }

        info!(phase = %InstallPhase::PreInstall, "Running pre-install hook");
        self.installer
            .pre_helm_install(install)
            .await
            .map_err(in_phase(InstallPhase::PreInstall))?;

        info!(phase = %InstallPhase::RoleBinding, crb = self.installer.crb_name(), "Ensuring cluster role binding");
        ensure_cluster_role_binding(
            self.role_bindings,
            self.installer.crb_name(),
            &release.namespace,
            &install.spec.mesh_type.to_string(),
        )
        .await
        .map_err(in_phase(InstallPhase::RoleBinding))?;

        info!(phase = %InstallPhase::ChartDeploy, namespace = %release.namespace, "Deploying chart");
        self.deployer
            .deploy(&release)
            .await
            .map_err(in_phase(InstallPhase::ChartDeploy))?;

        info!(phase = %InstallPhase::PostInstall, "Running post-install hook");
        self.installer
            .post_helm_install(install, release_name)
            .await
            .map_err(in_phase(InstallPhase::PostInstall))?;

        info!(phase = %InstallPhase::Complete, "Mesh installed");
        Ok(release)
    }

    /// ChartUninstall -> PostUninstall -> RoleBindingRemoved
    #[instrument(skip(self, install), fields(mesh = %install.spec.mesh_type))]
    pub async fn uninstall(&self, install: &Install, release_name: &str, chart: &str) -> Result<()> {
        let release = self.release(install, release_name, chart);

        info!(phase = %InstallPhase::ChartUninstall, "Removing chart release");
        self.deployer
            .uninstall(&release)
            .await
            .map_err(in_phase(InstallPhase::ChartUninstall))?;

        self.installer
            .post_helm_uninstall()
            .await
            .map_err(in_phase(InstallPhase::PostUninstall))?;

        remove_cluster_role_binding(self.role_bindings, self.installer.crb_name())
            .await
            .map_err(in_phase(InstallPhase::RoleBindingRemoved))?;

        info!("Mesh uninstalled");
        Ok(())
    }
}
