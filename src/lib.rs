//! Service mesh installer
//!
//! Deploys Consul or Istio into a Kubernetes cluster through a chart deployer,
//! with per-product hooks that prepare the cluster before the chart goes in
//! (CRDs, OpenShift security grants) and repair what the chart gets wrong
//! afterwards (the Consul connect-injector webhook name).

pub mod client;
pub mod crd;
pub mod helm;
pub mod installer;
pub mod resources;

pub use client::{ClusterApi, ClusterClients};
pub use crd::{Encryption, Install, InstallSpec, MeshType, SecretRef, SecurityContextConstraints};
pub use helm::HelmCli;
pub use installer::{
    BackoffConfig, ChartDeployer, ChartRelease, ConsulInstaller, Error, InstallPhase, Installer,
    InstallerOptions, IstioInstaller, MeshInstaller, Pipeline, ProductProfile, Result,
    RetryConfig,
};
pub use resources::overrides_for;
