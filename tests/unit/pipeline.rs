//! Unit tests for the install/uninstall pipeline
//!
//! The deployer stand-in plays the chart's part: for Consul it creates the
//! release-qualified connect-injector webhook configuration, the way the real
//! chart does.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use mesh_installer::crd::{Encryption, MeshType};
use mesh_installer::resources::webhook::release_qualified_name;
use mesh_installer::resources::{ANYUID_SCC, CONSUL_WEBHOOK_CFG};
use mesh_installer::{
    ChartDeployer, ChartRelease, Error, InstallPhase, InstallerOptions, MeshInstaller, Pipeline,
    Result,
};

use crate::common::*;

#[derive(Default)]
struct FakeDeployer {
    deployed: Mutex<Vec<ChartRelease>>,
    removed: Mutex<Vec<ChartRelease>>,
    /// Webhook configuration the chart creates on deploy
    webhooks: Option<Arc<InMemoryApi<MutatingWebhookConfiguration>>>,
    fail_deploy: bool,
}

#[async_trait]
impl ChartDeployer for FakeDeployer {
    async fn deploy(&self, release: &ChartRelease) -> Result<()> {
        if self.fail_deploy {
            return Err(Error::DeployError {
                command: "helm upgrade --install".to_string(),
                message: "context deadline exceeded".to_string(),
            });
        }
        if let Some(webhooks) = &self.webhooks {
            webhooks.insert(webhook_config(
                &release_qualified_name(&release.name, CONSUL_WEBHOOK_CFG),
                &["consul-connect-injector.consul.hashicorp.com"],
            ));
        }
        self.deployed.lock().unwrap().push(release.clone());
        Ok(())
    }

    async fn uninstall(&self, release: &ChartRelease) -> Result<()> {
        self.removed.lock().unwrap().push(release.clone());
        Ok(())
    }
}

fn installer(cluster: &FakeCluster, mesh: MeshType, openshift: bool) -> MeshInstaller {
    MeshInstaller::new(mesh, &cluster.clients(openshift), &InstallerOptions::default()).unwrap()
}

#[tokio::test]
async fn test_consul_tls_install_end_to_end() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Consul, false);
    let deployer = FakeDeployer {
        webhooks: Some(cluster.webhooks.clone()),
        ..Default::default()
    };
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);
    let request = install(MeshType::Consul, Some(Encryption::tls(None)));

    let release = pipeline
        .install(&request, "relA", "hashicorp/consul")
        .await
        .unwrap();

    assert_eq!(release.namespace, "consul");
    assert!(release.values.contains("connect: true"));
    assert_eq!(deployer.deployed.lock().unwrap().len(), 1);

    // the chart's webhook configuration now lives under the canonical name only
    assert_eq!(cluster.webhooks.names(), vec![CONSUL_WEBHOOK_CFG]);

    let crb = cluster.role_bindings.stored("consul-crb").unwrap();
    let subjects = crb.subjects.unwrap();
    assert_eq!(subjects[0].namespace.as_deref(), Some("consul"));
}

#[tokio::test]
async fn test_istio_openshift_install_end_to_end() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Istio, true);
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);
    let request = install(MeshType::Istio, Some(tls_with_secret("istio-system", "cacerts")));

    let release = pipeline
        .install(&request, "istio", "istio/istio")
        .await
        .unwrap();

    assert_eq!(release.namespace, "istio-system");
    assert!(release.values.contains("selfSigned: false"));
    assert!(!cluster.crds.names().is_empty());
    assert!(cluster.security.stored(ANYUID_SCC).unwrap().users.len() > 1);
    assert!(cluster.role_bindings.stored("istio-crb").is_some());
}

#[tokio::test]
async fn test_istio_grant_follows_release_namespace() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Istio, true);
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);
    let mut request = install(MeshType::Istio, None);
    request.spec.installation_namespace = Some("mesh".to_string());

    let release = pipeline
        .install(&request, "istio", "istio/istio")
        .await
        .unwrap();

    assert_eq!(release.namespace, "mesh");
    let users = cluster.security.stored(ANYUID_SCC).unwrap().users;
    assert_eq!(users[0], "system:admin");
    assert!(
        users[1..]
            .iter()
            .all(|u| u.starts_with("system:serviceaccount:mesh:"))
    );
    let crb = cluster.role_bindings.stored("istio-crb").unwrap();
    assert_eq!(crb.subjects.unwrap()[0].namespace.as_deref(), Some("mesh"));
}

#[tokio::test]
async fn test_install_twice_converges() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Istio, true);
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);
    let request = install(MeshType::Istio, None);

    pipeline.install(&request, "istio", "istio/istio").await.unwrap();
    let users = cluster.security.stored(ANYUID_SCC).unwrap().users;
    pipeline.install(&request, "istio", "istio/istio").await.unwrap();

    assert_eq!(cluster.security.stored(ANYUID_SCC).unwrap().users, users);
    assert_eq!(cluster.role_bindings.names(), vec!["istio-crb"]);
    assert_eq!(deployer.deployed.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_deploy_failure_keeps_prerequisites() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Istio, false);
    let deployer = FakeDeployer {
        fail_deploy: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);

    let err = pipeline
        .install(&install(MeshType::Istio, None), "istio", "istio/istio")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(InstallPhase::ChartDeploy));
    assert!(err.to_string().starts_with("ChartDeploy failed"));
    // nothing is rolled back
    assert!(!cluster.crds.names().is_empty());
    assert!(cluster.role_bindings.stored("istio-crb").is_some());
}

#[tokio::test]
async fn test_post_install_failure_reports_phase() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Consul, false);
    // chart never creates the webhook configuration
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);

    let err = pipeline
        .install(
            &install(MeshType::Consul, Some(Encryption::tls(None))),
            "relA",
            "hashicorp/consul",
        )
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(InstallPhase::PostInstall));
    assert_eq!(deployer.deployed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_role_binding_failure_stops_before_deploy() {
    let cluster = FakeCluster::new();
    cluster
        .role_bindings
        .fail(Verb::Create, "consul-crb", 403, "Forbidden");
    let installer = installer(&cluster, MeshType::Consul, false);
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);

    let err = pipeline
        .install(&install(MeshType::Consul, None), "relA", "hashicorp/consul")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(InstallPhase::RoleBinding));
    assert!(deployer.deployed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_uninstall_cleans_up() {
    let cluster = FakeCluster::new();
    let installer = MeshInstaller::new(
        MeshType::Istio,
        &cluster.clients(false),
        &InstallerOptions {
            purge_crds_on_uninstall: true,
            ..Default::default()
        },
    )
    .unwrap();
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);
    let request = install(MeshType::Istio, None);

    pipeline.install(&request, "istio", "istio/istio").await.unwrap();
    pipeline
        .uninstall(&request, "istio", "istio/istio")
        .await
        .unwrap();

    assert_eq!(deployer.removed.lock().unwrap().len(), 1);
    assert!(cluster.crds.names().is_empty());
    assert!(cluster.role_bindings.names().is_empty());
}

#[tokio::test]
async fn test_uninstall_without_binding_succeeds() {
    let cluster = FakeCluster::new();
    let installer = installer(&cluster, MeshType::Consul, false);
    let deployer = FakeDeployer::default();
    let pipeline = Pipeline::new(&installer, &deployer, &*cluster.role_bindings);

    pipeline
        .uninstall(&install(MeshType::Consul, None), "relA", "hashicorp/consul")
        .await
        .unwrap();
}
