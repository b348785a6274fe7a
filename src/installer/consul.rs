//! Consul installer
//!
//! No prerequisites. With TLS on, the chart's connect-injector webhook
//! configuration comes out under a release-qualified name and has to be
//! moved to the name the injector watches.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use tracing::info;

use crate::client::ClusterApi;
use crate::crd::Install;
use crate::installer::error::Result;
use crate::installer::{CONSUL_PROFILE, Installer, ProductProfile};
use crate::resources::overrides::consul_overrides;
use crate::resources::webhook::{CONSUL_WEBHOOK_CFG, repair_webhook_name};

pub struct ConsulInstaller {
    webhooks: Arc<dyn ClusterApi<MutatingWebhookConfiguration>>,
}

impl ConsulInstaller {
    pub fn new(webhooks: Arc<dyn ClusterApi<MutatingWebhookConfiguration>>) -> Self {
        Self { webhooks }
    }
}

#[async_trait]
impl Installer for ConsulInstaller {
    fn profile(&self) -> &ProductProfile {
        &CONSUL_PROFILE
    }

    fn overrides_yaml(&self, install: &Install) -> String {
        consul_overrides(install.spec.encryption.as_ref())
    }

    async fn pre_helm_install(&self, _install: &Install) -> Result<()> {
        Ok(())
    }

    async fn post_helm_install(&self, install: &Install, release_name: &str) -> Result<()> {
        if !install.spec.tls_enabled() {
            return Ok(());
        }
        let outcome =
            repair_webhook_name(self.webhooks.as_ref(), release_name, CONSUL_WEBHOOK_CFG).await?;
        info!(
            release = release_name,
            webhook = %outcome.canonical_name,
            resumed = outcome.resumed,
            "Consul webhook configuration in place"
        );
        Ok(())
    }
}
