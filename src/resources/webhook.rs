//! Mutating webhook rename repair
//!
//! The Consul chart registers its connect-injector webhook configuration as
//! `<release>-consul-connect-injector-cfg`, while the injector itself looks
//! for `consul-connect-injector-cfg`. Kubernetes has no rename, so the repair
//! copies the object under the canonical name and deletes the original:
//!
//! ```text
//! Start -> Fetched -> Cloned -> Recreated -> OriginalDeleted
//! ```
//!
//! The sequence is not atomic. If it stops after `Recreated`, both copies are
//! registered and both intercept admission requests. Re-running the repair
//! picks up from there: an existing canonical copy with identical webhooks is
//! accepted. The release-qualified object must always exist, since the chart
//! (re)creates it on every deploy; a missing one is reported even when a
//! canonical copy is present.

use std::fmt;

use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use tracing::{debug, info, warn};

use crate::client::ClusterApi;
use crate::installer::error::{Error, Result, is_already_exists};

/// Name the Consul injector expects its webhook configuration under
pub const CONSUL_WEBHOOK_CFG: &str = "consul-connect-injector-cfg";

/// Name the chart actually gives the webhook configuration
pub fn release_qualified_name(release_name: &str, canonical: &str) -> String {
    format!("{release_name}-{canonical}")
}

/// Progress of a webhook repair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairPhase {
    /// Nothing read yet
    Start,
    /// Release-qualified object read
    Fetched,
    /// Copy renamed and stripped of server-assigned metadata
    Cloned,
    /// Canonical object present on the cluster
    Recreated,
    /// Release-qualified object removed
    OriginalDeleted,
}

impl fmt::Display for RepairPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairPhase::Start => write!(f, "Start"),
            RepairPhase::Fetched => write!(f, "Fetched"),
            RepairPhase::Cloned => write!(f, "Cloned"),
            RepairPhase::Recreated => write!(f, "Recreated"),
            RepairPhase::OriginalDeleted => write!(f, "OriginalDeleted"),
        }
    }
}

impl RepairPhase {
    /// The phase that follows this one, if any
    pub fn next(self) -> Option<RepairPhase> {
        match self {
            RepairPhase::Start => Some(RepairPhase::Fetched),
            RepairPhase::Fetched => Some(RepairPhase::Cloned),
            RepairPhase::Cloned => Some(RepairPhase::Recreated),
            RepairPhase::Recreated => Some(RepairPhase::OriginalDeleted),
            RepairPhase::OriginalDeleted => None,
        }
    }

    /// Both configurations may be registered in this phase
    pub fn has_duplicate(self) -> bool {
        self == RepairPhase::Recreated
    }
}

/// Result of a completed repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub canonical_name: String,
    pub phase: RepairPhase,
    /// The repair continued work left behind by an earlier run
    pub resumed: bool,
}

/// Copy `input` under `canonical`, cleared of everything the API server
/// assigns so the write is a fresh create.
pub fn fixed_webhook_config(
    input: &MutatingWebhookConfiguration,
    canonical: &str,
) -> MutatingWebhookConfiguration {
    let mut fixed = input.clone();
    fixed.metadata.name = Some(canonical.to_string());
    fixed.metadata.resource_version = None;
    fixed.metadata.uid = None;
    fixed.metadata.creation_timestamp = None;
    fixed.metadata.generation = None;
    fixed.metadata.managed_fields = None;
    fixed
}

/// Move the webhook configuration created for `release_name` to `canonical`
pub async fn repair_webhook_name(
    api: &dyn ClusterApi<MutatingWebhookConfiguration>,
    release_name: &str,
    canonical: &str,
) -> Result<RepairOutcome> {
    let qualified = release_qualified_name(release_name, canonical);
    let mut phase = RepairPhase::Start;
    let mut resumed = false;

    let original = match api.get(&qualified).await {
        Ok(cfg) => cfg,
        Err(source) => {
            return Err(Error::WebhookRepair {
                phase,
                name: qualified,
                source,
            });
        }
    };
    phase = advance(phase);

    let fixed = fixed_webhook_config(&original, canonical);
    phase = advance(phase);

    match api.create(&fixed).await {
        Ok(_) => debug!(name = canonical, "Created canonical webhook configuration"),
        Err(e) if is_already_exists(&e) => {
            let existing = api
                .get(canonical)
                .await
                .map_err(|source| Error::WebhookRepair {
                    phase,
                    name: canonical.to_string(),
                    source,
                })?;
            if existing.webhooks != fixed.webhooks {
                return Err(Error::WebhookConflict(canonical.to_string()));
            }
            warn!(
                name = canonical,
                "Canonical webhook configuration already present from an earlier run"
            );
            resumed = true;
        }
        Err(source) => {
            return Err(Error::WebhookRepair {
                phase,
                name: canonical.to_string(),
                source,
            });
        }
    }
    phase = advance(phase);

    api.delete(&qualified)
        .await
        .map_err(|source| Error::WebhookRepair {
            phase,
            name: qualified.clone(),
            source,
        })?;
    phase = advance(phase);

    info!(
        from = %qualified,
        to = canonical,
        resumed,
        "Repaired webhook configuration name"
    );

    Ok(RepairOutcome {
        canonical_name: canonical.to_string(),
        phase,
        resumed,
    })
}

fn advance(phase: RepairPhase) -> RepairPhase {
    let next = phase.next().unwrap_or(phase);
    debug!(from = %phase, to = %next, "Webhook repair transition");
    next
}
