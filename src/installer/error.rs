//! Error types for the mesh installers

use std::time::Duration;

use thiserror::Error;

use crate::installer::pipeline::InstallPhase;
use crate::resources::webhook::RepairPhase;

/// Error variants are named by the step that failed so the message reads
/// well when printed by the CLI.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Manifest parse error: {0}")]
    ManifestError(#[from] serde_yaml::Error),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Error creating CRD {name}: {source}")]
    CrdCreate {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Error deleting CRD {name}: {source}")]
    CrdDelete {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Error granting security policy {policy}: {source}")]
    SecurityGrant {
        policy: String,
        #[source]
        source: kube::Error,
    },

    #[error("Security policy {policy} still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted { policy: String, attempts: u32 },

    #[error("Error setting up webhook {name} (stopped at {phase}): {source}")]
    WebhookRepair {
        phase: RepairPhase,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Webhook configuration {0} already exists with different webhooks")]
    WebhookConflict(String),

    #[error("Error managing cluster role binding {name}: {source}")]
    RoleBinding {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Overrides still contain placeholder tokens: {0:?}")]
    UnresolvedTokens(Vec<String>),

    #[error("Chart command failed: {command} - {message}")]
    DeployError { command: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{phase} failed: {source}")]
    PhaseFailed {
        phase: InstallPhase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The phase the pipeline was in when this error surfaced, if known
    pub fn phase(&self) -> Option<InstallPhase> {
        match self {
            Error::PhaseFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Object is absent
pub fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

/// Create hit an object that already has this name
pub fn is_already_exists(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists")
}

/// Update carried a stale resourceVersion
pub fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 409 && resp.reason == "Conflict")
}

/// Build an API error response the way the API server reports it
#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} (test)"),
        reason: reason.to_string(),
        code,
    })
}

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// No waiting between attempts
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }
}

/// Bounded retry for optimistic-concurrency conflicts
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffConfig::default(),
        }
    }
}
