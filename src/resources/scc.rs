//! OpenShift SecurityContextConstraints grants
//!
//! Adds users to a named SCC with a full read-modify-write. A 409 Conflict
//! means someone else wrote the object in between; the whole cycle is retried
//! from a fresh read so their additions are kept.

use tracing::{debug, info, warn};

use crate::client::ClusterApi;
use crate::crd::SecurityContextConstraints;
use crate::installer::error::{Error, Result, RetryConfig, is_conflict};

/// SCC that lets pods run with any UID
pub const ANYUID_SCC: &str = "anyuid";

/// Identity string OpenShift uses for a service account
pub fn service_account_user(namespace: &str, name: &str) -> String {
    format!("system:serviceaccount:{namespace}:{name}")
}

/// Append `users` to the SCC named `policy`.
///
/// Users already listed are not added again; existing entries are never
/// removed or reordered. Returns the users that were actually added.
pub async fn grant_users(
    api: &dyn ClusterApi<SecurityContextConstraints>,
    policy: &str,
    users: &[String],
    retry: &RetryConfig,
) -> Result<Vec<String>> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_grant(api, policy, users).await {
            Ok(added) => {
                if added.is_empty() {
                    debug!(policy, "All users already granted");
                } else {
                    info!(policy, count = added.len(), "Granted security policy");
                }
                return Ok(added);
            }
            Err(e) if is_conflict(&e) => {
                if attempt >= max_attempts {
                    return Err(Error::ConflictRetriesExhausted {
                        policy: policy.to_string(),
                        attempts: attempt,
                    });
                }
                let delay = retry.backoff.delay_for_attempt(attempt - 1);
                warn!(policy, attempt, ?delay, "Conflict updating security policy, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(Error::SecurityGrant {
                    policy: policy.to_string(),
                    source,
                });
            }
        }
    }
}

async fn try_grant(
    api: &dyn ClusterApi<SecurityContextConstraints>,
    policy: &str,
    users: &[String],
) -> Result<Vec<String>, kube::Error> {
    let mut scc = api.get(policy).await?;
    let added = append_missing(&mut scc.users, users);
    if !added.is_empty() {
        api.replace(policy, &scc).await?;
    }
    Ok(added)
}

/// Push each of `users` onto `existing` unless already present
pub fn append_missing(existing: &mut Vec<String>, users: &[String]) -> Vec<String> {
    let mut added = Vec::new();
    for user in users {
        if !existing.contains(user) {
            existing.push(user.clone());
            added.push(user.clone());
        }
    }
    added
}
