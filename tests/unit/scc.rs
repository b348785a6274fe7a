//! Unit tests for SecurityContextConstraints grants

use mesh_installer::resources::{ANYUID_SCC, grant_users, service_account_user};
use mesh_installer::{BackoffConfig, Error, RetryConfig, SecurityContextConstraints};

use crate::common::*;

fn retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        backoff: BackoffConfig::immediate(),
    }
}

fn users(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_grant_appends_after_existing_users() {
    let api = InMemoryApi::new().with(scc(ANYUID_SCC, &["system:admin"]));

    let added = grant_users(&api, ANYUID_SCC, &users(&["a", "b"]), &retry(3))
        .await
        .unwrap();

    assert_eq!(added, vec!["a", "b"]);
    assert_eq!(
        api.stored(ANYUID_SCC).unwrap().users,
        vec!["system:admin", "a", "b"]
    );
}

#[tokio::test]
async fn test_regrant_adds_nothing_and_skips_write() {
    let api = InMemoryApi::new().with(scc(ANYUID_SCC, &["a", "b"]));

    let added = grant_users(&api, ANYUID_SCC, &users(&["b", "a"]), &retry(3))
        .await
        .unwrap();

    assert!(added.is_empty());
    assert_eq!(api.count(Verb::Replace), 0);
    assert_eq!(api.stored(ANYUID_SCC).unwrap().users, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unknown_fields_survive_replace() {
    let mut policy = scc(ANYUID_SCC, &[]);
    policy.extra.insert(
        "allowPrivilegedContainer".to_string(),
        serde_json::Value::Bool(false),
    );
    policy.extra.insert(
        "runAsUser".to_string(),
        serde_json::json!({ "type": "RunAsAny" }),
    );
    let api = InMemoryApi::new().with(policy);

    grant_users(&api, ANYUID_SCC, &users(&["a"]), &retry(3))
        .await
        .unwrap();

    let stored = api.stored(ANYUID_SCC).unwrap();
    assert_eq!(
        stored.extra.get("allowPrivilegedContainer"),
        Some(&serde_json::Value::Bool(false))
    );
    assert_eq!(
        stored.extra.get("runAsUser"),
        Some(&serde_json::json!({ "type": "RunAsAny" }))
    );
}

#[tokio::test]
async fn test_concurrent_writer_is_not_lost() {
    let api = InMemoryApi::new().with(scc(ANYUID_SCC, &["system:admin"]));
    api.interleave_before_replace(|current: &mut SecurityContextConstraints| {
        current.users.push("other-operator".to_string())
    });

    grant_users(&api, ANYUID_SCC, &users(&["a"]), &retry(3))
        .await
        .unwrap();

    assert_eq!(
        api.stored(ANYUID_SCC).unwrap().users,
        vec!["system:admin", "other-operator", "a"]
    );
    assert_eq!(api.count(Verb::Replace), 2);
}

#[tokio::test]
async fn test_persistent_conflict_exhausts_retries() {
    let api = InMemoryApi::new().with(scc(ANYUID_SCC, &[]));
    for _ in 0..3 {
        api.interleave_before_replace(|current: &mut SecurityContextConstraints| {
            current.groups.push("noise".to_string())
        });
    }

    let err = grant_users(&api, ANYUID_SCC, &users(&["a"]), &retry(3))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ConflictRetriesExhausted { ref policy, attempts: 3 } if policy == ANYUID_SCC
    ));
    assert!(api.stored(ANYUID_SCC).unwrap().users.is_empty());
}

#[tokio::test]
async fn test_missing_policy_is_reported() {
    let api = InMemoryApi::<SecurityContextConstraints>::new();

    let err = grant_users(&api, ANYUID_SCC, &users(&["a"]), &retry(3))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SecurityGrant { ref policy, .. } if policy == ANYUID_SCC));
}

#[test]
fn test_service_account_identity() {
    assert_eq!(
        service_account_user("istio-system", "istio-pilot-service-account"),
        "system:serviceaccount:istio-system:istio-pilot-service-account"
    );
}
