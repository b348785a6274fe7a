//! Typed model of the OpenShift SecurityContextConstraints object
//!
//! Only `users` and `groups` are modelled. Every other field is kept in
//! `extra` so a read-modify-write through `replace` never drops data the
//! operator did not touch.

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::ClusterResourceScope;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::{Deserialize, Deserializer, Serialize};

pub const SCC_GROUP: &str = "security.openshift.io";
pub const SCC_VERSION: &str = "v1";
pub const SCC_KIND: &str = "SecurityContextConstraints";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SecurityContextConstraints {
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Users (including service account identities) granted this policy
    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub groups: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SecurityContextConstraints {
    pub fn new(name: &str) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert(
            "apiVersion".to_string(),
            serde_json::Value::String(format!("{SCC_GROUP}/{SCC_VERSION}")),
        );
        extra.insert(
            "kind".to_string(),
            serde_json::Value::String(SCC_KIND.to_string()),
        );
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            users: Vec::new(),
            groups: Vec::new(),
            extra,
        }
    }
}

// OpenShift serialises empty user lists as `null`
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Resource for SecurityContextConstraints {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(SCC_KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(SCC_GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(SCC_VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("securitycontextconstraints")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
