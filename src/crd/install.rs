use std::fmt;
use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Install is the request to deploy one service mesh into the cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "mesh.supergloo.io",
    version = "v1",
    kind = "Install",
    plural = "installs",
    namespaced,
    printcolumn = r#"{"name":"Mesh", "type":"string", "jsonPath":".spec.meshType"}"#,
    printcolumn = r#"{"name":"TLS", "type":"boolean", "jsonPath":".spec.encryption.tlsEnabled"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstallSpec {
    /// Which mesh product to install
    pub mesh_type: MeshType,

    /// Transport encryption settings. Absent means TLS is not requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,

    /// Namespace for the chart release. Falls back to the product default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_namespace: Option<String>,

    /// Chart reference handed to the deployer (repo/chart, path or URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_locator: Option<String>,
}

impl InstallSpec {
    pub fn new(mesh_type: MeshType) -> Self {
        Self {
            mesh_type,
            encryption: None,
            installation_namespace: None,
            chart_locator: None,
        }
    }

    /// True when the request enabled mutual TLS
    pub fn tls_enabled(&self) -> bool {
        self.encryption.as_ref().is_some_and(|e| e.tls_enabled)
    }
}

/// Supported mesh products
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MeshType {
    Consul,
    Istio,
}

impl fmt::Display for MeshType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshType::Consul => write!(f, "consul"),
            MeshType::Istio => write!(f, "istio"),
        }
    }
}

/// Mesh encryption configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Encryption {
    /// Enable mutual TLS between mesh workloads
    #[serde(default)]
    pub tls_enabled: bool,

    /// Secret holding externally supplied root certificates.
    /// When unset the mesh generates a self-signed root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
}

impl Encryption {
    pub fn tls(secret: Option<SecretRef>) -> Self {
        Self {
            tls_enabled: true,
            secret,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Reference to a Secret by namespace and name
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Parses `name` or `namespace/name`
impl FromStr for SecretRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (namespace, name) = match s.split_once('/') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, s),
        };
        if name.is_empty() || name.contains('/') {
            return Err(format!("invalid secret reference {s:?}, expected [namespace/]name"));
        }
        if namespace.is_some_and(str::is_empty) {
            return Err(format!("invalid secret reference {s:?}, namespace is empty"));
        }
        Ok(Self {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        })
    }
}
