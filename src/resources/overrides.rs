//! Helm values overrides for each mesh product
//!
//! Each product ships a values template with `@@TOKEN@@` placeholders. The
//! templater resolves every placeholder to a literal boolean; it does plain
//! text substitution and never touches the cluster.

use crate::crd::{Encryption, MeshType};

/// Placeholder for whether mutual TLS is enabled
pub const MTLS_ENABLED_TOKEN: &str = "@@MTLS_ENABLED@@";

/// Placeholder for whether the mesh generates its own root certificate
pub const SELF_SIGNED_TOKEN: &str = "@@SELF_SIGNED@@";

const TOKEN_DELIMITER: &str = "@@";

/// Consul chart values
pub const CONSUL_OVERRIDES_TEMPLATE: &str = r#"
global:
  # soloio/consul:latest tracks the 1.4 line; hashicorp has no 1.4 image yet
  image: "soloio/consul:latest"
  imageK8S: "hashicorp/consul-k8s:0.2.1"

server:
  replicas: 1
  bootstrapExpect: 1
  connect: @@MTLS_ENABLED@@
  disruptionBudget:
    enabled: false
    maxUnavailable: null

connectInject:
  enabled: @@MTLS_ENABLED@@
"#;

/// Istio chart values
pub const ISTIO_OVERRIDES_TEMPLATE: &str = r#"#overrides
global:
  mtls:
    enabled: @@MTLS_ENABLED@@
  crds: false
security:
  selfSigned: @@SELF_SIGNED@@
"#;

/// Values for the requested product
pub fn overrides_for(mesh: MeshType, encryption: Option<&Encryption>) -> String {
    match mesh {
        MeshType::Consul => consul_overrides(encryption),
        MeshType::Istio => istio_overrides(encryption),
    }
}

/// Consul only distinguishes TLS on/off. No encryption block means off.
pub fn consul_overrides(encryption: Option<&Encryption>) -> String {
    let mtls_enabled = encryption.is_some_and(|e| e.tls_enabled);
    render(
        CONSUL_OVERRIDES_TEMPLATE,
        &[(MTLS_ENABLED_TOKEN, mtls_enabled)],
    )
}

/// Istio also needs to know whether the root CA comes from a secret.
/// A secret only counts when TLS is enabled.
pub fn istio_overrides(encryption: Option<&Encryption>) -> String {
    let mtls_enabled = encryption.is_some_and(|e| e.tls_enabled);
    let self_signed = !(mtls_enabled && encryption.is_some_and(|e| e.secret.is_some()));
    render(
        ISTIO_OVERRIDES_TEMPLATE,
        &[
            (MTLS_ENABLED_TOKEN, mtls_enabled),
            (SELF_SIGNED_TOKEN, self_signed),
        ],
    )
}

/// Replace every occurrence of each token with `true` or `false`
pub fn render(template: &str, values: &[(&str, bool)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |rendered, (token, value)| {
            rendered.replace(token, if *value { "true" } else { "false" })
        })
}

/// Placeholders still present in a rendered payload, in order of appearance.
///
/// A placeholder is any whitespace-free text between two `@@` delimiters, so
/// names with digits, lowercase names and extra leading `@`s are all caught.
pub fn unresolved_tokens(payload: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = payload;
    while let Some(start) = rest.find(TOKEN_DELIMITER) {
        let after = &rest[start + TOKEN_DELIMITER.len()..];
        let Some(end) = after.find(TOKEN_DELIMITER) else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && !name.chars().any(char::is_whitespace) {
            tokens.push(format!("{TOKEN_DELIMITER}{name}{TOKEN_DELIMITER}"));
            rest = &after[end + TOKEN_DELIMITER.len()..];
        } else {
            // '@' is one byte, so this stays on a char boundary
            rest = &rest[start + 1..];
        }
    }
    tokens
}
