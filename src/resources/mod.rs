pub mod common;
pub mod crds;
pub mod overrides;
pub mod rbac;
pub mod scc;
pub mod webhook;

pub use common::{MANAGED_BY, MESH_LABEL, standard_labels};
pub use crds::{create_crds, crds_from_manifest, delete_crds_matching};
pub use overrides::{overrides_for, unresolved_tokens};
pub use rbac::{ensure_cluster_role_binding, remove_cluster_role_binding};
pub use scc::{ANYUID_SCC, grant_users, service_account_user};
pub use webhook::{CONSUL_WEBHOOK_CFG, RepairOutcome, RepairPhase, repair_webhook_name};
