//! Shared labels and names for objects the installer creates

use std::collections::BTreeMap;

/// Value of `app.kubernetes.io/managed-by` on everything we create
pub const MANAGED_BY: &str = "mesh-installer";

/// Label carrying the mesh product an object belongs to
pub const MESH_LABEL: &str = "mesh.supergloo.io/mesh";

/// Labels for objects the installer creates outside the chart
pub fn standard_labels(mesh: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), mesh.to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
        (MESH_LABEL.to_string(), mesh.to_string()),
    ])
}
