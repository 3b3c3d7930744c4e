//! Helpers over unstructured resources.

use serde_json::Value;

/// An unstructured Kubernetes-style resource, as handed over by the
/// downstream builder.
pub type Resource = Value;

/// Whether the resource is itself a SOPS envelope: a top-level `sops`
/// mapping carrying a `mac` entry.
pub fn is_sops_encrypted_resource(resource: &Resource) -> bool {
    resource
        .get("sops")
        .map(|sops| sops.get("mac").is_some())
        .unwrap_or(false)
}

/// Whether the resource is a `Secret` that still carries SOPS metadata.
pub fn is_encrypted_secret(resource: &Resource) -> bool {
    resource.get("kind").and_then(Value::as_str) == Some("Secret")
        && resource.get("sops").is_some()
}
