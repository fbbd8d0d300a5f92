//! Service binding naming and lookup

use crate::crd::{BaseApplication, ServiceBindingConsumes};
use crate::error::{Error, Result};

/// Name of the Secret a provider publishes its connection details in
pub fn build_service_binding_secret_name(name: &str, namespace: &str) -> String {
    format!("{namespace}-{name}")
}

/// The `spec.service.consumes` entry whose binding secret is `secret_name`
pub fn find_consumes<'a>(
    secret_name: &str,
    app: &'a impl BaseApplication,
) -> Result<&'a ServiceBindingConsumes> {
    app.service()
        .consumes
        .iter()
        .find(|c| build_service_binding_secret_name(&c.name, &c.namespace) == secret_name)
        .ok_or_else(|| Error::ConsumesNotFound(secret_name.to_string()))
}

/// Environment variable names only allow `[A-Z0-9_]`; Kubernetes names also
/// carry `-` and `.`.
pub fn normalize_env_variable_name(name: &str) -> String {
    name.to_uppercase().replace(['-', '.'], "_")
}
