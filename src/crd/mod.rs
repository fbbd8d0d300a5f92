//! Custom Resource Definitions for the Open Liberty operator
//!
//! `OpenLibertyApplication` is owned by this operator. `Route`,
//! `ServiceMonitor` and the Knative `Service` are mirrors of third-party
//! CRDs the operator writes when they are installed in the cluster.

mod application;
mod base;
pub mod knative;
pub mod route;
pub mod service_monitor;
pub mod types;

pub use application::{
    OpenLibertyApplication, OpenLibertyApplicationSpec, OpenLibertyApplicationStatus,
};
pub use base::BaseApplication;
pub use knative::KnativeService;
pub use route::Route;
pub use service_monitor::ServiceMonitor;
pub use types::*;

use schemars::gen::SchemaGenerator;
use schemars::schema::{ArrayValidation, InstanceType, Schema, SchemaObject, SingleOrVec};

/// Schema for an embedded Kubernetes object: any fields, kept as-is by the API server.
pub(crate) fn embedded_object(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

/// Schema for a list of embedded Kubernetes objects.
pub(crate) fn embedded_object_list(gen: &mut SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(SingleOrVec::Single(Box::new(embedded_object(gen)))),
            ..Default::default()
        })),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_metadata() {
        let crd = OpenLibertyApplication::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("openlibertyapplications.openliberty.io")
        );
        assert_eq!(crd.spec.group, "openliberty.io");
        assert_eq!(crd.spec.versions[0].name, "v1beta1");
    }

    #[test]
    fn test_embedded_fields_preserve_unknown() {
        let crd = serde_json::to_value(OpenLibertyApplication::crd()).unwrap();
        let spec_props = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]
            ["spec"]["properties"];
        assert_eq!(spec_props["readinessProbe"]["type"], "object");
        assert_eq!(
            spec_props["readinessProbe"]["x-kubernetes-preserve-unknown-fields"],
            true
        );
        assert_eq!(spec_props["env"]["type"], "array");
    }
}
