//! OpenLibertyApplication Custom Resource Definition
//!
//! Describes a containerized Open Liberty application. The operator turns
//! one of these into a Deployment (or StatefulSet when storage is
//! requested), a Service and, depending on the spec, a Route, an HPA, a
//! ServiceMonitor, a Knative Service and service-binding Secrets.

use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, Probe, ResourceRequirements, Volume, VolumeMount,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::base::BaseApplication;
use super::types::{
    AutoscalingConfig, ConsumedServices, MonitoringConfig, PullPolicy, ServiceConfig,
    StatusCondition, StorageConfig,
};

/// The OpenLibertyApplication CRD.
///
/// # Example
///
/// ```yaml
/// apiVersion: openliberty.io/v1beta1
/// kind: OpenLibertyApplication
/// metadata:
///   name: example-liberty-pullpolicy
/// spec:
///   applicationImage: openliberty/open-liberty:kernel-java8-openj9-ubi
///   replicas: 1
///   pullPolicy: Always
///   service:
///     port: 9080
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "openliberty.io",
    version = "v1beta1",
    kind = "OpenLibertyApplication",
    namespaced,
    status = "OpenLibertyApplicationStatus",
    shortname = "olapp",
    derive = "Default",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.applicationImage"}"#,
    printcolumn = r#"{"name":"Exposed","type":"boolean","jsonPath":".spec.expose"}"#,
    printcolumn = r#"{"name":"Reconciled","type":"string","jsonPath":".status.conditions[?(@.type=='Reconciled')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenLibertyApplicationSpec {
    /// Container image to run
    pub application_image: String,

    /// Application version, surfaced as the `app.kubernetes.io/version` label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Name of the application this component is part of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoscalingConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<PullPolicy>,

    /// Name of the image pull secret attached to the ServiceAccount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default)]
    pub service: ServiceConfig,

    /// Expose the application outside the cluster (Route / public Knative route)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object")]
    pub resource_constraints: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object")]
    pub readiness_probe: Option<Probe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object")]
    pub liveness_probe: Option<Probe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object_list")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object_list")]
    pub env_from: Option<Vec<EnvFromSource>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object_list")]
    pub init_containers: Option<Vec<Container>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object_list")]
    pub volumes: Option<Vec<Volume>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object_list")]
    pub volume_mounts: Option<Vec<VolumeMount>>,

    /// Node architectures in order of preference (e.g., ["amd64", "ppc64le"])
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architecture: Vec<String>,

    /// Run as a StatefulSet with a volume claim template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_knative_service: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringConfig>,

    /// Set to false to stop generating kAppNav application definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_app_definition: Option<bool>,
}

/// Status subresource for OpenLibertyApplication
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenLibertyApplicationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,

    /// Binding secrets resolved for `spec.service.consumes`, by category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_services: Option<ConsumedServices>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl OpenLibertyApplication {
    /// Fill in defaults the API server does not apply for us.
    pub fn initialize(&mut self) {
        let namespace = self.namespace().unwrap_or_else(|| "default".to_string());
        for consumes in &mut self.spec.service.consumes {
            if consumes.namespace.is_empty() {
                consumes.namespace = namespace.clone();
            }
        }
    }
}

impl BaseApplication for OpenLibertyApplication {
    fn application_image(&self) -> &str {
        &self.spec.application_image
    }

    fn replicas(&self) -> Option<i32> {
        self.spec.replicas
    }

    fn service(&self) -> &ServiceConfig {
        &self.spec.service
    }

    fn expose(&self) -> Option<bool> {
        self.spec.expose
    }

    fn resource_constraints(&self) -> Option<&ResourceRequirements> {
        self.spec.resource_constraints.as_ref()
    }

    fn readiness_probe(&self) -> Option<&Probe> {
        self.spec.readiness_probe.as_ref()
    }

    fn liveness_probe(&self) -> Option<&Probe> {
        self.spec.liveness_probe.as_ref()
    }

    fn env(&self) -> Option<&[EnvVar]> {
        self.spec.env.as_deref()
    }

    fn env_from(&self) -> Option<&[EnvFromSource]> {
        self.spec.env_from.as_deref()
    }

    fn init_containers(&self) -> Option<&[Container]> {
        self.spec.init_containers.as_deref()
    }

    fn volumes(&self) -> Option<&[Volume]> {
        self.spec.volumes.as_deref()
    }

    fn volume_mounts(&self) -> Option<&[VolumeMount]> {
        self.spec.volume_mounts.as_deref()
    }

    fn storage(&self) -> Option<&StorageConfig> {
        self.spec.storage.as_ref()
    }

    fn autoscaling(&self) -> Option<&AutoscalingConfig> {
        self.spec.autoscaling.as_ref()
    }

    fn monitoring(&self) -> Option<&MonitoringConfig> {
        self.spec.monitoring.as_ref()
    }

    fn pull_policy(&self) -> Option<PullPolicy> {
        self.spec.pull_policy
    }

    fn pull_secret(&self) -> Option<&str> {
        self.spec.pull_secret.as_deref()
    }

    fn service_account_name(&self) -> Option<&str> {
        self.spec.service_account_name.as_deref()
    }

    fn architecture(&self) -> &[String] {
        &self.spec.architecture
    }

    fn create_knative_service(&self) -> Option<bool> {
        self.spec.create_knative_service
    }

    fn create_app_definition(&self) -> Option<bool> {
        self.spec.create_app_definition
    }

    fn app_version(&self) -> &str {
        self.spec.version.as_deref().unwrap_or_default()
    }

    fn application_name(&self) -> String {
        self.spec
            .application_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    fn consumed_services(&self) -> Option<&ConsumedServices> {
        self.status.as_ref()?.consumed_services.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::ServiceBindingConsumes;

    #[test]
    fn test_spec_defaults_from_minimal_yaml() {
        let spec: OpenLibertyApplicationSpec =
            serde_yaml::from_str("applicationImage: openliberty/open-liberty:latest\n").unwrap();
        assert_eq!(spec.service.port, 8080);
        assert_eq!(spec.service.type_.as_str(), "ClusterIP");
        assert!(spec.pull_policy.is_none());
        assert!(spec.storage.is_none());
    }

    #[test]
    fn test_pull_policy_parses() {
        let spec: OpenLibertyApplicationSpec = serde_yaml::from_str(
            "applicationImage: app:1\npullPolicy: Always\n",
        )
        .unwrap();
        assert_eq!(spec.pull_policy, Some(PullPolicy::Always));
    }

    #[test]
    fn test_initialize_defaults_consumes_namespace() {
        let mut app = OpenLibertyApplication::new("frontend", OpenLibertyApplicationSpec::default());
        app.metadata.namespace = Some("shop".to_string());
        app.spec.service.consumes = vec![
            ServiceBindingConsumes {
                name: "orders".to_string(),
                ..Default::default()
            },
            ServiceBindingConsumes {
                name: "users".to_string(),
                namespace: "accounts".to_string(),
                ..Default::default()
            },
        ];

        app.initialize();

        assert_eq!(app.spec.service.consumes[0].namespace, "shop");
        assert_eq!(app.spec.service.consumes[1].namespace, "accounts");
    }

    #[test]
    fn test_application_name_falls_back_to_name() {
        let mut app = OpenLibertyApplication::new("frontend", OpenLibertyApplicationSpec::default());
        assert_eq!(app.application_name(), "frontend");
        app.spec.application_name = Some("shop".to_string());
        assert_eq!(app.application_name(), "shop");
    }
}
