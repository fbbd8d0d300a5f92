//! Shared types for the application CRD
//!
//! Kubernetes API types embedded here do not implement `JsonSchema`, so
//! they are published as free-form objects in the generated CRD schema.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, SecretKeySelector};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::service_monitor::Endpoint;

/// Category key used in `status.consumedServices` for OpenAPI bindings
pub const SERVICE_BINDING_CATEGORY_OPENAPI: &str = "openapi";

/// Consumed service secret names, keyed by binding category
pub type ConsumedServices = BTreeMap<String, Vec<String>>;

/// Kubernetes Service type
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
    ExternalName,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
            ServiceType::ExternalName => "ExternalName",
        }
    }
}

/// Container image pull policy
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum PullPolicy {
    Always,
    Never,
    IfNotPresent,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "Always",
            PullPolicy::Never => "Never",
            PullPolicy::IfNotPresent => "IfNotPresent",
        }
    }
}

/// Service exposed by the application
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Port exposed by the container and the Service
    #[serde(default = "default_service_port")]
    pub port: i32,

    #[serde(rename = "type", default)]
    pub type_: ServiceType,

    /// Connection details this application publishes for others to bind to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides: Option<ServiceBindingProvides>,

    /// Services this application binds to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<ServiceBindingConsumes>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_service_port(),
            type_: ServiceType::default(),
            provides: None,
            consumes: Vec::new(),
        }
    }
}

fn default_service_port() -> i32 {
    8080
}

/// Binding category
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum ServiceBindingCategory {
    #[default]
    #[serde(rename = "openapi")]
    OpenApi,
}

impl ServiceBindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceBindingCategory::OpenApi => SERVICE_BINDING_CATEGORY_OPENAPI,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingProvides {
    #[serde(default)]
    pub category: ServiceBindingCategory,

    /// Context root appended to the published url
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ServiceBindingAuth>,
}

impl ServiceBindingProvides {
    pub fn protocol(&self) -> &str {
        if self.protocol.is_empty() {
            "http"
        } else {
            &self.protocol
        }
    }
}

fn default_protocol() -> String {
    "http".to_string()
}

/// References to the credentials published alongside a provided service
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object")]
    pub username: Option<SecretKeySelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object")]
    pub password: Option<SecretKeySelector>,
}

/// A service whose binding secret is projected into this application
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingConsumes {
    pub name: String,

    /// Namespace of the providing application; defaults to the consumer's
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default)]
    pub category: ServiceBindingCategory,

    /// Mount the binding secret here instead of injecting env variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

/// Persistent storage for a StatefulSet-backed application
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Requested size (e.g., "5Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,

    /// Full claim template; takes precedence over `size`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::embedded_object")]
    pub volume_claim_template: Option<PersistentVolumeClaim>,
}

/// Horizontal Pod Autoscaling configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    pub max_replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization_percentage: Option<i32>,
}

/// Prometheus ServiceMonitor configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    /// Extra labels placed on the ServiceMonitor
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Endpoint overrides; only the first entry is used
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

/// Condition types reported on the application status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum StatusConditionType {
    Reconciled,
    DependenciesSatisfied,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: StatusConditionType,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
