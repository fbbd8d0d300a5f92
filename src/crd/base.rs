//! The capability set the customize functions read from.
//!
//! Metadata (name, namespace, uid, labels) comes from the `kube::Resource`
//! supertrait; everything else is a typed accessor. `None` from an optional
//! accessor means "leave the target field alone".

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, Probe, ResourceRequirements, Volume, VolumeMount,
};
use kube::{Resource, ResourceExt};

use super::types::{
    AutoscalingConfig, ConsumedServices, MonitoringConfig, PullPolicy, ServiceConfig,
    StorageConfig,
};
use crate::constants::{
    COMPONENT_LABEL, INSTANCE_LABEL, LAST_APPLIED_ANNOTATION, MANAGED_BY_LABEL, NAME_LABEL,
    OPERATOR_NAME, PART_OF_LABEL, VERSION_LABEL,
};

pub trait BaseApplication: Resource<DynamicType = ()> + Sized {
    fn application_image(&self) -> &str;
    fn replicas(&self) -> Option<i32>;
    fn service(&self) -> &ServiceConfig;
    fn expose(&self) -> Option<bool>;
    fn resource_constraints(&self) -> Option<&ResourceRequirements>;
    fn readiness_probe(&self) -> Option<&Probe>;
    fn liveness_probe(&self) -> Option<&Probe>;
    fn env(&self) -> Option<&[EnvVar]>;
    fn env_from(&self) -> Option<&[EnvFromSource]>;
    fn init_containers(&self) -> Option<&[Container]>;
    fn volumes(&self) -> Option<&[Volume]>;
    fn volume_mounts(&self) -> Option<&[VolumeMount]>;
    fn storage(&self) -> Option<&StorageConfig>;
    fn autoscaling(&self) -> Option<&AutoscalingConfig>;
    fn monitoring(&self) -> Option<&MonitoringConfig>;
    fn pull_policy(&self) -> Option<PullPolicy>;
    fn pull_secret(&self) -> Option<&str>;
    fn service_account_name(&self) -> Option<&str>;
    fn architecture(&self) -> &[String];
    fn create_knative_service(&self) -> Option<bool>;
    fn create_app_definition(&self) -> Option<bool>;
    /// Application version; empty when unset
    fn app_version(&self) -> &str;
    fn application_name(&self) -> String;
    /// Binding secrets resolved by a previous reconcile, read from status
    fn consumed_services(&self) -> Option<&ConsumedServices>;

    /// API group of the custom resource, e.g. `openliberty.io`
    fn group_name(&self) -> String {
        Self::group(&()).into_owned()
    }

    /// Label that marks Services for pickup by this application's ServiceMonitor
    fn monitor_label(&self) -> String {
        format!("app.{}/monitor", self.group_name())
    }

    /// Labels every child resource carries. User labels win over the
    /// defaults, except the instance label which selectors depend on.
    fn desired_labels(&self) -> BTreeMap<String, String> {
        let name = self.name_any();
        let mut labels = BTreeMap::from([
            (INSTANCE_LABEL.to_string(), name.clone()),
            (NAME_LABEL.to_string(), name.clone()),
            (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
            (COMPONENT_LABEL.to_string(), "backend".to_string()),
            (PART_OF_LABEL.to_string(), self.application_name()),
        ]);
        if !self.app_version().is_empty() {
            labels.insert(VERSION_LABEL.to_string(), self.app_version().to_string());
        }
        for (key, value) in self.labels() {
            if key != INSTANCE_LABEL {
                labels.insert(key.clone(), value.clone());
            }
        }
        labels.insert(INSTANCE_LABEL.to_string(), name);
        if self.monitoring().is_some() {
            labels.insert(self.monitor_label(), "true".to_string());
        }
        labels
    }

    /// Annotations propagated to children
    fn desired_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = self.annotations().clone();
        annotations.remove(LAST_APPLIED_ANNOTATION);
        annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{MonitoringConfig, OpenLibertyApplication, OpenLibertyApplicationSpec};

    fn app() -> OpenLibertyApplication {
        let mut app = OpenLibertyApplication::new("frontend", OpenLibertyApplicationSpec::default());
        app.metadata.namespace = Some("shop".to_string());
        app
    }

    #[test]
    fn test_desired_labels_defaults() {
        let labels = app().desired_labels();
        assert_eq!(labels[INSTANCE_LABEL], "frontend");
        assert_eq!(labels[NAME_LABEL], "frontend");
        assert_eq!(labels[MANAGED_BY_LABEL], OPERATOR_NAME);
        assert_eq!(labels[PART_OF_LABEL], "frontend");
        assert!(!labels.contains_key(VERSION_LABEL));
    }

    #[test]
    fn test_user_labels_cannot_override_instance() {
        let mut app = app();
        app.metadata.labels = Some(BTreeMap::from([
            (INSTANCE_LABEL.to_string(), "other".to_string()),
            ("team".to_string(), "payments".to_string()),
        ]));
        app.spec.version = Some("1.0.2".to_string());

        let labels = app.desired_labels();
        assert_eq!(labels[INSTANCE_LABEL], "frontend");
        assert_eq!(labels["team"], "payments");
        assert_eq!(labels[VERSION_LABEL], "1.0.2");
    }

    #[test]
    fn test_monitor_label_added_when_monitoring() {
        let mut app = app();
        app.spec.monitoring = Some(MonitoringConfig::default());
        let labels = app.desired_labels();
        assert_eq!(labels["app.openliberty.io/monitor"], "true");
    }

    #[test]
    fn test_desired_annotations_drop_last_applied() {
        let mut app = app();
        app.metadata.annotations = Some(BTreeMap::from([
            (LAST_APPLIED_ANNOTATION.to_string(), "{}".to_string()),
            ("note".to_string(), "x".to_string()),
        ]));
        let annotations = app.desired_annotations();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations["note"], "x");
    }
}
