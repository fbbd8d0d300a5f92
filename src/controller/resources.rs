//! Customize functions
//!
//! Each function copies the application's desired state onto a child
//! object fetched from (or about to be created in) the cluster. Fields the
//! application does not set are left as the cluster has them, and missing
//! sub-objects are created first, so running a function twice gives the
//! same result as running it once.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvVar, EnvVarSource, LocalObjectReference, NodeAffinity,
    NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, PreferredSchedulingTerm, Probe, Secret,
    SecretKeySelector, SecretVolumeSource, Service, ServiceAccount, ServicePort, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::ResourceExt;

use crate::constants::{
    ARCH_NODE_LABEL, INSTANCE_LABEL, KAPPNAV_AUTO_CREATE_LABEL, KAPPNAV_DEFAULT_KINDS,
    KAPPNAV_KINDS_ANNOTATION, KAPPNAV_LABELS_VALUES_ANNOTATION, KAPPNAV_LABEL_ANNOTATION,
    KAPPNAV_NAME_ANNOTATION, KAPPNAV_VERSION_ANNOTATION, KNATIVE_VISIBILITY_LABEL,
    SERVICE_BINDING_KEYS,
};
use crate::crd::knative::RevisionTemplateSpec;
use crate::crd::service_monitor::Endpoint;
use crate::crd::{
    BaseApplication, KnativeService, Route, ServiceMonitor, SERVICE_BINDING_CATEGORY_OPENAPI,
};
use crate::error::Result;

use super::binding::{find_consumes, normalize_env_variable_name};
use super::resource_meta::apply_app_meta;

// ============================================================================
// Helpers
// ============================================================================

fn port_name(app: &impl BaseApplication) -> String {
    format!("{}-tcp", app.service().port)
}

fn instance_selector(app: &impl BaseApplication) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(
            INSTANCE_LABEL.to_string(),
            app.name_any(),
        )])),
        ..Default::default()
    }
}

fn selector_is_empty(selector: &LabelSelector) -> bool {
    selector.match_labels.is_none() && selector.match_expressions.is_none()
}

fn first_container(pod_spec: &mut PodSpec) -> &mut Container {
    if pod_spec.containers.is_empty() {
        pod_spec.containers.push(Container::default());
    }
    &mut pod_spec.containers[0]
}

fn first_container_port(container: &mut Container) -> &mut ContainerPort {
    let ports = container.ports.get_or_insert_with(Vec::new);
    if ports.is_empty() {
        ports.push(ContainerPort::default());
    }
    &mut ports[0]
}

fn service_account_name(app: &impl BaseApplication) -> String {
    match app.service_account_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => app.name_any(),
    }
}

fn app_definition_on_meta(meta: &mut ObjectMeta, app: &impl BaseApplication) {
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    update_app_definition(labels, annotations, app);
}

// ============================================================================
// Workloads
// ============================================================================

pub fn customize_deployment(deploy: &mut Deployment, app: &impl BaseApplication) {
    apply_app_meta(&mut deploy.metadata, app);

    let spec = deploy.spec.get_or_insert_with(Default::default);
    spec.replicas = app.replicas();
    if selector_is_empty(&spec.selector) {
        spec.selector = instance_selector(app);
    }

    app_definition_on_meta(&mut deploy.metadata, app);
}

pub fn customize_statefulset(statefulset: &mut StatefulSet, app: &impl BaseApplication) {
    apply_app_meta(&mut statefulset.metadata, app);

    let spec = statefulset.spec.get_or_insert_with(Default::default);
    spec.replicas = app.replicas();
    spec.service_name = format!("{}-headless", app.name_any());
    if selector_is_empty(&spec.selector) {
        spec.selector = instance_selector(app);
    }

    app_definition_on_meta(&mut statefulset.metadata, app);
}

/// Add or remove the kAppNav auto-create keys.
pub fn update_app_definition(
    labels: &mut BTreeMap<String, String>,
    annotations: &mut BTreeMap<String, String>,
    app: &impl BaseApplication,
) {
    if app.create_app_definition() == Some(false) {
        labels.remove(KAPPNAV_AUTO_CREATE_LABEL);
        for key in [
            KAPPNAV_NAME_ANNOTATION,
            KAPPNAV_KINDS_ANNOTATION,
            KAPPNAV_LABEL_ANNOTATION,
            KAPPNAV_LABELS_VALUES_ANNOTATION,
            KAPPNAV_VERSION_ANNOTATION,
        ] {
            annotations.remove(key);
        }
        return;
    }

    let name = app.name_any();
    labels.insert(KAPPNAV_AUTO_CREATE_LABEL.to_string(), "true".to_string());
    annotations.insert(KAPPNAV_NAME_ANNOTATION.to_string(), name.clone());
    annotations.insert(
        KAPPNAV_KINDS_ANNOTATION.to_string(),
        KAPPNAV_DEFAULT_KINDS.to_string(),
    );
    annotations.insert(KAPPNAV_LABEL_ANNOTATION.to_string(), INSTANCE_LABEL.to_string());
    annotations.insert(KAPPNAV_LABELS_VALUES_ANNOTATION.to_string(), name);
    if app.app_version().is_empty() {
        annotations.remove(KAPPNAV_VERSION_ANNOTATION);
    } else {
        annotations.insert(
            KAPPNAV_VERSION_ANNOTATION.to_string(),
            app.app_version().to_string(),
        );
    }
}

/// Fill the pod template the Deployment or StatefulSet runs.
pub fn customize_pod_spec(template: &mut PodTemplateSpec, app: &impl BaseApplication) -> Result<()> {
    apply_app_meta(template.metadata.get_or_insert_with(Default::default), app);

    let pod_spec = template.spec.get_or_insert_with(Default::default);
    let port_name = port_name(app);

    let container = first_container(pod_spec);
    container.name = "app".to_string();
    let port = first_container_port(container);
    port.container_port = app.service().port;
    port.name = Some(port_name);

    container.image = Some(app.application_image().to_string());
    if let Some(resources) = app.resource_constraints() {
        container.resources = Some(resources.clone());
    }
    container.readiness_probe = app.readiness_probe().cloned();
    container.liveness_probe = app.liveness_probe().cloned();
    if let Some(policy) = app.pull_policy() {
        container.image_pull_policy = Some(policy.as_str().to_string());
    }
    container.env = app.env().map(<[EnvVar]>::to_vec);
    container.env_from = app.env_from().map(<[_]>::to_vec);
    container.volume_mounts = app.volume_mounts().map(<[_]>::to_vec);

    if let Some(init_containers) = app.init_containers() {
        pod_spec.init_containers = Some(init_containers.to_vec());
    }
    pod_spec.volumes = app.volumes().map(<[_]>::to_vec);

    customize_consumed_services(pod_spec, app)?;

    pod_spec.service_account_name = Some(service_account_name(app));
    pod_spec.restart_policy = Some("Always".to_string());
    pod_spec.dns_policy = Some("ClusterFirst".to_string());

    if !app.architecture().is_empty() {
        let mut affinity = Affinity::default();
        customize_affinity(&mut affinity, app);
        pod_spec.affinity = Some(affinity);
    }

    Ok(())
}

/// Project the binding secrets listed in status into the first container,
/// as a mounted volume when the consumer asked for a mount path and as
/// environment variables otherwise.
pub fn customize_consumed_services(pod_spec: &mut PodSpec, app: &impl BaseApplication) -> Result<()> {
    let Some(secrets) = app
        .consumed_services()
        .and_then(|consumed| consumed.get(SERVICE_BINDING_CATEGORY_OPENAPI))
    else {
        return Ok(());
    };

    for secret_name in secrets {
        let consumes = find_consumes(secret_name, app)?;

        match consumes.mount_path.as_deref().filter(|p| !p.is_empty()) {
            Some(mount_path) => {
                let mount = VolumeMount {
                    name: secret_name.clone(),
                    mount_path: [mount_path, &consumes.namespace, &consumes.name].join("/"),
                    read_only: Some(true),
                    ..Default::default()
                };
                first_container(pod_spec)
                    .volume_mounts
                    .get_or_insert_with(Vec::new)
                    .push(mount);

                pod_spec.volumes.get_or_insert_with(Vec::new).push(Volume {
                    name: secret_name.clone(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(secret_name.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            }
            None => {
                let prefix = normalize_env_variable_name(&format!(
                    "{}_{}_",
                    consumes.namespace, consumes.name
                ));
                let env = first_container(pod_spec).env.get_or_insert_with(Vec::new);
                for key in SERVICE_BINDING_KEYS {
                    env.push(EnvVar {
                        name: format!("{prefix}{}", key.to_uppercase()),
                        value_from: Some(EnvVarSource {
                            secret_key_ref: Some(SecretKeySelector {
                                name: Some(secret_name.clone()),
                                key: key.to_string(),
                                optional: Some(true),
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    });
                }
            }
        }
    }

    Ok(())
}

/// Give a StatefulSet its volume claim and mount it.
pub fn customize_persistence(statefulset: &mut StatefulSet, app: &impl BaseApplication) {
    let Some(storage) = app.storage() else {
        return;
    };
    let spec = statefulset.spec.get_or_insert_with(Default::default);

    let templates = spec.volume_claim_templates.get_or_insert_with(Vec::new);
    if templates.is_empty() {
        let pvc = match &storage.volume_claim_template {
            Some(template) => template.clone(),
            None => {
                let size = storage.size.clone().unwrap_or_default();
                PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some("pvc".to_string()),
                        namespace: app.namespace(),
                        labels: Some(app.desired_labels()),
                        annotations: Some(app.desired_annotations()),
                        ..Default::default()
                    },
                    spec: Some(PersistentVolumeClaimSpec {
                        access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                        resources: Some(VolumeResourceRequirements {
                            requests: Some(BTreeMap::from([(
                                "storage".to_string(),
                                Quantity(size),
                            )])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            }
        };
        templates.push(pvc);
    }

    let Some(mount_path) = storage.mount_path.as_deref().filter(|p| !p.is_empty()) else {
        return;
    };
    let claim_name = templates[0].metadata.name.clone().unwrap_or_default();

    let pod_spec = spec.template.spec.get_or_insert_with(Default::default);
    let mounts = first_container(pod_spec)
        .volume_mounts
        .get_or_insert_with(Vec::new);
    if !mounts.iter().any(|m| m.name == claim_name) {
        mounts.push(VolumeMount {
            name: claim_name,
            mount_path: mount_path.to_string(),
            ..Default::default()
        });
    }
}

/// Node affinity that requires one of the listed architectures and
/// prefers them in list order.
pub fn customize_affinity(affinity: &mut Affinity, app: &impl BaseApplication) {
    let archs = app.architecture();
    let arch_term = |values: Vec<String>| NodeSelectorTerm {
        match_expressions: Some(vec![NodeSelectorRequirement {
            key: ARCH_NODE_LABEL.to_string(),
            operator: "In".to_string(),
            values: Some(values),
        }]),
        ..Default::default()
    };

    let preferred = archs
        .iter()
        .enumerate()
        .map(|(i, arch)| PreferredSchedulingTerm {
            weight: (archs.len() - i) as i32,
            preference: arch_term(vec![arch.clone()]),
        })
        .collect();

    affinity.node_affinity = Some(NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![arch_term(archs.to_vec())],
        }),
        preferred_during_scheduling_ignored_during_execution: Some(preferred),
    });
}

// ============================================================================
// Networking
// ============================================================================

pub fn customize_service(svc: &mut Service, app: &impl BaseApplication) {
    apply_app_meta(&mut svc.metadata, app);

    let port = app.service().port;
    let spec = svc.spec.get_or_insert_with(Default::default);
    let ports = spec.ports.get_or_insert_with(Vec::new);
    if ports.is_empty() {
        ports.push(ServicePort::default());
    }
    ports[0].port = port;
    ports[0].target_port = Some(IntOrString::Int(port));
    ports[0].name = Some(port_name(app));

    spec.type_ = Some(app.service().type_.as_str().to_string());
    spec.selector = Some(BTreeMap::from([(
        INSTANCE_LABEL.to_string(),
        app.name_any(),
    )]));
}

pub fn customize_route(route: &mut Route, app: &impl BaseApplication) {
    apply_app_meta(&mut route.metadata, app);

    route.spec.to.kind = "Service".to_string();
    route.spec.to.name = app.name_any();
    route.spec.to.weight = Some(100);
    route
        .spec
        .port
        .get_or_insert_with(Default::default)
        .target_port = IntOrString::String(port_name(app));
}

/// Publish connection details for consumers of this application.
///
/// `auth` holds the resolved `username`/`password` values, if any.
pub fn customize_service_binding_secret(
    secret: &mut Secret,
    auth: &BTreeMap<String, String>,
    app: &impl BaseApplication,
) {
    apply_app_meta(&mut secret.metadata, app);

    let provides = app.service().provides.as_ref();
    let protocol = provides.map_or("http", |p| p.protocol());
    let hostname = format!(
        "{}.{}.svc.cluster.local",
        app.name_any(),
        app.namespace().unwrap_or_default()
    );

    let mut data = BTreeMap::new();
    let mut url = format!("{protocol}://{hostname}");
    data.insert("hostname".to_string(), hostname);
    data.insert("protocol".to_string(), protocol.to_string());

    if app.create_knative_service() != Some(true) {
        let port = app.service().port.to_string();
        url = format!("{url}:{port}");
        data.insert("port".to_string(), port);
    }

    if let Some(context) = provides
        .and_then(|p| p.context.as_deref())
        .filter(|c| !c.is_empty())
    {
        let context = context.trim_start_matches('/');
        url = format!("{url}/{context}");
        data.insert("context".to_string(), context.to_string());
    }
    data.insert("url".to_string(), url);

    for key in ["username", "password"] {
        if let Some(value) = auth.get(key) {
            data.insert(key.to_string(), value.clone());
        }
    }

    secret.data = Some(
        data.into_iter()
            .map(|(k, v)| (k, ByteString(v.into_bytes())))
            .collect(),
    );
}

pub fn customize_service_account(sa: &mut ServiceAccount, app: &impl BaseApplication) {
    apply_app_meta(&mut sa.metadata, app);

    if let Some(pull_secret) = app.pull_secret() {
        let secrets = sa.image_pull_secrets.get_or_insert_with(Vec::new);
        match secrets.first_mut() {
            Some(first) => first.name = Some(pull_secret.to_string()),
            None => secrets.push(LocalObjectReference {
                name: Some(pull_secret.to_string()),
            }),
        }
    }
}

// ============================================================================
// Optional integrations
// ============================================================================

fn clear_probe_ports(probe: Option<&mut Probe>) {
    let Some(probe) = probe else {
        return;
    };
    if let Some(http_get) = probe.http_get.as_mut() {
        http_get.port = IntOrString::Int(0);
    }
    if let Some(tcp_socket) = probe.tcp_socket.as_mut() {
        tcp_socket.port = IntOrString::Int(0);
    }
}

pub fn customize_knative_service(ksvc: &mut KnativeService, app: &impl BaseApplication) -> Result<()> {
    apply_app_meta(&mut ksvc.metadata, app);

    // an explicit expose always wins over a visibility label set by the user
    let labels = ksvc.metadata.labels.get_or_insert_with(BTreeMap::new);
    if app.expose() == Some(true) {
        labels.remove(KNATIVE_VISIBILITY_LABEL);
    } else {
        labels.insert(
            KNATIVE_VISIBILITY_LABEL.to_string(),
            "cluster-local".to_string(),
        );
    }

    let template = ksvc
        .spec
        .template
        .get_or_insert_with(RevisionTemplateSpec::default);
    apply_app_meta(template.metadata.get_or_insert_with(Default::default), app);

    let pod_spec = &mut template.spec.pod_spec;
    let container = first_container(pod_spec);
    first_container_port(container).container_port = app.service().port;
    container.image = Some(app.application_image().to_string());
    container.readiness_probe = app.readiness_probe().cloned();
    container.liveness_probe = app.liveness_probe().cloned();
    if let Some(policy) = app.pull_policy() {
        container.image_pull_policy = Some(policy.as_str().to_string());
    }
    container.env = app.env().map(<[_]>::to_vec);
    container.env_from = app.env_from().map(<[_]>::to_vec);
    container.volume_mounts = app.volume_mounts().map(<[_]>::to_vec);
    pod_spec.volumes = app.volumes().map(<[_]>::to_vec);

    customize_consumed_services(pod_spec, app)?;

    pod_spec.service_account_name = Some(service_account_name(app));

    // Knative assigns probe ports itself and rejects explicit ones
    let container = first_container(pod_spec);
    clear_probe_ports(container.liveness_probe.as_mut());
    clear_probe_ports(container.readiness_probe.as_mut());

    Ok(())
}

pub fn customize_hpa(hpa: &mut HorizontalPodAutoscaler, app: &impl BaseApplication) {
    apply_app_meta(&mut hpa.metadata, app);

    let spec = hpa.spec.get_or_insert_with(Default::default);
    if let Some(autoscaling) = app.autoscaling() {
        spec.max_replicas = autoscaling.max_replicas;
        spec.min_replicas = autoscaling.min_replicas;
        spec.target_cpu_utilization_percentage = autoscaling.target_cpu_utilization_percentage;
    }

    let target = &mut spec.scale_target_ref;
    target.name = app.name_any();
    target.api_version = Some("apps/v1".to_string());
    target.kind = if app.storage().is_some() {
        "StatefulSet"
    } else {
        "Deployment"
    }
    .to_string();
}

fn override_endpoint(endpoint: &mut Endpoint, custom: &Endpoint) {
    fn set_if_present(target: &mut Option<String>, value: &Option<String>) {
        if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
            *target = Some(v.clone());
        }
    }

    set_if_present(&mut endpoint.scheme, &custom.scheme);
    set_if_present(&mut endpoint.interval, &custom.interval);
    set_if_present(&mut endpoint.path, &custom.path);
    set_if_present(&mut endpoint.scrape_timeout, &custom.scrape_timeout);
    set_if_present(&mut endpoint.bearer_token_file, &custom.bearer_token_file);
    if custom.tls_config.is_some() {
        endpoint.tls_config = custom.tls_config.clone();
    }
    if custom.basic_auth.is_some() {
        endpoint.basic_auth = custom.basic_auth.clone();
    }
    if custom.params.is_some() {
        endpoint.params = custom.params.clone();
    }
}

pub fn customize_service_monitor(sm: &mut ServiceMonitor, app: &impl BaseApplication) {
    apply_app_meta(&mut sm.metadata, app);

    sm.spec.selector.match_labels = Some(BTreeMap::from([
        (INSTANCE_LABEL.to_string(), app.name_any()),
        (app.monitor_label(), "true".to_string()),
    ]));

    if sm.spec.endpoints.is_empty() {
        sm.spec.endpoints.push(Endpoint::default());
    }
    sm.spec.endpoints[0].port = Some(port_name(app));

    let Some(monitoring) = app.monitoring() else {
        return;
    };
    if !monitoring.labels.is_empty() {
        sm.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(monitoring.labels.clone());
    }
    if let Some(custom) = monitoring.endpoints.first() {
        override_endpoint(&mut sm.spec.endpoints[0], custom);
    }
}
