//! The image pull policy on the CR is carried onto the workload containers.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use open_liberty_operator::controller::{
    customize_deployment, customize_knative_service, customize_pod_spec, customize_statefulset,
};
use open_liberty_operator::crd::{
    KnativeService, OpenLibertyApplication, OpenLibertyApplicationSpec, PullPolicy, StorageConfig,
};

fn pull_policy_app(policy: Option<PullPolicy>) -> OpenLibertyApplication {
    let mut app = OpenLibertyApplication::new(
        "example-liberty-pullpolicy",
        OpenLibertyApplicationSpec {
            application_image: "openliberty/open-liberty:kernel-java8-openj9-ubi".to_string(),
            replicas: Some(1),
            pull_policy: policy,
            ..Default::default()
        },
    );
    app.metadata.namespace = Some("default".to_string());
    app
}

fn deployment_for(app: &OpenLibertyApplication) -> Deployment {
    let mut deploy = Deployment::default();
    customize_deployment(&mut deploy, app);
    let spec = deploy.spec.as_mut().unwrap();
    customize_pod_spec(&mut spec.template, app).unwrap();
    deploy
}

fn first_container_policy(deploy: &Deployment) -> Option<String> {
    deploy.spec.as_ref()?.template.spec.as_ref()?.containers[0]
        .image_pull_policy
        .clone()
}

#[test]
fn deployment_container_uses_always() {
    let app = pull_policy_app(Some(PullPolicy::Always));
    let deploy = deployment_for(&app);

    assert_eq!(first_container_policy(&deploy).as_deref(), Some("Always"));
    assert_eq!(deploy.spec.as_ref().unwrap().replicas, Some(1));
}

#[test]
fn unset_policy_leaves_cluster_default() {
    let app = pull_policy_app(None);
    let deploy = deployment_for(&app);

    assert_eq!(first_container_policy(&deploy), None);
}

#[test]
fn policy_change_is_applied_on_next_reconcile() {
    let mut app = pull_policy_app(Some(PullPolicy::Always));
    let mut deploy = deployment_for(&app);

    app.spec.pull_policy = Some(PullPolicy::IfNotPresent);
    let spec = deploy.spec.as_mut().unwrap();
    customize_pod_spec(&mut spec.template, &app).unwrap();

    assert_eq!(
        first_container_policy(&deploy).as_deref(),
        Some("IfNotPresent")
    );
}

#[test]
fn statefulset_container_uses_never() {
    let mut app = pull_policy_app(Some(PullPolicy::Never));
    app.spec.storage = Some(StorageConfig {
        size: Some("1Gi".to_string()),
        ..Default::default()
    });

    let mut statefulset = StatefulSet::default();
    customize_statefulset(&mut statefulset, &app);
    let spec = statefulset.spec.as_mut().unwrap();
    customize_pod_spec(&mut spec.template, &app).unwrap();

    let container = &spec.template.spec.as_ref().unwrap().containers[0];
    assert_eq!(container.image_pull_policy.as_deref(), Some("Never"));
}

#[test]
fn knative_container_uses_always() {
    let app = pull_policy_app(Some(PullPolicy::Always));
    let mut ksvc = KnativeService::new("example-liberty-pullpolicy", Default::default());
    customize_knative_service(&mut ksvc, &app).unwrap();

    let ksvc = serde_json::to_value(&ksvc).unwrap();
    assert_eq!(
        ksvc["spec"]["template"]["spec"]["containers"][0]["imagePullPolicy"],
        "Always"
    );
}
