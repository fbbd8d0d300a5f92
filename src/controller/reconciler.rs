//! Controller for OpenLibertyApplication resources
//!
//! Every child goes through the same steps: fetch it (or start from an
//! empty object), run its customize function, set the owner reference, then
//! create or replace it. Children the spec no longer asks for are deleted.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, SecretKeySelector, Service, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    client::Client,
    core::NamespaceResourceScope,
    discovery::Discovery,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::constants::OPERATOR_NAME;
use crate::crd::{
    BaseApplication, KnativeService, OpenLibertyApplication, OpenLibertyApplicationStatus, Route,
    ServiceMonitor, StatusConditionType, SERVICE_BINDING_CATEGORY_OPENAPI,
};
use crate::error::{Error, Result};
use crate::util::error_is_no_matches_for_kind;

use super::binding::build_service_binding_secret_name;
use super::conditions::update_condition;
use super::owner_ref::{ensure_owner_ref, owner_reference, shared_owner_reference};
use super::resources;
use super::validation::validate;

#[cfg(feature = "metrics")]
const CONTROLLER_NAME: &str = "openlibertyapplication";

/// Requeue delay while a consumed service has not published its secret yet
const DEPENDENCY_RETRY: Duration = Duration::from_secs(15);

/// Optional CRDs found in the cluster at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub routes: bool,
    pub service_monitors: bool,
    pub knative: bool,
}

impl Capabilities {
    /// Probe the API server for the third-party groups the operator can write to.
    pub async fn discover(client: &Client) -> Self {
        let route_group = Route::group(&()).into_owned();
        let monitor_group = ServiceMonitor::group(&()).into_owned();
        let knative_group = KnativeService::group(&()).into_owned();

        match Discovery::new(client.clone())
            .filter(&[&route_group, &monitor_group, &knative_group].map(String::as_str))
            .run()
            .await
        {
            Ok(discovery) => Self {
                routes: discovery.has_group(&route_group),
                service_monitors: discovery.has_group(&monitor_group),
                knative: discovery.has_group(&knative_group),
            },
            Err(e) => {
                warn!("API discovery failed, optional integrations disabled: {}", e);
                Self::default()
            }
        }
    }
}

/// Shared state for the controller
pub struct ControllerState {
    /// Kubernetes client for API interactions
    pub client: Client,
    pub capabilities: Capabilities,
    /// Namespaces to watch; empty watches the whole cluster
    pub namespaces: Vec<String>,
    /// Delay before a successfully reconciled application is looked at again
    pub requeue: Duration,
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn run_for_namespace(state: Arc<ControllerState>, namespace: Option<String>) {
    let client = state.client.clone();
    let ns = namespace.as_deref();
    let caps = state.capabilities;

    let apps = scoped_api::<OpenLibertyApplication>(&client, ns);
    let mut controller = Controller::new(apps, Config::default())
        .owns(scoped_api::<Deployment>(&client, ns), Config::default())
        .owns(scoped_api::<StatefulSet>(&client, ns), Config::default())
        .owns(scoped_api::<Service>(&client, ns), Config::default())
        .owns(scoped_api::<ServiceAccount>(&client, ns), Config::default())
        .owns(scoped_api::<Secret>(&client, ns), Config::default())
        .owns(scoped_api::<HorizontalPodAutoscaler>(&client, ns), Config::default());
    if caps.routes {
        controller = controller.owns(scoped_api::<Route>(&client, ns), Config::default());
    }
    if caps.service_monitors {
        controller = controller.owns(scoped_api::<ServiceMonitor>(&client, ns), Config::default());
    }
    if caps.knative {
        controller = controller.owns(scoped_api::<KnativeService>(&client, ns), Config::default());
    }

    info!(
        "Watching OpenLibertyApplications in {}",
        ns.unwrap_or("all namespaces")
    );

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled OpenLibertyApplication: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let apps: Api<OpenLibertyApplication> = Api::all(state.client.clone());

    info!("Starting OpenLibertyApplication controller");

    // Verify CRD exists
    match apps.list(&Default::default()).await {
        Ok(_) => info!("OpenLibertyApplication CRD is available"),
        Err(e) => {
            error!("OpenLibertyApplication CRD not found: {:?}", e);
            return Err(Error::ConfigError(
                "OpenLibertyApplication CRD not installed".to_string(),
            ));
        }
    }

    info!("Optional integrations: {:?}", state.capabilities);

    if state.namespaces.is_empty() {
        run_for_namespace(state, None).await;
    } else {
        let runs = state
            .namespaces
            .iter()
            .map(|ns| run_for_namespace(state.clone(), Some(ns.clone())));
        futures::future::join_all(runs).await;
    }

    Ok(())
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<OpenLibertyApplication>, ctx: Arc<ControllerState>) -> Result<Action> {
    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let result = reconcile_application(&obj, &ctx).await;

    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_reconcile_duration_seconds(
            CONTROLLER_NAME,
            started.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            super::metrics::inc_reconcile_error(CONTROLLER_NAME, e.kind());
        }
    }

    result
}

async fn reconcile_application(
    obj: &OpenLibertyApplication,
    ctx: &ControllerState,
) -> Result<Action> {
    let client = &ctx.client;
    let mut app = obj.clone();
    app.initialize();

    info!(
        "Reconciling OpenLibertyApplication {}/{}",
        app.namespace().unwrap_or_default(),
        app.name_any()
    );

    if let Err(e) = validate(&app) {
        warn!("Validation failed for {}: {}", app.name_any(), e);
        let message = e.to_string();
        update_status(client, &app, |status| {
            update_condition(
                status,
                StatusConditionType::Reconciled,
                false,
                "ValidationFailed",
                &message,
            )
        })
        .await?;
        return Err(e);
    }

    match reconcile_children(&mut app, ctx).await {
        Ok(action) => Ok(action),
        Err(e) => {
            let message = e.to_string();
            if let Err(status_err) = update_status(client, &app, |status| {
                update_condition(
                    status,
                    StatusConditionType::Reconciled,
                    false,
                    "ReconcileFailed",
                    &message,
                )
            })
            .await
            {
                warn!("Failed to record reconcile error on status: {}", status_err);
            }
            Err(e)
        }
    }
}

async fn reconcile_children(app: &mut OpenLibertyApplication, ctx: &ControllerState) -> Result<Action> {
    let client = &ctx.client;
    let caps = ctx.capabilities;
    let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
    let name = app.name_any();

    // 1. Service binding published by this application
    ensure_binding_secret(client, app, &namespace).await?;

    // 2. Bindings consumed from other applications
    if let Some(missing) = resolve_consumed_services(client, app, &namespace).await? {
        info!("Waiting for consumed service {} of {}", missing, name);
        let message = format!("Service {missing} is not ready yet");
        update_status(client, app, |status| {
            update_condition(
                status,
                StatusConditionType::DependenciesSatisfied,
                false,
                "DependenciesNotReady",
                &message,
            )
        })
        .await?;
        return Ok(Action::requeue(DEPENDENCY_RETRY));
    }
    let app: &OpenLibertyApplication = app;

    // 3. ServiceAccount, unless the user brings their own
    if app.service_account_name().is_some_and(|sa| !sa.is_empty()) {
        delete_if_exists::<ServiceAccount>(client, &namespace, &name).await?;
    } else {
        create_or_update(client, &namespace, &name, app, |sa: &mut ServiceAccount| {
            resources::customize_service_account(sa, app);
            Ok(())
        })
        .await?;
    }

    // 4. Workload
    if app.create_knative_service() == Some(true) {
        if !caps.knative {
            return Err(Error::ConfigError(
                "createKnativeService is set but Knative Serving is not installed".to_string(),
            ));
        }
        create_or_update(client, &namespace, &name, app, |ksvc: &mut KnativeService| {
            resources::customize_knative_service(ksvc, app)
        })
        .await?;

        delete_if_exists::<Deployment>(client, &namespace, &name).await?;
        delete_if_exists::<StatefulSet>(client, &namespace, &name).await?;
        delete_if_exists::<Service>(client, &namespace, &name).await?;
        delete_if_exists::<Service>(client, &namespace, &headless_service_name(app)).await?;
        delete_if_exists::<HorizontalPodAutoscaler>(client, &namespace, &name).await?;
        if caps.routes {
            delete_if_exists::<Route>(client, &namespace, &name).await?;
        }
        if caps.service_monitors {
            delete_if_exists::<ServiceMonitor>(client, &namespace, &name).await?;
        }

        return finish(client, app, ctx.requeue).await;
    }
    if caps.knative {
        delete_if_exists::<KnativeService>(client, &namespace, &name).await?;
    }

    create_or_update(client, &namespace, &name, app, |svc: &mut Service| {
        resources::customize_service(svc, app);
        Ok(())
    })
    .await?;

    if app.storage().is_some() {
        create_or_update(client, &namespace, &headless_service_name(app), app, |svc: &mut Service| {
            resources::customize_service(svc, app);
            if let Some(spec) = svc.spec.as_mut() {
                spec.cluster_ip = Some("None".to_string());
                spec.type_ = Some("ClusterIP".to_string());
            }
            Ok(())
        })
        .await?;

        create_or_update(client, &namespace, &name, app, |sts: &mut StatefulSet| {
            resources::customize_statefulset(sts, app);
            let spec = sts.spec.get_or_insert_with(Default::default);
            resources::customize_pod_spec(&mut spec.template, app)?;
            resources::customize_persistence(sts, app);
            Ok(())
        })
        .await?;

        delete_if_exists::<Deployment>(client, &namespace, &name).await?;
    } else {
        create_or_update(client, &namespace, &name, app, |deploy: &mut Deployment| {
            resources::customize_deployment(deploy, app);
            let spec = deploy.spec.get_or_insert_with(Default::default);
            resources::customize_pod_spec(&mut spec.template, app)
        })
        .await?;

        delete_if_exists::<StatefulSet>(client, &namespace, &name).await?;
        delete_if_exists::<Service>(client, &namespace, &headless_service_name(app)).await?;
    }

    // 5. Autoscaling
    if app.autoscaling().is_some() {
        create_or_update(client, &namespace, &name, app, |hpa: &mut HorizontalPodAutoscaler| {
            resources::customize_hpa(hpa, app);
            Ok(())
        })
        .await?;
    } else {
        delete_if_exists::<HorizontalPodAutoscaler>(client, &namespace, &name).await?;
    }

    // 6. Route
    if caps.routes {
        if app.expose() == Some(true) {
            create_or_update(client, &namespace, &name, app, |route: &mut Route| {
                resources::customize_route(route, app);
                Ok(())
            })
            .await?;
        } else {
            delete_if_exists::<Route>(client, &namespace, &name).await?;
        }
    } else if app.expose() == Some(true) {
        debug!("Route API not available, {} is not exposed", name);
    }

    // 7. ServiceMonitor
    if caps.service_monitors {
        if app.monitoring().is_some() {
            create_or_update(client, &namespace, &name, app, |sm: &mut ServiceMonitor| {
                resources::customize_service_monitor(sm, app);
                Ok(())
            })
            .await?;
        } else {
            delete_if_exists::<ServiceMonitor>(client, &namespace, &name).await?;
        }
    } else if app.monitoring().is_some() {
        warn!(
            "spec.monitoring is set on {} but the ServiceMonitor API is not installed",
            name
        );
    }

    finish(client, app, ctx.requeue).await
}

async fn finish(client: &Client, app: &OpenLibertyApplication, requeue: Duration) -> Result<Action> {
    let has_consumes = !app.service().consumes.is_empty();
    update_status(client, app, |status| {
        if has_consumes {
            update_condition(
                status,
                StatusConditionType::DependenciesSatisfied,
                true,
                "",
                "",
            );
        }
        update_condition(status, StatusConditionType::Reconciled, true, "", "");
    })
    .await?;

    Ok(Action::requeue(requeue))
}

fn headless_service_name(app: &impl BaseApplication) -> String {
    format!("{}-headless", app.name_any())
}

// ============================================================================
// Service binding
// ============================================================================

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()?
        .get(key)
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
}

async fn read_secret_key(
    client: &Client,
    namespace: &str,
    selector: &SecretKeySelector,
) -> Result<Option<String>> {
    let Some(name) = selector.name.as_deref() else {
        return Ok(None);
    };
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    Ok(api
        .get_opt(name)
        .await?
        .and_then(|secret| secret_value(&secret, &selector.key)))
}

/// Publish (or withdraw) the binding secret for `spec.service.provides`.
async fn ensure_binding_secret(
    client: &Client,
    app: &OpenLibertyApplication,
    namespace: &str,
) -> Result<()> {
    let secret_name = build_service_binding_secret_name(&app.name_any(), namespace);

    let Some(provides) = app.service().provides.as_ref() else {
        return delete_if_exists::<Secret>(client, namespace, &secret_name).await;
    };

    let mut auth = BTreeMap::new();
    if let Some(provided_auth) = &provides.auth {
        for (key, selector) in [
            ("username", &provided_auth.username),
            ("password", &provided_auth.password),
        ] {
            let Some(selector) = selector else { continue };
            match read_secret_key(client, namespace, selector).await? {
                Some(value) => {
                    auth.insert(key.to_string(), value);
                }
                None => warn!(
                    "Secret key {} referenced by {} auth not found",
                    selector.key, secret_name
                ),
            }
        }
    }

    create_or_update(client, namespace, &secret_name, app, |secret: &mut Secret| {
        resources::customize_service_binding_secret(secret, &auth, app);
        Ok(())
    })
    .await?;
    Ok(())
}

/// Record the binding secrets this application consumes in its status,
/// copying secrets from other namespaces next to the application.
///
/// Returns the first consumed service whose secret does not exist yet.
async fn resolve_consumed_services(
    client: &Client,
    app: &mut OpenLibertyApplication,
    namespace: &str,
) -> Result<Option<String>> {
    let mut resolved = Vec::new();

    for consumes in app.service().consumes.clone() {
        if consumes.category.as_str() != SERVICE_BINDING_CATEGORY_OPENAPI {
            continue;
        }
        let secret_name = build_service_binding_secret_name(&consumes.name, &consumes.namespace);
        let source_api: Api<Secret> = Api::namespaced(client.clone(), &consumes.namespace);

        let Some(source) = source_api.get_opt(&secret_name).await? else {
            return Ok(Some(format!("{}/{}", consumes.namespace, consumes.name)));
        };

        // every consumer in the namespace shares one copy
        if consumes.namespace != namespace {
            let owner = shared_owner_reference(&*app);
            create_or_update_owned(client, namespace, &secret_name, owner, |copy: &mut Secret| {
                copy.data = source.data.clone();
                copy.metadata.labels = source.metadata.labels.clone();
                Ok(())
            })
            .await?;
        }
        if !resolved.contains(&secret_name) {
            resolved.push(secret_name);
        }
    }

    let consumed = (!resolved.is_empty())
        .then(|| BTreeMap::from([(SERVICE_BINDING_CATEGORY_OPENAPI.to_string(), resolved)]));
    if app.consumed_services() != consumed.as_ref() {
        app.status
            .get_or_insert_with(OpenLibertyApplicationStatus::default)
            .consumed_services = consumed;
        update_status(client, app, |_| {}).await?;
    }

    Ok(None)
}

// ============================================================================
// Generic child handling
// ============================================================================

fn is_missing_kind<K>(err: &kube::Error) -> bool
where
    K: Resource<DynamicType = ()>,
{
    match err {
        kube::Error::Api(e) => {
            e.code == 404
                || error_is_no_matches_for_kind(&e.message, &K::kind(&()), &K::api_version(&()))
        }
        _ => false,
    }
}

fn record_child_operation<K: Resource<DynamicType = ()>>(operation: &str) {
    #[cfg(feature = "metrics")]
    super::metrics::inc_child_operation(&K::kind(&()), operation);
    #[cfg(not(feature = "metrics"))]
    let _ = operation;
}

/// Fetch `name` (or start from an empty object), let `mutate` customize it,
/// set `owner` as its controller and write it back if it changed.
async fn create_or_update<K, F>(
    client: &Client,
    namespace: &str,
    name: &str,
    owner: &OpenLibertyApplication,
    mutate: F,
) -> Result<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Default
        + Serialize
        + DeserializeOwned,
    F: FnOnce(&mut K) -> Result<()>,
{
    create_or_update_owned(client, namespace, name, owner_reference(owner), mutate).await
}

async fn create_or_update_owned<K, F>(
    client: &Client,
    namespace: &str,
    name: &str,
    owner: OwnerReference,
    mutate: F,
) -> Result<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Default
        + Serialize
        + DeserializeOwned,
    F: FnOnce(&mut K) -> Result<()>,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let kind = K::kind(&());
    let existing = api.get_opt(name).await?;

    let Some(current) = existing else {
        let mut obj = K::default();
        obj.meta_mut().name = Some(name.to_string());
        obj.meta_mut().namespace = Some(namespace.to_string());
        mutate(&mut obj)?;
        ensure_owner_ref(obj.meta_mut(), owner);

        info!("Creating {} {}/{}", kind, namespace, name);
        let created = api.create(&PostParams::default(), &obj).await?;
        record_child_operation::<K>("create");
        return Ok(created);
    };

    let mut obj = current.clone();
    mutate(&mut obj)?;
    ensure_owner_ref(obj.meta_mut(), owner);

    if serde_json::to_value(&obj)? == serde_json::to_value(&current)? {
        debug!("{} {}/{} unchanged", kind, namespace, name);
        return Ok(current);
    }

    info!("Updating {} {}/{}", kind, namespace, name);
    let updated = api.replace(name, &PostParams::default(), &obj).await?;
    record_child_operation::<K>("update");
    Ok(updated)
}

async fn delete_if_exists<K>(client: &Client, namespace: &str, name: &str) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);

    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted {} {}/{}", K::kind(&()), namespace, name);
            record_child_operation::<K>("delete");
        }
        Err(e) if is_missing_kind::<K>(&e) => {}
        Err(e) => return Err(Error::KubeError(e)),
    }
    Ok(())
}

// ============================================================================
// Status
// ============================================================================

/// Helper to update status
async fn update_status<F>(client: &Client, app: &OpenLibertyApplication, f: F) -> Result<()>
where
    F: FnOnce(&mut OpenLibertyApplicationStatus),
{
    let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<OpenLibertyApplication> = Api::namespaced(client.clone(), &namespace);

    let mut status = app.status.clone().unwrap_or_default();
    f(&mut status);
    status.observed_generation = app.metadata.generation;

    let mut patch = serde_json::json!({ "status": status });
    // a merge patch only clears a field that is explicitly null
    if status.consumed_services.is_none() {
        patch["status"]["consumedServices"] = serde_json::Value::Null;
    }
    api.patch_status(
        &app.name_any(),
        &PatchParams::apply(OPERATOR_NAME),
        &Patch::Merge(&patch),
    )
    .await?;

    Ok(())
}

/// Error policy for the controller
fn error_policy(
    app: Arc<OpenLibertyApplication>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    error!("Reconciliation error for {}: {:?}", app.name_any(), error);

    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::OpenLibertyApplicationSpec;
    use k8s_openapi::ByteString;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "NotFound".to_string(),
            code,
        })
    }

    #[test]
    fn test_missing_kind_detection() {
        assert!(is_missing_kind::<Route>(&api_error(404, "not found")));
        assert!(is_missing_kind::<Route>(&api_error(
            400,
            "no matches for kind \"Route\" in version \"route.openshift.io/v1\""
        )));
        assert!(!is_missing_kind::<Route>(&api_error(403, "forbidden")));
    }

    #[test]
    fn test_secret_value() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                "password".to_string(),
                ByteString(b"s3cret".to_vec()),
            )])),
            ..Default::default()
        };
        assert_eq!(secret_value(&secret, "password").as_deref(), Some("s3cret"));
        assert!(secret_value(&secret, "username").is_none());
        assert!(secret_value(&Secret::default(), "password").is_none());
    }

    #[test]
    fn test_headless_service_name() {
        let app = OpenLibertyApplication::new("frontend", OpenLibertyApplicationSpec::default());
        assert_eq!(headless_service_name(&app), "frontend-headless");
    }

    #[test]
    fn test_capabilities_default_disabled() {
        let caps = Capabilities::default();
        assert!(!caps.routes && !caps.service_monitors && !caps.knative);
    }
}
