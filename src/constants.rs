//! Well-known names shared by the controller and the customize functions

/// Name the operator identifies itself with (managed-by label, field manager)
pub const OPERATOR_NAME: &str = "open-liberty-operator";

pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const VERSION_LABEL: &str = "app.kubernetes.io/version";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

/// Annotation kubectl writes on `apply`; never copied onto children
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

pub const KAPPNAV_AUTO_CREATE_LABEL: &str = "kappnav.app.auto-create";
pub const KAPPNAV_NAME_ANNOTATION: &str = "kappnav.app.auto-create.name";
pub const KAPPNAV_KINDS_ANNOTATION: &str = "kappnav.app.auto-create.kinds";
pub const KAPPNAV_LABEL_ANNOTATION: &str = "kappnav.app.auto-create.label";
pub const KAPPNAV_LABELS_VALUES_ANNOTATION: &str = "kappnav.app.auto-create.labels-values";
pub const KAPPNAV_VERSION_ANNOTATION: &str = "kappnav.app.auto-create.version";
pub const KAPPNAV_DEFAULT_KINDS: &str = "Deployment, StatefulSet, Service, Route, Ingress, ConfigMap";

pub const KNATIVE_VISIBILITY_LABEL: &str = "serving.knative.dev/visibility";

pub const ARCH_NODE_LABEL: &str = "beta.kubernetes.io/arch";

/// Secret keys projected into consumers of a bound service
pub const SERVICE_BINDING_KEYS: [&str; 7] = [
    "username", "password", "url", "hostname", "protocol", "port", "context",
];
