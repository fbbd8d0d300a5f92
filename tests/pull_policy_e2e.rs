//! End-to-end check that `spec.pullPolicy` reaches the generated Deployment.
//!
//! Needs `kind`, `kubectl` and `docker` on PATH. Run with:
//! `cargo test --test pull_policy_e2e -- --ignored --nocapture`

use std::error::Error;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

const OPERATOR_NAMESPACE: &str = "open-liberty-operator-system";
const TEST_NAMESPACE: &str = "liberty-pullpolicy";
const OPERATOR_NAME: &str = "open-liberty-operator";
const APP_NAME: &str = "example-liberty-pullpolicy";
const APP_IMAGE: &str = "openliberty/open-liberty:kernel-java8-openj9-ubi";

type TestResult<T = ()> = Result<T, Box<dyn Error>>;

#[test]
#[ignore]
fn e2e_pull_policy_always() -> TestResult {
    for tool in &["kind", "kubectl", "docker"] {
        if !tool_available(tool) {
            eprintln!("Skipping e2e test: `{tool}` not found in PATH.");
            return Ok(());
        }
    }

    let cluster_name =
        std::env::var("KIND_CLUSTER_NAME").unwrap_or_else(|_| "open-liberty-e2e".into());
    ensure_kind_cluster(&cluster_name)?;

    // ── Install the CRD ──────────────────────────────────────────────────────
    let crd_yaml = run_cmd(env!("CARGO_BIN_EXE_crdgen"), &[])?;
    kubectl_apply(&crd_yaml)?;
    run_cmd(
        "kubectl",
        &[
            "wait",
            "--for=condition=Established",
            "crd/openlibertyapplications.openliberty.io",
            "--timeout=60s",
        ],
    )?;

    // ── Deploy the operator ──────────────────────────────────────────────────
    let image = std::env::var("E2E_OPERATOR_IMAGE")
        .unwrap_or_else(|_| "open-liberty-operator:e2e".into());
    if env_true("E2E_BUILD_IMAGE", true) {
        run_cmd("docker", &["build", "-t", &image, "."])?;
    }
    if env_true("E2E_LOAD_IMAGE", true) {
        run_cmd(
            "kind",
            &["load", "docker-image", &image, "--name", &cluster_name],
        )?;
    }

    let operator_yaml = operator_manifest(&image);
    let _cleanup = Cleanup {
        operator_manifest: operator_yaml.clone(),
    };

    for ns in &[OPERATOR_NAMESPACE, TEST_NAMESPACE] {
        ensure_namespace(ns)?;
    }
    kubectl_apply(&operator_yaml)?;
    run_cmd(
        "kubectl",
        &[
            "rollout",
            "status",
            &format!("deployment/{OPERATOR_NAME}"),
            "-n",
            OPERATOR_NAMESPACE,
            "--timeout=180s",
        ],
    )?;

    // ── Apply the application ────────────────────────────────────────────────
    kubectl_apply(&application_manifest())?;

    wait_for("Deployment created", Duration::from_secs(120), || {
        Ok(run_cmd(
            "kubectl",
            &["get", "deployment", APP_NAME, "-n", TEST_NAMESPACE],
        )
        .is_ok())
    })?;

    let policy = run_cmd(
        "kubectl",
        &[
            "get",
            "deployment",
            APP_NAME,
            "-n",
            TEST_NAMESPACE,
            "-o",
            "jsonpath={.spec.template.spec.containers[0].imagePullPolicy}",
        ],
    )?;
    assert_eq!(policy, "Always", "unexpected imagePullPolicy");

    wait_for("Reconciled == True", Duration::from_secs(120), || {
        let status = run_cmd(
            "kubectl",
            &[
                "get",
                "openlibertyapplication",
                APP_NAME,
                "-n",
                TEST_NAMESPACE,
                "-o",
                "jsonpath={.status.conditions[?(@.type=='Reconciled')].status}",
            ],
        )
        .unwrap_or_default();
        Ok(status == "True")
    })?;

    Ok(())
}

fn application_manifest() -> String {
    format!(
        r#"apiVersion: openliberty.io/v1beta1
kind: OpenLibertyApplication
metadata:
  name: {APP_NAME}
  namespace: {TEST_NAMESPACE}
spec:
  applicationImage: {APP_IMAGE}
  replicas: 1
  pullPolicy: Always
"#
    )
}

fn operator_manifest(image: &str) -> String {
    format!(
        r#"---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: {OPERATOR_NAME}
  namespace: {OPERATOR_NAMESPACE}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: {OPERATOR_NAME}
rules:
  - apiGroups: ["openliberty.io"]
    resources: ["openlibertyapplications", "openlibertyapplications/status"]
    verbs: ["get", "list", "watch", "update", "patch"]
  - apiGroups: [""]
    resources: ["services", "serviceaccounts", "secrets"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
  - apiGroups: ["apps"]
    resources: ["deployments", "statefulsets"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
  - apiGroups: ["autoscaling"]
    resources: ["horizontalpodautoscalers"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
  - apiGroups: ["route.openshift.io"]
    resources: ["routes"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
  - apiGroups: ["monitoring.coreos.com"]
    resources: ["servicemonitors"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
  - apiGroups: ["serving.knative.dev"]
    resources: ["services"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {OPERATOR_NAME}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: {OPERATOR_NAME}
subjects:
  - kind: ServiceAccount
    name: {OPERATOR_NAME}
    namespace: {OPERATOR_NAMESPACE}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {OPERATOR_NAME}
  namespace: {OPERATOR_NAMESPACE}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {OPERATOR_NAME}
  template:
    metadata:
      labels:
        app: {OPERATOR_NAME}
    spec:
      serviceAccountName: {OPERATOR_NAME}
      containers:
        - name: operator
          image: {image}
          imagePullPolicy: IfNotPresent
          env:
            - name: WATCH_NAMESPACE
              value: {TEST_NAMESPACE}
"#
    )
}

struct Cleanup {
    operator_manifest: String,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = run_cmd(
            "kubectl",
            &[
                "delete",
                "openlibertyapplication",
                APP_NAME,
                "-n",
                TEST_NAMESPACE,
                "--ignore-not-found=true",
                "--timeout=60s",
            ],
        );
        let _ = run_cmd_with_stdin("kubectl", &["delete", "-f", "-"], &self.operator_manifest);
        for ns in &[TEST_NAMESPACE, OPERATOR_NAMESPACE] {
            let _ = run_cmd(
                "kubectl",
                &["delete", "namespace", ns, "--ignore-not-found=true"],
            );
        }
    }
}

fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn env_true(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn ensure_kind_cluster(name: &str) -> TestResult {
    let clusters = run_cmd("kind", &["get", "clusters"])?;
    if clusters.lines().any(|line| line.trim() == name) {
        return Ok(());
    }
    run_cmd("kind", &["create", "cluster", "--name", name])?;
    Ok(())
}

fn ensure_namespace(ns: &str) -> TestResult {
    let yaml = run_cmd(
        "kubectl",
        &["create", "namespace", ns, "--dry-run=client", "-o", "yaml"],
    )?;
    kubectl_apply(&yaml)
}

fn kubectl_apply(manifest: &str) -> TestResult {
    run_cmd_with_stdin("kubectl", &["apply", "-f", "-"], manifest)
}

fn kube_command(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    cmd
}

fn check_output(program: &str, args: &[&str], output: &std::process::Output) -> TestResult {
    if output.status.success() {
        return Ok(());
    }
    Err(format!(
        "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
        program,
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
    .into())
}

fn run_cmd(program: &str, args: &[&str]) -> TestResult<String> {
    let output = kube_command(program, args).output()?;
    check_output(program, args, &output)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_cmd_with_stdin(program: &str, args: &[&str], input: &str) -> TestResult {
    use std::io::Write;

    let mut child = kube_command(program, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    check_output(program, args, &output)
}

fn wait_for<F>(label: &str, timeout: Duration, mut condition: F) -> TestResult
where
    F: FnMut() -> TestResult<bool>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        if condition()? {
            return Ok(());
        }
        attempts += 1;
        if start.elapsed() > timeout {
            return Err(format!(
                "timeout while waiting for {label} after {timeout:?} (attempts={attempts})"
            )
            .into());
        }
        sleep(Duration::from_secs(3));
    }
}
