//! Open Liberty Operator Entry Point
//!
//! Starts the Kubernetes controller and the metrics/health server.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use open_liberty_operator::controller::{self, Capabilities};
use open_liberty_operator::{telemetry, util, Error};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "open-liberty-operator", version, about)]
struct Args {
    /// Comma-separated namespaces to watch; empty watches the whole cluster
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    watch_namespace: String,

    /// Address for the /metrics and /healthz endpoints
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8383")]
    metrics_addr: std::net::SocketAddr,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Seconds between periodic reconciles of a healthy application
    #[arg(long, env = "REQUEUE_SECONDS", default_value_t = 300)]
    requeue_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = match args.log_format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    if telemetry::otel_enabled() {
        let otel_layer = telemetry::init_telemetry(&registry)?;
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }

    info!(
        "Starting Open Liberty Operator v{} ({} built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_SHA"),
        env!("BUILD_DATE")
    );

    let client = kube::Client::try_default().await.map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let namespaces = util::get_watch_namespaces(&args.watch_namespace);
    if namespaces.is_empty() {
        info!("Watching all namespaces");
    } else {
        info!("Watching namespaces: {}", namespaces.join(","));
    }

    let capabilities = Capabilities::discover(&client).await;

    let state = Arc::new(controller::ControllerState {
        client,
        capabilities,
        namespaces,
        requeue: Duration::from_secs(args.requeue_seconds),
    });

    #[cfg(feature = "metrics")]
    {
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = open_liberty_operator::server::run_server(addr).await {
                tracing::error!("Metrics server error: {:?}", e);
            }
        });
    }

    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    telemetry::shutdown_telemetry();

    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["open-liberty-operator"]);
        #[cfg(feature = "metrics")]
        assert_eq!(args.metrics_addr.port(), 8383);
        assert_eq!(args.requeue_seconds, 300);
        assert!(matches!(args.log_format, LogFormat::Text));
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from([
            "open-liberty-operator",
            "--watch-namespace",
            "ns1,ns2",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.watch_namespace, "ns1,ns2");
        assert!(matches!(args.log_format, LogFormat::Json));
    }
}
