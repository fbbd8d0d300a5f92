//! OpenTelemetry initialization
//!
//! Spans are exported over OTLP/gRPC when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use std::env;

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime,
    trace::{self, Sampler},
    Resource,
};
use tracing_subscriber::{registry::LookupSpan, Layer};

use crate::constants::OPERATOR_NAME;
use crate::error::{Error, Result};

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Whether span export was requested through the environment
pub fn otel_enabled() -> bool {
    env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
}

/// Build the tracing layer that forwards spans to the OTLP collector.
pub fn init_telemetry<S>(_subscriber: &S) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", OPERATOR_NAME),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&otlp_endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            trace::config()
                .with_resource(resource)
                .with_sampler(Sampler::AlwaysOn),
        )
        .install_batch(runtime::Tokio)
        .map_err(|e| Error::ConfigError(format!("failed to initialize OpenTelemetry: {e}")))?;

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Flush and shut down the global tracer provider
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
