//! Telemetry logic.
//! Support logging, with optional OTLP export of logs and traces.

use opentelemetry::global::{self, BoxedSpan};
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Telemetry;
use crate::pipeline::RunReport;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn ressources() -> Resource {
    Resource::builder().with_service_name("propsync").build()
}

/// Keeps OTLP providers alive until [`TelemetryGuard::shutdown`].
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    logger: Option<SdkLoggerProvider>,
    tracer: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Flush pending exports.
    pub fn shutdown(self) {
        if let Some(logger) = self.logger {
            if let Err(err) = logger.shutdown() {
                eprintln!("failed to flush OTLP logs: {err}");
            }
        }
        if let Some(tracer) = self.tracer {
            if let Err(err) = tracer.shutdown() {
                eprintln!("failed to flush OTLP traces: {err}");
            }
        }
    }
}

/// Create tracer for OTLP.
pub fn setup_tracer(endpoint: &str) -> Result<SdkTracerProvider, BoxError> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(ressources())
        .build())
}

/// Create OTLP exporter for logs.
pub fn setup_logging(endpoint: &str) -> Result<SdkLoggerProvider, BoxError> {
    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_resource(ressources())
        .with_batch_exporter(exporter)
        .build())
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured filter.
pub fn init(config: &Telemetry) -> Result<TelemetryGuard, BoxError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))?;
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let mut guard = TelemetryGuard::default();
    let bridge = match &config.otlp_endpoint {
        Some(endpoint) => {
            let logger = setup_logging(endpoint)?;
            let bridge = OpenTelemetryTracingBridge::new(&logger);

            let tracer = setup_tracer(endpoint)?;
            global::set_tracer_provider(tracer.clone());

            guard.logger = Some(logger);
            guard.tracer = Some(tracer);
            Some(bridge)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .with(bridge)
        .try_init()?;

    Ok(guard)
}

/// Start the span covering a whole run.
pub fn start_run(dry_run: bool) -> BoxedSpan {
    let tracer = global::tracer("propsync");
    tracer
        .span_builder("pipeline-run")
        .with_attributes([KeyValue::new("dry_run", dry_run)])
        .start(&tracer)
}

/// Close the run span carried by `cx` with counts and outcome.
pub fn end_run(
    cx: &Context,
    report: Option<&RunReport>,
    failure: Option<(&'static str, String)>,
) {
    let span = cx.span();
    if let Some(report) = report {
        span.set_attribute(KeyValue::new(
            "records_read",
            report.records_read as i64,
        ));
        span.set_attribute(KeyValue::new(
            "rows_shaped",
            report.rows_shaped as i64,
        ));
        span.set_attribute(KeyValue::new(
            "rows_dropped",
            report.rows_dropped as i64,
        ));
    }

    match failure {
        Some((stage, message)) => {
            span.set_attribute(KeyValue::new("stage", stage));
            span.set_status(Status::error(message));
        },
        None => span.set_status(Status::Ok),
    }

    span.end();
}
