use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::{Env, LogFormat};

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub const DEFAULT_FILTER: &str = "risk_scorer=debug,tower_http=debug,axum=info,sqlx=warn,info";

#[derive(Debug)]
pub struct Telemetry {
    service_name: String,
    log_format: LogFormat,
    providers: Option<OtlpProviders>,
}

#[derive(Debug)]
struct OtlpProviders {
    logger_provider: SdkLoggerProvider,
    tracer_provider: SdkTracerProvider,
}

impl Telemetry {
    pub fn new(env: &Env) -> Result<Telemetry> {
        let service_name = env.service_name.clone();
        let log_format = env.log_format()?;

        let providers = match env.otel_endpoint() {
            Some(collector_url) => {
                let base_resource = base_attrs(&service_name, env!("CARGO_PKG_VERSION"));
                Some(OtlpProviders {
                    logger_provider: build_logger_provider(collector_url, base_resource.clone())?,
                    tracer_provider: build_tracer_provider(collector_url, base_resource)?,
                })
            }
            None => None,
        };

        Ok(Self {
            service_name,
            log_format,
            providers,
        })
    }

    /// Installs the global subscriber. OTLP layers are only attached when a collector endpoint
    /// was configured.
    pub fn register(self) -> Self {
        let trace_layer = self.providers.as_ref().map(|p| {
            let tracer = p.tracer_provider.tracer(self.service_name.clone());
            tracing_opentelemetry::layer().with_tracer(tracer)
        });
        let log_layer = self
            .providers
            .as_ref()
            .map(|p| OpenTelemetryTracingBridge::new(&p.logger_provider));

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let (pretty, json) = match self.log_format {
            LogFormat::Pretty => (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true),
                ),
                None,
            ),
            LogFormat::Json => (
                None,
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(true),
                ),
            ),
        };

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(filter)
            .with(pretty)
            .with(json)
            .init();

        self
    }

    pub fn shutdown(self) {
        let Some(providers) = self.providers else {
            return;
        };

        if let Err(e) = providers.logger_provider.shutdown() {
            eprintln!("error during logging shutdown: {e:?}");
        }

        if let Err(e) = providers.tracer_provider.shutdown() {
            eprintln!("error during tracing shutdown: {e:?}");
        }
    }
}

fn build_logger_provider(collector_url: &str, base_resource: Resource) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn build_tracer_provider(collector_url: &str, base_resource: Resource) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn base_attrs(name: &str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name.to_string()),
            KeyValue::new("service.version", version),
        ])
        .build()
}
