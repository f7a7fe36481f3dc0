//! Logging, tracing and metrics.
//!
//! Console logs are always on and filtered by `RUST_LOG` (default `info`).
//! OpenTelemetry export is opt-in:
//!
//! - `traces`: request and engine spans.
//! - `metrics`: `requests`, `ids_generated` and `errors` counters, each
//!   labelled with the ID family (`snowflake`, `segment`, `random`).
//! - `stdout`: print exported data every five seconds.
//! - `honeycomb`: ship exported data over OTLP/gRPC. Reads
//!   `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET`, `HONEYCOMB_ENDPOINT` and
//!   `HONEYCOMB_COMPRESSION`.
//!
//! Exporters need at least one of `traces` or `metrics`; both exporters may
//! be enabled together.
//!
//! ```bash
//! cargo run -p fyllo-server --features traces,metrics,stdout
//! ```

#[cfg(all(
    any(feature = "honeycomb", feature = "stdout"),
    not(any(feature = "traces", feature = "metrics"))
))]
compile_error!(
    "The 'honeycomb' and 'stdout' features require at least one of 'traces' or 'metrics'."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(any(feature = "metrics", feature = "traces"))]
const SERVICE_NAME: &str = "fyllo";
#[cfg(any(feature = "stdout", feature = "honeycomb"))]
const EXPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Exporter handles that must outlive the server so buffered data can be
/// flushed on exit.
pub struct TelemetryProviders {
    #[cfg(feature = "traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and stops the exporters. Errors go to stderr because the
    /// subscriber may already be torn down.
    pub fn shutdown(self) {
        #[cfg(feature = "traces")]
        {
            let provider = &self.tracer_provider;
            report("flush traces", provider.force_flush());
            report("shut down tracer", provider.shutdown());
        }
        #[cfg(feature = "metrics")]
        {
            let provider = &self.meter_provider;
            report("flush metrics", provider.force_flush());
            report("shut down meter", provider.shutdown());
        }
    }
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn report<E: core::fmt::Debug>(action: &str, result: Result<(), E>) {
    if let Err(err) = result {
        eprintln!("failed to {action}: {err:#?}");
    }
}

/// Installs the global subscriber and, when enabled, the OpenTelemetry
/// providers and metric handles.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    let console = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .pretty();
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(console);

    #[cfg(any(feature = "metrics", feature = "traces"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    #[cfg(feature = "traces")]
    let (registry, tracer_provider) = {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
        let provider = tracer_provider()?;
        opentelemetry::global::set_tracer_provider(provider.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        (registry.with(layer), provider)
    };

    #[cfg(feature = "metrics")]
    let (registry, meter_provider) = {
        let provider = meter_provider()?;
        opentelemetry::global::set_meter_provider(provider.clone());
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (registry.with(layer), provider)
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "traces")]
fn tracer_provider() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    #[allow(unused_mut)]
    let mut builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        builder = builder.with_span_processor(batched(exporter));
    }

    #[cfg(feature = "honeycomb")]
    {
        use anyhow::Context;
        use opentelemetry_otlp::WithTonicConfig;

        let honeycomb = honeycomb::Settings::from_env()?;
        let exporter = honeycomb
            .apply(opentelemetry_otlp::SpanExporter::builder().with_tonic())
            .build()
            .context("failed to build span exporter")?;
        builder = builder.with_span_processor(batched(exporter));
    }

    Ok(builder.build())
}

#[cfg(all(feature = "traces", any(feature = "stdout", feature = "honeycomb")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: sdktrace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "metrics")]
fn meter_provider() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    #[allow(unused_mut)]
    let mut builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(EXPORT_INTERVAL)
            .build();
        builder = builder.with_reader(reader);
    }

    #[cfg(feature = "honeycomb")]
    {
        use anyhow::Context;
        use opentelemetry_otlp::WithTonicConfig;

        let honeycomb = honeycomb::Settings::from_env()?;
        let exporter = honeycomb
            .apply(opentelemetry_otlp::MetricExporter::builder().with_tonic())
            .with_temporality(sdkmetrics::Temporality::Delta)
            .build()
            .context("failed to build metric exporter")?;
        builder = builder.with_periodic_exporter(exporter);
    }

    Ok(builder.build())
}

#[cfg(feature = "honeycomb")]
mod honeycomb {
    use anyhow::Context;
    use core::str::FromStr;
    use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
    use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

    /// OTLP settings shared by the span and metric exporters.
    pub(super) struct Settings {
        endpoint: String,
        compression: Compression,
        metadata: MetadataMap,
    }

    impl Settings {
        pub(super) fn from_env() -> anyhow::Result<Self> {
            let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

            let mut metadata = MetadataMap::new();
            metadata.insert(
                "x-honeycomb-team",
                var("HONEYCOMB_API_KEY")?.parse().context("invalid API key")?,
            );
            metadata.insert(
                "x-honeycomb-dataset",
                var("HONEYCOMB_DATASET")?.parse().context("invalid dataset")?,
            );

            Ok(Self {
                endpoint: var("HONEYCOMB_ENDPOINT")?,
                compression: Compression::from_str(
                    &var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase(),
                )?,
                metadata,
            })
        }

        pub(super) fn apply<B>(self, builder: B) -> B
        where
            B: WithExportConfig + WithTonicConfig,
        {
            builder
                .with_tls_config(ClientTlsConfig::new().with_native_roots())
                .with_metadata(self.metadata)
                .with_compression(self.compression)
                .with_timeout(std::time::Duration::from_secs(10))
                .with_endpoint(self.endpoint)
                .with_protocol(Protocol::Grpc)
        }
    }
}

#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static IDS_GENERATED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ERRORS: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let counter = |name: &'static str, description: &'static str| {
        meter.u64_counter(name).with_description(description).build()
    };
    let _ = REQUESTS.set(counter("requests", "ID requests received"));
    let _ = IDS_GENERATED.set(counter("ids_generated", "IDs handed out"));
    let _ = ERRORS.set(counter("errors", "ID requests that failed"));
}

#[cfg(feature = "metrics")]
fn add(counter: &OnceLock<Counter<u64>>, family: &'static str) {
    if let Some(counter) = counter.get() {
        counter.add(1, &[KeyValue::new("family", family)]);
    }
}

// No-ops without the `metrics` feature.

pub fn increment_requests(_family: &'static str) {
    #[cfg(feature = "metrics")]
    add(&REQUESTS, _family);
}

pub fn increment_ids_generated(_family: &'static str) {
    #[cfg(feature = "metrics")]
    add(&IDS_GENERATED, _family);
}

pub fn increment_errors(_family: &'static str) {
    #[cfg(feature = "metrics")]
    add(&ERRORS, _family);
}
