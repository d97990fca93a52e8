use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_stdout::SpanExporter;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "speedprobe-server";
const OTEL_STDOUT_ENV: &str = "SPEEDPROBE_OTEL_STDOUT";

/// Negotiation is dominated by ICE gathering, which is capped at the
/// request's `timeout` (1 to 60 seconds).
const NEGOTIATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 60.0];
/// A full probe run is a few seconds; sessions never outlive their TTL.
const SESSION_LIFETIME_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 4.0, 6.0, 10.0, 15.0, 20.0, 30.0, 60.0];

/// Install the process-wide Prometheus recorder and describe every series
/// the server and the probe crate emit.
pub fn install_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("rtc_probe_negotiation_seconds".into()),
            NEGOTIATION_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("rtc_probe_session_lifetime_seconds".into()),
            SESSION_LIFETIME_BUCKETS,
        )?
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "rtc_probe_sessions_created_total",
        "Peer sessions created for an inbound offer."
    );
    describe_counter!(
        "rtc_probe_sessions_closed_total",
        "Peer sessions closed, labelled by close reason."
    );
    describe_counter!(
        "rtc_probe_negotiation_failures_total",
        "Offers that did not produce an answer, labelled by failure stage."
    );
    describe_counter!(
        "rtc_probe_packets_sent_total",
        "Timestamped probe frames written to data channels."
    );
    describe_counter!(
        "rtc_probe_aborted_total",
        "Probe runs cut short by a failed send."
    );
    describe_gauge!(
        "rtc_probe_sessions_active",
        "Sessions currently held in the registry."
    );
    describe_histogram!(
        "rtc_probe_negotiation_seconds",
        Unit::Seconds,
        "Time from offer receipt to a complete answer."
    );
    describe_histogram!(
        "rtc_probe_session_lifetime_seconds",
        Unit::Seconds,
        "Time from session creation to close."
    );
    describe_counter!(
        "speedprobe_download_bytes_total",
        Unit::Bytes,
        "Bytes streamed by the download endpoint."
    );
    describe_counter!(
        "speedprobe_upload_bytes_total",
        Unit::Bytes,
        "Bytes accepted by the upload endpoint."
    );
    describe_counter!(
        "speedprobe_upload_rejected_total",
        "Uploads refused for exceeding the size limit."
    );
    describe_counter!(
        "speedprobe_telemetry_entries_total",
        "Client telemetry payloads stored."
    );
}

/// Keeps the optional span exporter alive and flushes it on drop.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(err) = provider.shutdown() {
            warn!(error = %err, "span exporter shutdown failed");
        }
    }
}

/// Log to stdout, filtered by `RUST_LOG` (default `info`). Setting
/// `SPEEDPROBE_OTEL_STDOUT` also dumps spans through OpenTelemetry.
pub fn init_tracing() -> Result<TracingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = env_truthy(OTEL_STDOUT_ENV).then(span_provider);
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(otel_layer)
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(TracingGuard { provider })
}

fn span_provider() -> SdkTracerProvider {
    let resource = Resource::builder()
        .with_attributes([KeyValue::new("service.name", SERVICE_NAME)])
        .build();
    SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(resource)
        .build()
}

fn env_truthy(key: &str) -> bool {
    std::env::var(key).is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
