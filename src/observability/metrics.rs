// observability/metrics.rs - Prometheus Metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Metrics setup errors
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Metrics exporter setup failed: {0}")]
    Exporter(#[from] BuildError),
}

/// Configuration for metrics
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to expose metrics endpoint
    pub listen_addr: SocketAddr,

    /// Histogram buckets for command execution time (in seconds)
    pub execution_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            execution_buckets: vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0],
        }
    }
}

/// Handle to the Prometheus metrics exporter
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Envelope traffic metrics
pub struct EnvelopeMetrics;

impl EnvelopeMetrics {
    pub const RECEIVED_TOTAL: &'static str = "cmdmesh_envelopes_received_total";
    pub const DECODE_FAILURES_TOTAL: &'static str = "cmdmesh_decode_failures_total";
    pub const MALFORMED_FRAMES_TOTAL: &'static str = "cmdmesh_malformed_frames_total";
    pub const PUBLISHED_TOTAL: &'static str = "cmdmesh_envelopes_published_total";
}

/// Command execution metrics
pub struct CommandMetrics;

impl CommandMetrics {
    pub const EXECUTED_TOTAL: &'static str = "cmdmesh_commands_executed_total";
    pub const EXECUTION_SECONDS: &'static str = "cmdmesh_command_execution_seconds";
    pub const IN_FLIGHT: &'static str = "cmdmesh_dispatches_in_flight";
}

/// Bootstrap metrics
pub struct BootstrapMetrics;

impl BootstrapMetrics {
    pub const ATTEMPTS_TOTAL: &'static str = "cmdmesh_bootstrap_attempts_total";
}

/// Initialize the metrics system
///
/// Starts an HTTP server on the configured address to expose Prometheus metrics.
/// Returns a handle that can be used to render metrics programmatically.
pub fn init_metrics(config: MetricsConfig) -> Result<MetricsHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(CommandMetrics::EXECUTION_SECONDS.into()),
            &config.execution_buckets,
        )?
        .install_recorder()?;
    let metrics_handle = MetricsHandle {
        handle: handle.clone(),
    };

    let listen_addr = config.listen_addr;
    let shared_handle = std::sync::Arc::new(handle);

    tokio::spawn(async move {
        use axum::{http::StatusCode, routing::get, Json, Router};
        use serde::Serialize;

        #[derive(Serialize)]
        struct HealthResponse {
            status: &'static str,
            version: &'static str,
            uptime_secs: u64,
        }

        let start_time = std::time::Instant::now();

        let handle_for_route = shared_handle.clone();
        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let h = handle_for_route.clone();
                    async move { h.render() }
                }),
            )
            .route(
                "/health",
                get(move || {
                    let uptime = start_time.elapsed().as_secs();
                    async move {
                        Json(HealthResponse {
                            status: "healthy",
                            version: env!("CARGO_PKG_VERSION"),
                            uptime_secs: uptime,
                        })
                    }
                }),
            )
            .route("/live", get(|| async { StatusCode::OK }));

        match tokio::net::TcpListener::bind(listen_addr).await {
            Ok(listener) => {
                tracing::info!(addr = %listen_addr, "Metrics HTTP server started");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, addr = %listen_addr, "Failed to bind metrics server");
            }
        }
    });

    describe_metrics();
    tracing::info!(addr = %config.listen_addr, "Metrics initialized");

    Ok(metrics_handle)
}

fn describe_metrics() {
    describe_counter!(
        EnvelopeMetrics::RECEIVED_TOTAL,
        "Envelopes pulled from the subscription"
    );
    describe_counter!(
        EnvelopeMetrics::DECODE_FAILURES_TOTAL,
        "Envelopes no configured key could open"
    );
    describe_counter!(
        EnvelopeMetrics::MALFORMED_FRAMES_TOTAL,
        "Decoded plaintexts that were not valid frames"
    );
    describe_counter!(
        EnvelopeMetrics::PUBLISHED_TOTAL,
        "Envelopes published, by kind"
    );

    describe_counter!(
        CommandMetrics::EXECUTED_TOTAL,
        "Commands executed, by status"
    );
    describe_histogram!(
        CommandMetrics::EXECUTION_SECONDS,
        "Command execution time in seconds"
    );
    describe_gauge!(CommandMetrics::IN_FLIGHT, "Dispatch tasks currently running");

    describe_counter!(
        BootstrapMetrics::ATTEMPTS_TOTAL,
        "Bootstrap candidate attempts, by outcome"
    );
}

// Recording functions

/// Record an envelope arriving on the subscription
pub fn record_envelope_received() {
    counter!(EnvelopeMetrics::RECEIVED_TOTAL).increment(1);
}

/// Record an envelope that no strategy could decode
pub fn record_decode_failure() {
    counter!(EnvelopeMetrics::DECODE_FAILURES_TOTAL).increment(1);
}

/// Record a plaintext that failed frame parsing
pub fn record_malformed_frame() {
    counter!(EnvelopeMetrics::MALFORMED_FRAMES_TOTAL).increment(1);
}

/// Record an envelope being published
pub fn record_envelope_published(kind: &'static str) {
    counter!(EnvelopeMetrics::PUBLISHED_TOTAL, "kind" => kind).increment(1);
}

/// Record a finished command execution
pub fn record_command_executed(status: &'static str, duration: Duration) {
    counter!(CommandMetrics::EXECUTED_TOTAL, "status" => status).increment(1);
    histogram!(CommandMetrics::EXECUTION_SECONDS).record(duration.as_secs_f64());
}

/// Record a dispatch task starting
pub fn record_dispatch_started() {
    gauge!(CommandMetrics::IN_FLIGHT).increment(1.0);
}

/// Record a dispatch task finishing
pub fn record_dispatch_finished() {
    gauge!(CommandMetrics::IN_FLIGHT).decrement(1.0);
}

/// Record one bootstrap candidate attempt
pub fn record_bootstrap_attempt(connected: bool) {
    let outcome = if connected { "connected" } else { "failed" };
    counter!(BootstrapMetrics::ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}
