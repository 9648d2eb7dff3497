// observability/mod.rs - Tracing and Metrics

//! Structured logging and optional Prometheus metrics.
//!
//! # Example
//!
//! ```ignore
//! use cmdmesh::observability::{init_tracing, init_metrics, MetricsConfig, TracingConfig};
//!
//! init_tracing(TracingConfig::default())?;
//! let handle = init_metrics(MetricsConfig::default())?;
//! ```

mod metrics;
mod tracing_setup;

pub use metrics::{
    init_metrics, record_bootstrap_attempt, record_command_executed, record_decode_failure,
    record_dispatch_finished, record_dispatch_started, record_envelope_published,
    record_envelope_received, record_malformed_frame, BootstrapMetrics, CommandMetrics,
    EnvelopeMetrics, MetricsConfig, MetricsError, MetricsHandle,
};

pub use tracing_setup::{init_tracing, TracingConfig, TracingFormat};
