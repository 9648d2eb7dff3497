// cli.rs - Shared Command-Line Options

//! Flags common to every cmdmesh binary.

use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{ConfigError, NodeConfig};
use crate::network::{GossipConfig, TransportError};
use crate::observability::{
    init_metrics, init_tracing, MetricsConfig, MetricsHandle, TracingConfig, TracingFormat,
};

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Config file path (TOML); CMDMESH_* environment variables override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[arg(long, default_value = "pretty")]
    pub log_format: TracingFormat,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics listen address
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,
}

impl CommonArgs {
    pub fn init_tracing(&self) -> Result<(), tracing_subscriber::util::TryInitError> {
        init_tracing(TracingConfig::for_cli(&self.log_level, self.log_format))
    }

    /// Start the metrics endpoint if requested; failures are logged, not fatal
    pub fn init_metrics(&self) -> Option<MetricsHandle> {
        if !self.metrics {
            return None;
        }
        let config = MetricsConfig {
            listen_addr: self.metrics_addr,
            ..Default::default()
        };
        match init_metrics(config) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to initialize metrics");
                None
            }
        }
    }

    pub fn load_config(&self) -> Result<NodeConfig, ConfigError> {
        let config = NodeConfig::load(self.config.as_deref())?;
        info!(
            pubsub_topic = %config.pubsub_topic,
            content_topic = %config.content_topic,
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Gossip settings for a node, listening on `bind` if given
pub fn gossip_config(bind: Option<&str>, node: &NodeConfig) -> Result<GossipConfig, TransportError> {
    let config = GossipConfig::default().with_dial_timeout(node.connect_timeout());
    match bind {
        Some(raw) => {
            let addr = raw.parse().map_err(|e: libp2p::multiaddr::Error| {
                TransportError::InvalidAddress {
                    address: raw.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Ok(config.with_listen_addr(addr))
        }
        None => Ok(config.without_listening()),
    }
}
