// node/mod.rs - Node Roles

//! The three node roles built on a [`Transport`](crate::network::Transport):
//!
//! - `agent` - receives commands, executes them, publishes results
//! - `controller` - publishes operator commands, collects results
//! - `relay` - bootstrap node that forwards traffic without decrypting it

pub mod agent;
pub mod controller;
pub mod relay;

pub use agent::{AgentNode, RunningAgent, ShutdownReport};
pub use controller::{ControllerNode, ReceivedResult};
pub use relay::{inspect, EnvelopeSummary, RelayMonitor};

use thiserror::Error;

use crate::codec::CodecError;
use crate::network::{ContentFilter, TransportError};
use crate::config::NodeConfig;

/// Per-message node errors; never fatal to a running node
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Filter for the command channel described by `config`
pub fn command_filter(config: &NodeConfig) -> ContentFilter {
    ContentFilter::new(config.pubsub_topic.clone(), config.content_topic.clone())
}
