// lib.rs - cmdmesh Command Channel
//
// A minimal command channel over gossip pub/sub: controllers publish
// encrypted commands, agents execute them and publish results back.

#![doc = include_str!("../README.md")]

pub mod cli;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod frame;
pub mod keys;
pub mod network;
pub mod node;
pub mod observability;
pub mod resolver;

// Re-export commonly used types
pub use codec::{
    agent_decode_order, controller_decode_order, CodecError, DecodedMessage, Envelope,
    KeyStrategy, MessageCodec, StrategyKind, PROTOCOL_VERSION,
};

pub use config::{ConfigError, NodeConfig};

pub use dispatch::{CommandDispatcher, ExecutionStatus, FailurePolicy, ResultMessage};

pub use frame::{CommandFrame, FrameError};

pub use keys::{KeyError, KeyMaterial};

pub use network::{
    connect, ConnectError, ConnectionOutcome, ContentFilter, Subscription, Transport,
    TransportError,
};

pub use node::{AgentNode, ControllerNode, NodeError, RunningAgent, ShutdownReport};

pub use resolver::{resolve, AddressRegistry, RegistryError, ResolveError};

pub use observability::{init_metrics, init_tracing, MetricsConfig, TracingConfig, TracingFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::{Envelope, KeyStrategy, MessageCodec};
    pub use crate::config::NodeConfig;
    pub use crate::keys::KeyMaterial;
    pub use crate::network::{connect, ContentFilter, Transport};
    pub use crate::node::{AgentNode, ControllerNode};
    pub use crate::resolver::{resolve, AddressRegistry};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
