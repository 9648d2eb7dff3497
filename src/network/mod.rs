// network/mod.rs - Network Layer

//! Pub/sub plumbing for cmdmesh nodes.
//!
//! This module provides:
//! - `Transport` - the publish/subscribe capability nodes are written against
//! - `GossipTransport` - libp2p gossipsub implementation
//! - `MemoryNetwork` - in-process implementation for tests and local runs
//! - `connect` - ordered bootstrap candidate walk

pub mod connector;
pub mod gossip;
pub mod memory;
pub mod transport;

pub use connector::{connect, ConnectError, Connection, ConnectionOutcome};
pub use gossip::{tcp_addr, GossipConfig, GossipTransport};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use transport::{ContentFilter, Subscription, Transport, TransportError};
