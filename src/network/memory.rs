// network/memory.rs - In-Process Transport

//! In-process pub/sub hub.
//!
//! Nodes attach to a shared [`MemoryNetwork`]; listeners are addressed as
//! `/memory/<port>` multiaddrs. Publishing fans out to every matching
//! subscription of other nodes on the hub.

use async_trait::async_trait;
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::transport::{
    ContentFilter, Subscription, Transport, TransportError, SUBSCRIPTION_BUFFER,
};
use crate::codec::Envelope;

struct Subscriber {
    owner: u64,
    filter: ContentFilter,
    sender: mpsc::Sender<Envelope>,
}

#[derive(Default)]
struct HubState {
    listeners: HashSet<u64>,
    subscribers: Vec<Subscriber>,
    next_node: u64,
}

/// Shared in-process network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<HubState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_node(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_node += 1;
        state.next_node
    }

    /// A node listening on `/memory/<port>`
    pub fn listen(&self, port: u64) -> MemoryTransport {
        let node_id = self.next_node();
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .insert(port);
        MemoryTransport {
            network: self.clone(),
            node_id,
            listen_port: Some(port),
            peers: Mutex::new(Vec::new()),
        }
    }

    /// A node that only dials out
    pub fn client(&self) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            node_id: self.next_node(),
            listen_port: None,
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Number of live subscriptions on the hub
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers.retain(|s| !s.sender.is_closed());
        state.subscribers.len()
    }
}

/// One node's view of a [`MemoryNetwork`]
pub struct MemoryTransport {
    network: MemoryNetwork,
    node_id: u64,
    listen_port: Option<u64>,
    peers: Mutex<Vec<u64>>,
}

impl MemoryTransport {
    pub fn listen_address(&self) -> Option<Multiaddr> {
        self.listen_port
            .map(|port| Multiaddr::empty().with(Protocol::Memory(port)))
    }

    fn has_peers(&self) -> bool {
        self.listen_port.is_some() || !self.peers.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Address = Multiaddr;

    fn parse_address(&self, raw: &str) -> Result<Multiaddr, TransportError> {
        raw.parse::<Multiaddr>()
            .map_err(|e| TransportError::InvalidAddress {
                address: raw.to_string(),
                reason: e.to_string(),
            })
    }

    async fn add_peer(&self, address: &Multiaddr) -> Result<(), TransportError> {
        let port = address
            .iter()
            .find_map(|p| match p {
                Protocol::Memory(port) => Some(port),
                _ => None,
            })
            .ok_or_else(|| TransportError::AddPeer {
                address: address.to_string(),
                reason: "not a /memory address".into(),
            })?;

        let listening = self
            .network
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .contains(&port);
        if !listening {
            return Err(TransportError::AddPeer {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }

        self.peers.lock().unwrap_or_else(|e| e.into_inner()).push(port);
        debug!(%address, node = self.node_id, "Memory peer added");
        Ok(())
    }

    async fn subscribe(&self, filter: &ContentFilter) -> Result<Subscription, TransportError> {
        if !self.has_peers() {
            return Err(TransportError::NoPeers);
        }
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.network
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .push(Subscriber {
                owner: self.node_id,
                filter: filter.clone(),
                sender,
            });
        Ok(Subscription::new(filter.clone(), receiver))
    }

    async fn publish(&self, pubsub_topic: &str, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.has_peers() {
            return Err(TransportError::NoPeers);
        }
        let mut state = self.network.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers.retain(|s| !s.sender.is_closed());
        for subscriber in &state.subscribers {
            if subscriber.owner == self.node_id || !subscriber.filter.matches(pubsub_topic, envelope) {
                continue;
            }
            if subscriber.sender.try_send(envelope.clone()).is_err() {
                trace!(owner = subscriber.owner, "Subscriber buffer full, envelope dropped");
            }
        }
        Ok(())
    }
}
