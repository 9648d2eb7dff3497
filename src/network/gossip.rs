// network/gossip.rs - libp2p Gossipsub Transport

//! Gossipsub transport backed by a libp2p swarm.
//!
//! The swarm is owned by a background event loop; [`GossipTransport`] talks
//! to it over a command channel, so the handle can be shared freely between
//! tasks. Every established connection is registered as an explicit
//! gossipsub peer, which keeps small deployments (one relay, a handful of
//! nodes) delivering without waiting for mesh formation.

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    gossipsub, identify,
    identity::Keypair,
    multiaddr::Protocol,
    noise,
    swarm::{dial_opts::DialOpts, ConnectionId, NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::transport::{
    ContentFilter, Subscription, Transport, TransportError, SUBSCRIPTION_BUFFER,
};
use crate::codec::Envelope;

const IDENTIFY_PROTOCOL: &str = "/cmdmesh/id/1.0.0";

/// Gossip transport configuration
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Node identity
    pub keypair: Keypair,

    /// Listen addresses
    pub listen_addrs: Vec<Multiaddr>,

    /// How long a dial may take before the peer counts as failed
    pub dial_timeout: Duration,

    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            keypair: Keypair::generate_ed25519(),
            listen_addrs: vec![tcp_addr(Ipv4Addr::UNSPECIFIED, 0)],
            dial_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl GossipConfig {
    pub fn with_keypair(mut self, keypair: Keypair) -> Self {
        self.keypair = keypair;
        self
    }

    /// Replace the listen addresses with a single one
    pub fn with_listen_addr(mut self, addr: Multiaddr) -> Self {
        self.listen_addrs = vec![addr];
        self
    }

    /// Dial only, never listen
    pub fn without_listening(mut self) -> Self {
        self.listen_addrs.clear();
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}

/// `/ip4/<ip>/tcp/<port>`
pub fn tcp_addr(ip: Ipv4Addr, port: u16) -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::Ip4(ip))
        .with(Protocol::Tcp(port))
}

#[derive(NetworkBehaviour)]
struct MeshBehaviour {
    gossipsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
}

enum Command {
    Dial {
        address: Multiaddr,
        reply: oneshot::Sender<Result<PeerId, String>>,
    },
    Subscribe {
        filter: ContentFilter,
        sender: mpsc::Sender<Envelope>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
    Shutdown,
}

/// Handle to a running gossip swarm
#[derive(Clone)]
pub struct GossipTransport {
    commands: mpsc::Sender<Command>,
    local_peer_id: PeerId,
    dial_timeout: Duration,
}

impl GossipTransport {
    /// Build the swarm, start listening and spawn its event loop
    pub fn start(config: GossipConfig) -> Result<(Self, JoinHandle<()>), TransportError> {
        let local_peer_id = config.keypair.public().to_peer_id();
        let mut swarm = build_swarm(&config)?;

        for addr in &config.listen_addrs {
            swarm
                .listen_on(addr.clone())
                .map_err(|e| TransportError::AddPeer {
                    address: addr.to_string(),
                    reason: format!("listen failed: {}", e),
                })?;
        }

        let (commands, command_rx) = mpsc::channel(256);
        let event_loop = EventLoop {
            swarm,
            commands: command_rx,
            pending_dials: HashMap::new(),
            subscribers: Vec::new(),
            listen_addrs: Vec::new(),
        };
        let handle = tokio::spawn(event_loop.run());

        info!(peer_id = %local_peer_id, "Gossip transport started");
        Ok((
            Self {
                commands,
                local_peer_id,
                dial_timeout: config.dial_timeout,
            },
            handle,
        ))
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Addresses the swarm is currently listening on
    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListenAddrs { reply }).await?;
        rx.await.map_err(|_| TransportError::NotRunning)
    }

    /// Stop the event loop
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TransportError::NotRunning)
    }
}

fn build_swarm(config: &GossipConfig) -> Result<Swarm<MeshBehaviour>, TransportError> {
    let setup = |e: String| TransportError::Subscribe(format!("swarm setup failed: {}", e));

    let swarm = SwarmBuilder::with_existing_identity(config.keypair.clone())
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| setup(e.to_string()))?
        .with_behaviour(|key| {
            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(1))
                .validation_mode(gossipsub::ValidationMode::Strict)
                .build()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )?;

            let identify = identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTOCOL.to_string(),
                key.public(),
            ));

            Ok(MeshBehaviour {
                gossipsub,
                identify,
            })
        })
        .map_err(|e| setup(e.to_string()))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(config.idle_timeout))
        .build();

    Ok(swarm)
}

struct EventLoop {
    swarm: Swarm<MeshBehaviour>,
    commands: mpsc::Receiver<Command>,
    pending_dials: HashMap<ConnectionId, oneshot::Sender<Result<PeerId, String>>>,
    subscribers: Vec<(ContentFilter, mpsc::Sender<Envelope>)>,
    listen_addrs: Vec<Multiaddr>,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        info!("Gossip transport shutting down");
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { address, reply } => {
                let opts = DialOpts::unknown_peer_id().address(address.clone()).build();
                let connection_id = opts.connection_id();
                match self.swarm.dial(opts) {
                    Ok(()) => {
                        debug!(%address, "Dialing peer");
                        self.pending_dials.insert(connection_id, reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
            Command::Subscribe {
                filter,
                sender,
                reply,
            } => {
                let topic = gossipsub::IdentTopic::new(filter.pubsub_topic.clone());
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .subscribe(&topic)
                    .map(|_| ())
                    .map_err(|e| e.to_string());
                if result.is_ok() {
                    debug!(topic = %filter.pubsub_topic, "Subscribed to gossip topic");
                    self.subscribers.push((filter, sender));
                }
                let _ = reply.send(result);
            }
            Command::Publish { topic, data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(gossipsub::IdentTopic::new(topic), data)
                    .map(|_| ())
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            Command::ListenAddrs { reply } => {
                let _ = reply.send(self.listen_addrs.clone());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<MeshBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "Listening");
                self.listen_addrs.push(address);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                ..
            } => {
                debug!(%peer_id, "Connection established");
                self.swarm
                    .behaviour_mut()
                    .gossipsub
                    .add_explicit_peer(&peer_id);
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(peer_id));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                error,
                ..
            } => {
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(error.to_string()));
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(%peer_id, "Connection closed");
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                message,
                ..
            })) => self.route_message(message),
            SwarmEvent::Behaviour(MeshBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed {
                peer_id,
                topic,
            })) => {
                debug!(%peer_id, %topic, "Peer subscribed");
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                trace!(%peer_id, agent = %info.agent_version, "Identified peer");
            }
            _ => {}
        }
    }

    fn route_message(&mut self, message: gossipsub::Message) {
        let envelope = match Envelope::from_bytes(&message.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(source = ?message.source, error = %e, "Dropping undecodable gossip message");
                return;
            }
        };

        let topic = message.topic.as_str();
        self.subscribers.retain(|(_, sender)| !sender.is_closed());
        for (filter, sender) in &self.subscribers {
            if filter.matches(topic, &envelope) && sender.try_send(envelope.clone()).is_err() {
                trace!(topic, "Subscriber buffer full, envelope dropped");
            }
        }
    }
}

#[async_trait]
impl Transport for GossipTransport {
    type Address = Multiaddr;

    fn parse_address(&self, raw: &str) -> Result<Multiaddr, TransportError> {
        raw.parse::<Multiaddr>()
            .map_err(|e| TransportError::InvalidAddress {
                address: raw.to_string(),
                reason: e.to_string(),
            })
    }

    async fn add_peer(&self, address: &Multiaddr) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Dial {
            address: address.clone(),
            reply,
        })
        .await?;

        let result = tokio::time::timeout(self.dial_timeout, rx)
            .await
            .map_err(|_| TransportError::Timeout(self.dial_timeout))?
            .map_err(|_| TransportError::NotRunning)?;

        let peer_id = result.map_err(|reason| TransportError::AddPeer {
            address: address.to_string(),
            reason,
        })?;
        info!(%address, %peer_id, "Peer connected");
        Ok(())
    }

    async fn subscribe(&self, filter: &ContentFilter) -> Result<Subscription, TransportError> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            filter: filter.clone(),
            sender,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| TransportError::NotRunning)?
            .map_err(TransportError::Subscribe)?;
        Ok(Subscription::new(filter.clone(), receiver))
    }

    async fn publish(&self, pubsub_topic: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let data = envelope
            .to_bytes()
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish {
            topic: pubsub_topic.to_string(),
            data,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| TransportError::NotRunning)?
            .map_err(TransportError::Publish)
    }
}
