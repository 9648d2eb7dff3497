// node/agent.rs - Agent Node

//! Agent role: one receive task pulls envelopes from the subscription,
//! decodes and parses them, and hands each command to its own dispatch task.
//! Results are sealed to the controller and published.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::NodeError;
use crate::codec::{agent_decode_order, CodecError, Envelope, KeyStrategy, MessageCodec};
use crate::config::NodeConfig;
use crate::dispatch::{CommandDispatcher, ResultMessage};
use crate::frame::{self, CommandFrame};
use crate::keys::KeyMaterial;
use crate::network::{Subscription, Transport};
use crate::observability;

struct AgentShared<T> {
    transport: Arc<T>,
    codec: MessageCodec,
    keys: Arc<KeyMaterial>,
    dispatcher: CommandDispatcher,
    decode_order: Vec<KeyStrategy>,
    label: String,
    pubsub_topic: String,
}

/// Agent node, ready to be started on a subscription
pub struct AgentNode<T> {
    shared: Arc<AgentShared<T>>,
}

impl<T: Transport> AgentNode<T> {
    pub fn new(transport: Arc<T>, keys: Arc<KeyMaterial>, config: &NodeConfig) -> Self {
        let label = config
            .node_label
            .clone()
            .unwrap_or_else(|| format!("agent-{}", keys.signing.public_key().short()));

        let shared = AgentShared {
            codec: MessageCodec::new(config.content_topic.clone(), keys.signing.clone()),
            dispatcher: CommandDispatcher::new(
                config.dispatch_timeout(),
                config.dispatch.failure_policy,
            ),
            decode_order: agent_decode_order(&keys),
            label,
            pubsub_topic: config.pubsub_topic.clone(),
            transport,
            keys,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Start the receive task.
    ///
    /// The subscription moves into the task, which is its only reader.
    pub fn spawn(&self, subscription: Subscription) -> RunningAgent {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let receive = tokio::spawn(receive_loop(
            self.shared.clone(),
            subscription,
            cancel.clone(),
            tracker.clone(),
        ));

        info!(label = %self.shared.label, "Agent started");
        RunningAgent {
            cancel,
            tracker,
            receive,
        }
    }
}

async fn receive_loop<T: Transport>(
    shared: Arc<AgentShared<T>>,
    mut subscription: Subscription,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Receive loop cancelled");
                break;
            }
            next = subscription.recv() => match next {
                Some(envelope) => envelope,
                None => {
                    warn!("Subscription closed by transport");
                    break;
                }
            },
        };

        observability::record_envelope_received();
        let Some(frame) = shared.accept(&envelope) else {
            continue;
        };

        let shared = shared.clone();
        tracker.spawn(async move {
            observability::record_dispatch_started();
            if let Some(result) = shared.dispatcher.dispatch(&frame).await {
                if let Err(e) = shared.publish_result(&result).await {
                    error!(error = %e, "Failed to publish result");
                }
            }
            observability::record_dispatch_finished();
        });
    }

    drop(subscription);
    cancel.cancel();
    info!("Receive loop stopped");
}

impl<T: Transport> AgentShared<T> {
    /// Decode, authenticate and parse one envelope
    fn accept(&self, envelope: &Envelope) -> Option<CommandFrame> {
        let decoded = match self.codec.decode(envelope, &self.decode_order) {
            Ok(decoded) => decoded,
            Err(e @ CodecError::DecodeExhausted { .. }) => {
                debug!(error = %e, "Envelope not addressed to this agent");
                observability::record_decode_failure();
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable envelope");
                observability::record_decode_failure();
                return None;
            }
        };

        if let Some(trusted) = &self.keys.trusted_controller {
            if decoded.sender_public_key.as_ref() != Some(trusted) {
                info!(
                    sender = ?decoded.sender_public_key.as_ref().map(|k| k.short()),
                    "Ignoring message from untrusted sender"
                );
                return None;
            }
        }

        match frame::parse(&decoded.plaintext) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, strategy = %decoded.strategy, "Malformed frame");
                observability::record_malformed_frame();
                None
            }
        }
    }

    /// Seal a result to the controller, or to the group when no controller
    /// key is configured, and publish it
    async fn publish_result(&self, result: &ResultMessage) -> Result<(), NodeError> {
        let strategy = match &self.keys.controller_agreement_public {
            Some(controller) => KeyStrategy::seal_to(*controller),
            None => KeyStrategy::symmetric(self.keys.symmetric.clone()),
        };

        let envelope = self
            .codec
            .encode(result.content.as_bytes(), &self.label, &strategy)?;
        self.transport.publish(&self.pubsub_topic, &envelope).await?;

        observability::record_envelope_published("result");
        info!(status = %result.status, strategy = %strategy.kind(), "Result published");
        Ok(())
    }
}

/// Outcome of [`RunningAgent::shutdown`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Dispatch tasks still running when the grace period ran out
    pub abandoned: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned == 0
    }
}

/// Handle to a started agent
pub struct RunningAgent {
    cancel: CancellationToken,
    tracker: TaskTracker,
    receive: JoinHandle<()>,
}

impl RunningAgent {
    /// Token that stops the receive loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Dispatch tasks currently running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Resolves once the receive loop has stopped for any reason
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// Stop receiving and wait up to `grace` for in-flight dispatches.
    ///
    /// Dispatches still running afterwards are left to finish on their own.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.cancel.cancel();
        if let Err(e) = self.receive.await {
            error!(error = %e, "Receive task panicked");
        }

        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();

        let report = ShutdownReport {
            abandoned: if drained { 0 } else { self.tracker.len() },
        };
        if report.is_clean() {
            info!("Agent shut down cleanly");
        } else {
            warn!(abandoned = report.abandoned, ?grace, "Abandoned in-flight dispatches");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{controller_decode_order, DecodedMessage, StrategyKind};
    use crate::keys::SymmetricKey;
    use crate::network::{MemoryNetwork, MemoryTransport};
    use crate::node::command_filter;

    struct Harness {
        config: NodeConfig,
        controller_keys: Arc<KeyMaterial>,
        controller: MemoryTransport,
        controller_sub: Subscription,
        agent_keys: Arc<KeyMaterial>,
        agent: RunningAgent,
        _relay: MemoryTransport,
    }

    impl Harness {
        async fn start(trusted: bool) -> Self {
            let network = MemoryNetwork::new();
            let relay = network.listen(1);
            let relay_addr = relay.listen_address().unwrap();

            let mut config = NodeConfig::default();
            config.node_label = Some("agent-1".into());
            let filter = command_filter(&config);

            let symmetric = SymmetricKey::generate();
            let controller_keys = KeyMaterial::generate(symmetric.clone());
            let mut agent_keys = KeyMaterial::generate(symmetric);
            agent_keys.controller_agreement_public = Some(controller_keys.agreement.public_key());
            if trusted {
                agent_keys.trusted_controller = Some(controller_keys.signing.public_key());
            }
            let agent_keys = Arc::new(agent_keys);

            let agent_transport = Arc::new(network.client());
            agent_transport.add_peer(&relay_addr).await.unwrap();
            let agent_sub = agent_transport.subscribe(&filter).await.unwrap();
            let agent = AgentNode::new(agent_transport, agent_keys.clone(), &config).spawn(agent_sub);

            let controller = network.client();
            controller.add_peer(&relay_addr).await.unwrap();
            let controller_sub = controller.subscribe(&filter).await.unwrap();

            Self {
                config,
                controller_keys: Arc::new(controller_keys),
                controller,
                controller_sub,
                agent_keys,
                agent,
                _relay: relay,
            }
        }

        fn codec(&self) -> MessageCodec {
            MessageCodec::new(
                self.config.content_topic.clone(),
                self.controller_keys.signing.clone(),
            )
        }

        async fn send(&self, line: &str, strategy: &KeyStrategy) {
            let envelope = self.codec().encode(line.as_bytes(), "controller", strategy).unwrap();
            self.controller
                .publish(&self.config.pubsub_topic, &envelope)
                .await
                .unwrap();
        }

        async fn send_raw(&self, envelope: Envelope) {
            self.controller
                .publish(&self.config.pubsub_topic, &envelope)
                .await
                .unwrap();
        }

        fn symmetric(&self) -> KeyStrategy {
            KeyStrategy::symmetric(self.controller_keys.symmetric.clone())
        }

        async fn next_result(&mut self, wait: Duration) -> Option<DecodedMessage> {
            let envelope = tokio::time::timeout(wait, self.controller_sub.recv())
                .await
                .ok()
                .flatten()?;
            self.codec()
                .decode(&envelope, &controller_decode_order(&self.controller_keys))
                .ok()
        }
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let mut h = Harness::start(false).await;
        h.send("cmd: echo hi", &h.symmetric()).await;

        let result = h.next_result(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.text(), "agent-1: hi");
        assert_eq!(result.strategy, StrategyKind::Asymmetric);
        assert_eq!(
            result.sender_public_key,
            Some(h.agent_keys.signing.public_key())
        );

        assert!(h.agent.shutdown(Duration::from_secs(1)).await.is_clean());
    }

    #[tokio::test]
    async fn test_bad_messages_do_not_stop_the_loop() {
        let mut h = Harness::start(false).await;

        h.send_raw(Envelope::new(h.config.content_topic.clone(), vec![1, 2, 3]))
            .await;
        let mut wrong_version = Envelope::new(h.config.content_topic.clone(), vec![]);
        wrong_version.version = 2;
        h.send_raw(wrong_version).await;
        let stranger = KeyStrategy::symmetric(SymmetricKey::generate());
        h.send("cmd: echo nope", &stranger).await;
        h.send("no delimiters here", &h.symmetric()).await;
        h.send("ping: hello", &h.symmetric()).await;

        h.send("cmd: echo still-alive", &h.symmetric()).await;
        let result = h.next_result(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.text(), "agent-1: still-alive");
        assert!(h.next_result(Duration::from_millis(200)).await.is_none());

        h.agent.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_trusted_controller_filters_senders() {
        let mut h = Harness::start(true).await;

        // Group-key traffic is unattributed and therefore ignored
        h.send("cmd: echo group", &h.symmetric()).await;
        assert!(h.next_result(Duration::from_millis(300)).await.is_none());

        let to_agent = KeyStrategy::seal_to(h.agent_keys.agreement.public_key());
        h.send("cmd: echo direct", &to_agent).await;
        let result = h.next_result(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.text(), "agent-1: direct");

        h.agent.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_slow_command_does_not_block_receiving() {
        let mut h = Harness::start(false).await;
        h.send("cmd: sleep 3", &h.symmetric()).await;
        h.send("cmd: echo fast", &h.symmetric()).await;

        let result = h.next_result(Duration::from_secs(2)).await.unwrap();
        assert_eq!(result.text(), "agent-1: fast");

        h.agent.shutdown(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_shutdown_abandons_after_grace() {
        let h = Harness::start(false).await;
        h.send("cmd: sleep 5", &h.symmetric()).await;

        for _ in 0..100 {
            if h.agent.in_flight() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.agent.in_flight(), 1);

        let started = std::time::Instant::now();
        let report = h.agent.shutdown(Duration::from_millis(100)).await;
        assert_eq!(report, ShutdownReport { abandoned: 1 });
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancellation_stops_receive_loop() {
        let h = Harness::start(false).await;
        let token = h.agent.cancellation_token();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), h.agent.stopped())
            .await
            .unwrap();
        assert!(h.agent.shutdown(Duration::from_millis(10)).await.is_clean());
    }
}
