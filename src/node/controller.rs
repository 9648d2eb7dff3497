// node/controller.rs - Controller Node

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NodeError;
use crate::codec::{controller_decode_order, KeyStrategy, MessageCodec, StrategyKind};
use crate::config::NodeConfig;
use crate::keys::{AgreementPublicKey, KeyMaterial, SenderPublicKey};
use crate::network::{Subscription, Transport};
use crate::observability;

/// Operator input line that ends the publish loop
pub const EXIT_COMMAND: &str = "exit";

/// A decoded result from an agent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedResult {
    /// `"<agentLabel>: <content>"`
    pub text: String,

    /// Agent identity, when the result was sealed to us
    pub sender: Option<SenderPublicKey>,

    pub strategy: StrategyKind,
}

/// Controller node
pub struct ControllerNode<T> {
    transport: Arc<T>,
    codec: MessageCodec,
    keys: Arc<KeyMaterial>,
    label: String,
    pubsub_topic: String,
}

impl<T: Transport> ControllerNode<T> {
    pub fn new(transport: Arc<T>, keys: Arc<KeyMaterial>, config: &NodeConfig) -> Self {
        Self {
            transport,
            codec: MessageCodec::new(config.content_topic.clone(), keys.signing.clone()),
            label: config.node_label.clone().unwrap_or_else(|| "controller".into()),
            pubsub_topic: config.pubsub_topic.clone(),
            keys,
        }
    }

    /// Publish one operator line such as `"cmd: uptime"`.
    ///
    /// Sealed to `recipient` when given, otherwise encrypted with the group key.
    pub async fn publish_command(
        &self,
        line: &str,
        recipient: Option<&AgreementPublicKey>,
    ) -> Result<(), NodeError> {
        let strategy = match recipient {
            Some(key) => KeyStrategy::seal_to(*key),
            None => KeyStrategy::symmetric(self.keys.symmetric.clone()),
        };
        let envelope = self.codec.encode(line.as_bytes(), &self.label, &strategy)?;
        self.transport.publish(&self.pubsub_topic, &envelope).await?;

        observability::record_envelope_published("command");
        debug!(strategy = %strategy.kind(), "Command published");
        Ok(())
    }

    /// Publish every non-empty line from `reader` until `exit` or EOF.
    ///
    /// Publish failures are logged and skipped. Returns the number of lines
    /// published.
    pub async fn publish_lines<R>(
        &self,
        reader: R,
        recipient: Option<&AgreementPublicKey>,
    ) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut published = 0;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line == EXIT_COMMAND {
                info!("Exit requested");
                break;
            }
            if line.is_empty() {
                continue;
            }
            match self.publish_command(line, recipient).await {
                Ok(()) => published += 1,
                Err(e) => warn!(error = %e, "Failed to publish command"),
            }
        }
        Ok(published)
    }

    /// Start a task decoding results from `subscription` until `cancel` fires
    pub fn spawn_receiver(
        &self,
        mut subscription: Subscription,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<ReceivedResult>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let codec = self.codec.clone();
        let order = controller_decode_order(&self.keys);

        let handle = tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = subscription.recv() => match next {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };
                observability::record_envelope_received();

                let decoded = match codec.decode(&envelope, &order) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        debug!(error = %e, "Dropping undecodable envelope");
                        observability::record_decode_failure();
                        continue;
                    }
                };

                let result = ReceivedResult {
                    text: decoded.text(),
                    sender: decoded.sender_public_key,
                    strategy: decoded.strategy,
                };
                if tx.send(result).await.is_err() {
                    break;
                }
            }
            debug!("Result receiver stopped");
        });

        (rx, handle)
    }
}
