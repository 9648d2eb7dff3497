// node/relay.rs - Bootstrap Relay

//! The relay forwards gossip traffic for every node that bootstraps through
//! it. It holds no keys; the monitor only looks at envelope metadata.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::{Envelope, PROTOCOL_VERSION};
use crate::network::Subscription;
use crate::observability;

/// Envelope metadata visible without any key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeSummary {
    pub version: u32,
    pub content_topic: String,
    pub timestamp: i64,
    pub payload_len: usize,
}

impl EnvelopeSummary {
    pub fn is_supported(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

pub fn inspect(envelope: &Envelope) -> EnvelopeSummary {
    EnvelopeSummary {
        version: envelope.version,
        content_topic: envelope.content_topic.clone(),
        timestamp: envelope.timestamp,
        payload_len: envelope.payload.len(),
    }
}

/// Logs traffic seen on a subscription
pub struct RelayMonitor {
    subscription: Subscription,
    content_topic: String,
}

impl RelayMonitor {
    /// `content_topic` is the channel this deployment expects; others are
    /// still relayed but flagged
    pub fn new(subscription: Subscription, content_topic: impl Into<String>) -> Self {
        Self {
            subscription,
            content_topic: content_topic.into(),
        }
    }

    /// Run until cancelled or the subscription closes; returns the number of
    /// envelopes seen
    pub async fn run(mut self, cancel: CancellationToken) -> usize {
        let mut seen = 0;
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.subscription.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            seen += 1;
            observability::record_envelope_received();

            let summary = inspect(&envelope);
            if !summary.is_supported() {
                warn!(version = summary.version, "Envelope with unsupported version");
            } else if summary.content_topic != self.content_topic {
                warn!(content_topic = %summary.content_topic, "Envelope on unexpected content topic");
            } else {
                info!(
                    bytes = summary.payload_len,
                    timestamp = summary.timestamp,
                    "Relayed envelope"
                );
            }
        }
        info!(seen, "Relay monitor stopped");
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ContentFilter, MemoryNetwork, Transport};
    use std::time::Duration;

    #[test]
    fn test_inspect() {
        let envelope = Envelope::new("/c/1", vec![0; 40]);
        let summary = inspect(&envelope);
        assert_eq!(summary.payload_len, 40);
        assert_eq!(summary.content_topic, "/c/1");
        assert!(summary.is_supported());

        let mut old = envelope;
        old.version = 0;
        assert!(!inspect(&old).is_supported());
    }

    #[tokio::test]
    async fn test_monitor_counts_all_traffic() {
        let network = MemoryNetwork::new();
        let relay = network.listen(9);
        let sub = relay.subscribe(&ContentFilter::all("/t")).await.unwrap();

        let node = network.client();
        node.add_peer(&relay.listen_address().unwrap()).await.unwrap();

        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(RelayMonitor::new(sub, "/c/1").run(cancel.clone()));

        node.publish("/t", &Envelope::new("/c/1", vec![1])).await.unwrap();
        node.publish("/t", &Envelope::new("/other", vec![2])).await.unwrap();
        node.publish("/elsewhere", &Envelope::new("/c/1", vec![3])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(monitor.await.unwrap(), 2);
    }
}
