// network/transport.rs - Pub/Sub Transport Capability

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::Envelope;

/// Buffered envelopes per subscription before the transport starts dropping
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to add peer {address}: {reason}")]
    AddPeer { address: String, reason: String },

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("No connected peers")]
    NoPeers,

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transport is not running")]
    NotRunning,
}

/// Which envelopes a subscription receives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentFilter {
    /// Gossip topic
    pub pubsub_topic: String,

    /// Accepted content topics; empty accepts all
    pub content_topics: Vec<String>,
}

impl ContentFilter {
    pub fn new(pubsub_topic: impl Into<String>, content_topic: impl Into<String>) -> Self {
        Self {
            pubsub_topic: pubsub_topic.into(),
            content_topics: vec![content_topic.into()],
        }
    }

    /// Every envelope on the gossip topic
    pub fn all(pubsub_topic: impl Into<String>) -> Self {
        Self {
            pubsub_topic: pubsub_topic.into(),
            content_topics: Vec::new(),
        }
    }

    pub fn matches(&self, pubsub_topic: &str, envelope: &Envelope) -> bool {
        self.pubsub_topic == pubsub_topic
            && (self.content_topics.is_empty()
                || self.content_topics.iter().any(|t| *t == envelope.content_topic))
    }
}

/// Live stream of envelopes matching a filter.
///
/// Not `Clone`: exactly one reader owns it. Dropping it releases the
/// subscription.
#[derive(Debug)]
pub struct Subscription {
    filter: ContentFilter,
    receiver: mpsc::Receiver<Envelope>,
}

impl Subscription {
    pub fn new(filter: ContentFilter, receiver: mpsc::Receiver<Envelope>) -> Self {
        Self { filter, receiver }
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    /// Next envelope, or `None` once the transport closes the stream
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

/// Publish/subscribe transport capability
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Transport-native address form
    type Address: Clone + fmt::Display + Send + Sync;

    /// Parse an address string
    fn parse_address(&self, raw: &str) -> Result<Self::Address, TransportError>;

    /// Register and connect a peer
    async fn add_peer(&self, address: &Self::Address) -> Result<(), TransportError>;

    /// Open a filtered subscription
    async fn subscribe(&self, filter: &ContentFilter) -> Result<Subscription, TransportError>;

    /// Publish an envelope on a gossip topic.
    ///
    /// Implementations must be safe to call from concurrent tasks.
    async fn publish(&self, pubsub_topic: &str, envelope: &Envelope) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_filter_matching() {
        let envelope = Envelope::new("/a/1/x/proto", vec![]);
        let filter = ContentFilter::new("topic", "/a/1/x/proto");
        assert!(filter.matches("topic", &envelope));
        assert!(!filter.matches("other", &envelope));

        let other = ContentFilter::new("topic", "/a/1/y/proto");
        assert!(!other.matches("topic", &envelope));

        assert!(ContentFilter::all("topic").matches("topic", &envelope));
    }
}
