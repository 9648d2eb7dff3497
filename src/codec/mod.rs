// codec/mod.rs - Message Codec

//! Encrypted envelope encoding with an ordered decode fallback.
//!
//! - [`KeyStrategy`] - which key an attempt uses
//! - [`Envelope`] - the wire-level encrypted message
//! - [`DecodedMessage`] - recovered plaintext plus optional sender identity
//! - [`MessageCodec`] - encode with one strategy, decode with an ordered list
//!
//! # Example
//!
//! ```ignore
//! let codec = MessageCodec::new(content_topic, keys.signing.clone());
//! let envelope = codec.encode(b"cmd: uptime", "controller", &KeyStrategy::symmetric(key))?;
//! let decoded = codec.decode(&envelope, &controller_decode_order(&keys))?;
//! ```

mod envelope;
pub mod seal;
mod strategy;

pub use envelope::{DecodedMessage, Envelope, PROTOCOL_VERSION};
pub use strategy::{agent_decode_order, controller_decode_order, KeyStrategy, StrategyKind};

pub(crate) use envelope::now_nanos;

use thiserror::Error;
use tracing::{debug, trace};

use crate::frame;
use crate::keys::SigningIdentity;
use seal::SealError;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    #[error("Strategy {strategy} is missing its {key}")]
    MissingKey {
        strategy: StrategyKind,
        key: &'static str,
    },

    #[error("{strategy} seal failed: {source}")]
    Seal {
        strategy: StrategyKind,
        #[source]
        source: SealError,
    },

    #[error("No strategy could decode the envelope ({attempts} attempted)")]
    DecodeExhausted { attempts: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Encodes and decodes envelopes for one content topic
#[derive(Clone, Debug)]
pub struct MessageCodec {
    content_topic: String,
    signer: SigningIdentity,
}

impl MessageCodec {
    pub fn new(content_topic: impl Into<String>, signer: SigningIdentity) -> Self {
        Self {
            content_topic: content_topic.into(),
            signer,
        }
    }

    pub fn content_topic(&self) -> &str {
        &self.content_topic
    }

    /// Encode `plaintext` from `sender_label` with one strategy.
    ///
    /// Asymmetric envelopes are signed with the local identity so the
    /// recipient can attribute them.
    pub fn encode(
        &self,
        plaintext: &[u8],
        sender_label: &str,
        strategy: &KeyStrategy,
    ) -> Result<Envelope, CodecError> {
        let data = frame::prefix_sender(sender_label, plaintext);
        let kind = strategy.kind();
        let seal_err = |source| CodecError::Seal {
            strategy: kind,
            source,
        };

        let payload = match strategy {
            KeyStrategy::None => seal::pack_inner(&data, None),
            KeyStrategy::Symmetric { key } => {
                seal::seal_symmetric(key, &seal::pack_inner(&data, None)).map_err(seal_err)?
            }
            KeyStrategy::Asymmetric { public_key, .. } => {
                let recipient = public_key.as_ref().ok_or(CodecError::MissingKey {
                    strategy: kind,
                    key: "public key",
                })?;
                let inner = seal::pack_inner(&data, Some(&self.signer));
                seal::seal_asymmetric(recipient, &inner).map_err(seal_err)?
            }
        };

        trace!(strategy = %kind, bytes = payload.len(), "Encoded envelope");
        Ok(Envelope::new(self.content_topic.clone(), payload))
    }

    /// Decode `envelope`, trying `strategies` in order.
    ///
    /// Each attempt reads the envelope independently; the first success wins.
    pub fn decode(
        &self,
        envelope: &Envelope,
        strategies: &[KeyStrategy],
    ) -> Result<DecodedMessage, CodecError> {
        if envelope.version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(envelope.version));
        }

        for strategy in strategies {
            match Self::try_decode(&envelope.payload, strategy) {
                Ok(decoded) => return Ok(decoded),
                Err(e) => debug!(strategy = %strategy.kind(), error = %e, "Decode attempt failed"),
            }
        }

        Err(CodecError::DecodeExhausted {
            attempts: strategies.len(),
        })
    }

    fn try_decode(payload: &[u8], strategy: &KeyStrategy) -> Result<DecodedMessage, CodecError> {
        let kind = strategy.kind();
        let seal_err = |source| CodecError::Seal {
            strategy: kind,
            source,
        };

        match strategy {
            KeyStrategy::None => {
                let inner = seal::unpack_inner(payload).map_err(seal_err)?;
                Ok(DecodedMessage {
                    plaintext: inner.data,
                    sender_public_key: None,
                    strategy: kind,
                })
            }
            KeyStrategy::Symmetric { key } => {
                let opened = seal::open_symmetric(key, payload).map_err(seal_err)?;
                let inner = seal::unpack_inner(&opened).map_err(seal_err)?;
                Ok(DecodedMessage {
                    plaintext: inner.data,
                    sender_public_key: None,
                    strategy: kind,
                })
            }
            KeyStrategy::Asymmetric { private_key, .. } => {
                let secret = private_key.as_ref().ok_or(CodecError::MissingKey {
                    strategy: kind,
                    key: "private key",
                })?;
                let opened = seal::open_asymmetric(secret, payload).map_err(seal_err)?;
                let inner = seal::unpack_inner(&opened).map_err(seal_err)?;
                let sender = inner.signer.ok_or(seal_err(SealError::Unsigned))?;
                Ok(DecodedMessage {
                    plaintext: inner.data,
                    sender_public_key: Some(sender),
                    strategy: kind,
                })
            }
        }
    }
}
