// codec/envelope.rs - Wire Envelope

use serde::{Deserialize, Serialize};

use super::strategy::StrategyKind;
use super::CodecError;
use crate::keys::SenderPublicKey;

/// Current envelope protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Encrypted message as carried by the transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version
    pub version: u32,

    /// Logical channel this envelope belongs to
    pub content_topic: String,

    /// Unix epoch in nanoseconds
    pub timestamp: i64,

    /// Sealed payload bytes
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(content_topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            content_topic: content_topic.into(),
            timestamp: now_nanos(),
            payload,
        }
    }

    /// Encode for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Decode from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (envelope, _) =
            bincode::serde::decode_from_slice::<Envelope, _>(bytes, bincode::config::standard())
                .map_err(|e| CodecError::Serialization(e.to_string()))?;
        Ok(envelope)
    }
}

/// Plaintext recovered from an envelope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Decrypted message data
    pub plaintext: Vec<u8>,

    /// Sender identity; only present for asymmetric decodes.
    /// A message without it is not attributable.
    pub sender_public_key: Option<SenderPublicKey>,

    /// Strategy that succeeded
    pub strategy: StrategyKind,
}

impl DecodedMessage {
    pub fn is_attributed(&self) -> bool {
        self.sender_public_key.is_some()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.plaintext).into_owned()
    }
}

pub(crate) fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let envelope = Envelope::new("/cmdmesh/1/test/proto", vec![1, 2, 3]);
        assert_eq!(envelope.version, PROTOCOL_VERSION);
        assert!(envelope.timestamp > 0);

        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            Envelope::from_bytes(&[0xff, 0xff, 0xff]),
            Err(CodecError::Serialization(_))
        ));
    }
}
