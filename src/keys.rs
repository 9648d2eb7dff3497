// keys.rs - Key Material

//! Long-lived key material for a node.
//!
//! A node holds three kinds of keys:
//!
//! - a [`SymmetricKey`] shared by every legitimate participant of the channel,
//! - an X25519 [`AgreementSecret`] used to open envelopes sealed to this node,
//! - an Ed25519 [`SigningIdentity`] used to attribute envelopes this node seals.
//!
//! [`KeyMaterial`] is built once at startup and shared read-only.

use ed25519_dalek::{SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::KeyConfig;

/// Length of every raw key handled by this module.
pub const KEY_LENGTH: usize = 32;

/// Errors raised while loading key material
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("Invalid key length for {field}: expected {expected}, got {got}")]
    InvalidKeyLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Missing required key: {0}")]
    Missing(&'static str),

    #[error("Invalid public key for {field}")]
    InvalidPublicKey { field: &'static str },
}

fn decode_key(field: &'static str, hex_str: &str) -> Result<[u8; KEY_LENGTH], KeyError> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|e| KeyError::InvalidHex {
        field,
        reason: e.to_string(),
    })?;
    if bytes.len() != KEY_LENGTH {
        return Err(KeyError::InvalidKeyLength {
            field,
            expected: KEY_LENGTH,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn random_key() -> [u8; KEY_LENGTH] {
    let mut bytes = [0u8; KEY_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Shared 32-byte secret for the symmetric strategy
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LENGTH]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_key("symmetric_key", hex_str).map(Self)
    }

    pub fn generate() -> Self {
        Self(random_key())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// X25519 public key that envelopes can be sealed to
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgreementPublicKey([u8; KEY_LENGTH]);

impl AgreementPublicKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_key("agreement_public", hex_str).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    pub(crate) fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgreementPublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for AgreementPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// X25519 private key used to open envelopes sealed to this node
#[derive(Clone)]
pub struct AgreementSecret {
    secret: StaticSecret,
}

impl AgreementSecret {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_key("agreement_secret", hex_str).map(Self::from_bytes)
    }

    pub fn generate() -> Self {
        Self::from_bytes(random_key())
    }

    pub fn public_key(&self) -> AgreementPublicKey {
        AgreementPublicKey(PublicKey::from(&self.secret).to_bytes())
    }

    pub(crate) fn diffie_hellman(&self, peer: &AgreementPublicKey) -> [u8; KEY_LENGTH] {
        self.secret.diffie_hellman(&peer.to_dalek()).to_bytes()
    }
}

impl fmt::Debug for AgreementSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgreementSecret(public={:?})", self.public_key())
    }
}

/// Ed25519 verifying key recovered from an attributed envelope
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderPublicKey([u8; KEY_LENGTH]);

impl SenderPublicKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = decode_key("sender_public", hex_str)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey {
            field: "sender_public",
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Short form for log lines (first 8 bytes as hex)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for SenderPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderPublicKey({})", self.short())
    }
}

impl fmt::Display for SenderPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Ed25519 signing key that attributes sealed envelopes to this node
#[derive(Clone)]
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&bytes),
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_key("signing_key", hex_str).map(Self::from_bytes)
    }

    pub fn generate() -> Self {
        Self::from_bytes(random_key())
    }

    pub fn public_key(&self) -> SenderPublicKey {
        SenderPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningIdentity(public={:?})", self.public_key())
    }
}

/// All keys a node needs, immutable after startup
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    /// Shared group key
    pub symmetric: SymmetricKey,

    /// Local agreement key pair (opens envelopes sealed to us)
    pub agreement: AgreementSecret,

    /// Local signing identity (attributes envelopes we seal)
    pub signing: SigningIdentity,

    /// Controller key that agent results are sealed to
    pub controller_agreement_public: Option<AgreementPublicKey>,

    /// Controller identity an agent accepts commands from
    pub trusted_controller: Option<SenderPublicKey>,
}

impl KeyMaterial {
    /// Build key material from configuration.
    ///
    /// The symmetric key is mandatory. Missing local keys are generated for
    /// this process run only.
    pub fn from_config(config: &KeyConfig) -> Result<Self, KeyError> {
        let symmetric = config
            .symmetric_key
            .as_deref()
            .ok_or(KeyError::Missing("symmetric_key"))
            .and_then(SymmetricKey::from_hex)?;

        let agreement = match config.agreement_secret.as_deref() {
            Some(hex_str) => AgreementSecret::from_hex(hex_str)?,
            None => AgreementSecret::generate(),
        };

        let signing = match config.signing_key.as_deref() {
            Some(hex_str) => SigningIdentity::from_hex(hex_str)?,
            None => SigningIdentity::generate(),
        };

        let controller_agreement_public = config
            .controller_agreement_public
            .as_deref()
            .map(AgreementPublicKey::from_hex)
            .transpose()?;

        let trusted_controller = config
            .trusted_controller
            .as_deref()
            .map(SenderPublicKey::from_hex)
            .transpose()?;

        Ok(Self {
            symmetric,
            agreement,
            signing,
            controller_agreement_public,
            trusted_controller,
        })
    }

    /// Fresh random key material around a given shared key
    pub fn generate(symmetric: SymmetricKey) -> Self {
        Self {
            symmetric,
            agreement: AgreementSecret::generate(),
            signing: SigningIdentity::generate(),
            controller_agreement_public: None,
            trusted_controller: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_from_hex() {
        let key = SymmetricKey::from_hex(&"01".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[1u8; 32]);

        let prefixed = SymmetricKey::from_hex(&format!("0x{}", "ab".repeat(32))).unwrap();
        assert_eq!(prefixed.as_bytes(), &[0xab; 32]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = SymmetricKey::from_hex("0102").unwrap_err();
        assert!(matches!(
            err,
            KeyError::InvalidKeyLength { expected: 32, got: 2, .. }
        ));
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(matches!(
            AgreementSecret::from_hex("zz"),
            Err(KeyError::InvalidHex { .. })
        ));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let key = SymmetricKey::from_bytes([7u8; 32]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("07"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_agreement_is_symmetric() {
        let a = AgreementSecret::generate();
        let b = AgreementSecret::generate();
        assert_eq!(a.diffie_hellman(&b.public_key()), b.diffie_hellman(&a.public_key()));
    }

    #[test]
    fn test_key_material_requires_symmetric_key() {
        let config = KeyConfig::default();
        assert!(matches!(
            KeyMaterial::from_config(&config),
            Err(KeyError::Missing("symmetric_key"))
        ));
    }

    #[test]
    fn test_key_material_from_config() {
        let signing = SigningIdentity::generate();
        let controller = AgreementSecret::generate();
        let config = KeyConfig {
            symmetric_key: Some("11".repeat(32)),
            agreement_secret: Some("22".repeat(32)),
            signing_key: None,
            controller_agreement_public: Some(controller.public_key().to_string()),
            trusted_controller: Some(signing.public_key().to_string()),
        };

        let keys = KeyMaterial::from_config(&config).unwrap();
        assert_eq!(keys.symmetric.as_bytes(), &[0x11; 32]);
        assert_eq!(
            keys.agreement.public_key(),
            AgreementSecret::from_bytes([0x22; 32]).public_key()
        );
        assert_eq!(keys.controller_agreement_public, Some(controller.public_key()));
        assert_eq!(keys.trusted_controller, Some(signing.public_key()));
    }
}
