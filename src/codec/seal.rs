// codec/seal.rs - Payload Sealing

//! Byte-level sealing primitives behind the key strategies.
//!
//! Inner plaintext layout (before encryption):
//!
//! ```text
//! flags(1) [ signer_public(32) signature(64) ] data(..)
//! ```
//!
//! `flags & FLAG_SIGNED` marks the optional signature block. The signature
//! covers `data` only.
//!
//! Sealed payload layouts:
//!
//! ```text
//! symmetric:  nonce(12) ciphertext(..)
//! asymmetric: ephemeral_public(32) nonce(12) ciphertext(..)
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

use crate::keys::{
    AgreementPublicKey, AgreementSecret, SenderPublicKey, SigningIdentity, SymmetricKey,
    KEY_LENGTH,
};

pub const NONCE_LENGTH: usize = 12;

const FLAG_SIGNED: u8 = 0b0000_0001;
const SIGNATURE_BLOCK: usize = KEY_LENGTH + SIGNATURE_LENGTH;
const HKDF_INFO: &[u8] = b"cmdmesh/v1/asymmetric";

/// Sealing errors. One of these fails a single strategy attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    #[error("Payload truncated: need at least {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("Encryption failed")]
    Encrypt,

    #[error("Authentication failed")]
    Decrypt,

    #[error("Unknown payload flags: {0:#04x}")]
    InvalidFlags(u8),

    #[error("Invalid signature")]
    BadSignature,

    #[error("Payload is not signed")]
    Unsigned,

    #[error("Key agreement produced a weak shared secret")]
    WeakKey,

    #[error("Key derivation failed")]
    Kdf,
}

/// Inner plaintext after unsealing
#[derive(Debug, PartialEq, Eq)]
pub struct Inner {
    pub data: Vec<u8>,
    pub signer: Option<SenderPublicKey>,
}

fn random_nonce() -> [u8; NONCE_LENGTH] {
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

fn require(bytes: &[u8], need: usize) -> Result<(), SealError> {
    if bytes.len() < need {
        return Err(SealError::Truncated {
            need,
            got: bytes.len(),
        });
    }
    Ok(())
}

/// Build the inner plaintext, signing `data` when a signer is given
pub fn pack_inner(data: &[u8], signer: Option<&SigningIdentity>) -> Vec<u8> {
    match signer {
        Some(identity) => {
            let signature = identity.signing_key().sign(data);
            let mut out = Vec::with_capacity(1 + SIGNATURE_BLOCK + data.len());
            out.push(FLAG_SIGNED);
            out.extend_from_slice(identity.public_key().as_bytes());
            out.extend_from_slice(&signature.to_bytes());
            out.extend_from_slice(data);
            out
        }
        None => {
            let mut out = Vec::with_capacity(1 + data.len());
            out.push(0);
            out.extend_from_slice(data);
            out
        }
    }
}

/// Parse the inner plaintext and verify its signature if present
pub fn unpack_inner(bytes: &[u8]) -> Result<Inner, SealError> {
    require(bytes, 1)?;
    let flags = bytes[0];
    match flags {
        0 => Ok(Inner {
            data: bytes[1..].to_vec(),
            signer: None,
        }),
        FLAG_SIGNED => {
            require(bytes, 1 + SIGNATURE_BLOCK)?;
            let mut public = [0u8; KEY_LENGTH];
            public.copy_from_slice(&bytes[1..1 + KEY_LENGTH]);
            let mut signature = [0u8; SIGNATURE_LENGTH];
            signature.copy_from_slice(&bytes[1 + KEY_LENGTH..1 + SIGNATURE_BLOCK]);
            let data = &bytes[1 + SIGNATURE_BLOCK..];

            let verifying_key =
                VerifyingKey::from_bytes(&public).map_err(|_| SealError::BadSignature)?;
            verifying_key
                .verify(data, &Signature::from_bytes(&signature))
                .map_err(|_| SealError::BadSignature)?;

            Ok(Inner {
                data: data.to_vec(),
                signer: Some(SenderPublicKey::from_bytes(public)),
            })
        }
        other => Err(SealError::InvalidFlags(other)),
    }
}

fn encrypt(key: &[u8; KEY_LENGTH], inner: &[u8]) -> Result<Vec<u8>, SealError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = random_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), inner)
        .map_err(|_| SealError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(key: &[u8; KEY_LENGTH], sealed: &[u8]) -> Result<Vec<u8>, SealError> {
    require(sealed, NONCE_LENGTH)?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SealError::Decrypt)
}

fn derive_key(
    shared: &[u8; KEY_LENGTH],
    ephemeral: &AgreementPublicKey,
    recipient: &AgreementPublicKey,
) -> Result<[u8; KEY_LENGTH], SealError> {
    if shared.iter().all(|b| *b == 0) {
        return Err(SealError::WeakKey);
    }
    let mut salt = [0u8; 2 * KEY_LENGTH];
    salt[..KEY_LENGTH].copy_from_slice(ephemeral.as_bytes());
    salt[KEY_LENGTH..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = [0u8; KEY_LENGTH];
    hk.expand(HKDF_INFO, &mut okm).map_err(|_| SealError::Kdf)?;
    Ok(okm)
}

pub fn seal_symmetric(key: &SymmetricKey, inner: &[u8]) -> Result<Vec<u8>, SealError> {
    encrypt(key.as_bytes(), inner)
}

pub fn open_symmetric(key: &SymmetricKey, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
    decrypt(key.as_bytes(), sealed)
}

/// Seal to a recipient with a fresh ephemeral agreement key
pub fn seal_asymmetric(recipient: &AgreementPublicKey, inner: &[u8]) -> Result<Vec<u8>, SealError> {
    let ephemeral = AgreementSecret::generate();
    let ephemeral_public = ephemeral.public_key();
    let shared = ephemeral.diffie_hellman(recipient);
    let key = derive_key(&shared, &ephemeral_public, recipient)?;

    let sealed = encrypt(&key, inner)?;
    let mut out = Vec::with_capacity(KEY_LENGTH + sealed.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn open_asymmetric(secret: &AgreementSecret, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
    require(sealed, KEY_LENGTH + NONCE_LENGTH)?;
    let mut ephemeral = [0u8; KEY_LENGTH];
    ephemeral.copy_from_slice(&sealed[..KEY_LENGTH]);
    let ephemeral_public = AgreementPublicKey::from_bytes(ephemeral);

    let shared = secret.diffie_hellman(&ephemeral_public);
    let key = derive_key(&shared, &ephemeral_public, &secret.public_key())?;
    decrypt(&key, &sealed[KEY_LENGTH..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_inner() {
        let packed = pack_inner(b"hello", None);
        let inner = unpack_inner(&packed).unwrap();
        assert_eq!(inner.data, b"hello");
        assert!(inner.signer.is_none());
    }

    #[test]
    fn test_signed_inner_verifies() {
        let identity = SigningIdentity::generate();
        let packed = pack_inner(b"hello", Some(&identity));
        let inner = unpack_inner(&packed).unwrap();
        assert_eq!(inner.data, b"hello");
        assert_eq!(inner.signer, Some(identity.public_key()));
    }

    #[test]
    fn test_tampered_signed_inner_rejected() {
        let identity = SigningIdentity::generate();
        let mut packed = pack_inner(b"hello", Some(&identity));
        let last = packed.len() - 1;
        packed[last] ^= 0xff;
        assert_eq!(unpack_inner(&packed), Err(SealError::BadSignature));
    }

    #[test]
    fn test_unknown_flags_rejected() {
        assert_eq!(unpack_inner(&[0x80, 1, 2]), Err(SealError::InvalidFlags(0x80)));
        assert!(matches!(unpack_inner(&[]), Err(SealError::Truncated { .. })));
    }

    #[test]
    fn test_symmetric_wrong_key_fails() {
        let sealed = seal_symmetric(&SymmetricKey::from_bytes([1; 32]), b"data").unwrap();
        assert_eq!(
            open_symmetric(&SymmetricKey::from_bytes([2; 32]), &sealed),
            Err(SealError::Decrypt)
        );
        assert_eq!(
            open_symmetric(&SymmetricKey::from_bytes([1; 32]), &sealed).unwrap(),
            b"data"
        );
    }

    #[test]
    fn test_asymmetric_only_recipient_opens() {
        let recipient = AgreementSecret::generate();
        let other = AgreementSecret::generate();
        let sealed = seal_asymmetric(&recipient.public_key(), b"secret").unwrap();

        assert_eq!(open_asymmetric(&recipient, &sealed).unwrap(), b"secret");
        assert_eq!(open_asymmetric(&other, &sealed), Err(SealError::Decrypt));
    }

    #[test]
    fn test_asymmetric_truncated() {
        let recipient = AgreementSecret::generate();
        assert!(matches!(
            open_asymmetric(&recipient, &[0u8; 10]),
            Err(SealError::Truncated { need: 44, got: 10 })
        ));
    }
}
