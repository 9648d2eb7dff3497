// codec/strategy.rs - Key Strategies

use std::fmt;

use crate::keys::{AgreementPublicKey, AgreementSecret, KeyMaterial, SymmetricKey};

/// Which key to use for one encode or decode attempt.
///
/// Encoding needs the recipient's public key (`Asymmetric`) or the shared key
/// (`Symmetric`). Decoding needs the local private key or the shared key.
#[derive(Clone, Debug)]
pub enum KeyStrategy {
    /// Unencrypted payload
    None,

    /// Shared group key
    Symmetric { key: SymmetricKey },

    /// Agreement key pair; either half may be absent depending on direction
    Asymmetric {
        public_key: Option<AgreementPublicKey>,
        private_key: Option<AgreementSecret>,
    },
}

/// Discriminant of a [`KeyStrategy`], safe to log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    None,
    Symmetric,
    Asymmetric,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::None => write!(f, "none"),
            StrategyKind::Symmetric => write!(f, "symmetric"),
            StrategyKind::Asymmetric => write!(f, "asymmetric"),
        }
    }
}

impl KeyStrategy {
    pub fn symmetric(key: SymmetricKey) -> Self {
        KeyStrategy::Symmetric { key }
    }

    /// Encode-side asymmetric strategy sealing to `recipient`
    pub fn seal_to(recipient: AgreementPublicKey) -> Self {
        KeyStrategy::Asymmetric {
            public_key: Some(recipient),
            private_key: None,
        }
    }

    /// Decode-side asymmetric strategy opening with the local secret
    pub fn open_with(secret: AgreementSecret) -> Self {
        KeyStrategy::Asymmetric {
            public_key: None,
            private_key: Some(secret),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            KeyStrategy::None => StrategyKind::None,
            KeyStrategy::Symmetric { .. } => StrategyKind::Symmetric,
            KeyStrategy::Asymmetric { .. } => StrategyKind::Asymmetric,
        }
    }
}

/// Decode order for an agent.
///
/// Agents that pin a trusted controller also try their own private key so
/// attributed controller traffic can be recognised.
pub fn agent_decode_order(keys: &KeyMaterial) -> Vec<KeyStrategy> {
    let mut order = vec![KeyStrategy::symmetric(keys.symmetric.clone())];
    if keys.trusted_controller.is_some() {
        order.push(KeyStrategy::open_with(keys.agreement.clone()));
    }
    order
}

/// Decode order for a controller: group key first, then its own private key
pub fn controller_decode_order(keys: &KeyMaterial) -> Vec<KeyStrategy> {
    vec![
        KeyStrategy::symmetric(keys.symmetric.clone()),
        KeyStrategy::open_with(keys.agreement.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningIdentity;

    #[test]
    fn test_agent_order_without_trusted_controller() {
        let keys = KeyMaterial::generate(SymmetricKey::generate());
        let kinds: Vec<_> = agent_decode_order(&keys).iter().map(KeyStrategy::kind).collect();
        assert_eq!(kinds, vec![StrategyKind::Symmetric]);
    }

    #[test]
    fn test_agent_order_with_trusted_controller() {
        let mut keys = KeyMaterial::generate(SymmetricKey::generate());
        keys.trusted_controller = Some(SigningIdentity::generate().public_key());
        let kinds: Vec<_> = agent_decode_order(&keys).iter().map(KeyStrategy::kind).collect();
        assert_eq!(kinds, vec![StrategyKind::Symmetric, StrategyKind::Asymmetric]);
    }

    #[test]
    fn test_controller_order() {
        let keys = KeyMaterial::generate(SymmetricKey::generate());
        let kinds: Vec<_> = controller_decode_order(&keys)
            .iter()
            .map(KeyStrategy::kind)
            .collect();
        assert_eq!(kinds, vec![StrategyKind::Symmetric, StrategyKind::Asymmetric]);
    }
}
