// resolver/mod.rs - Bootstrap Address Resolution

//! Produces the ordered list of bootstrap candidates.
//!
//! An operator-supplied address wins outright. Otherwise the on-chain
//! registry is read and its list is returned in registry order.

pub mod abi;
pub mod contract;

pub use contract::{BootstrapAddressAdded, ContractRegistry};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Registry read errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry is not configured")]
    NotConfigured,

    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    InvalidResponse(String),

    #[error("ABI decoding failed: {0}")]
    Abi(#[from] abi::AbiError),
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        RegistryError::Transport(e.to_string())
    }
}

/// Resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No bootstrap addresses available: {reason}")]
    NoAddressesAvailable { reason: String },
}

/// Read-only source of bootstrap addresses
#[async_trait]
pub trait AddressRegistry: Send + Sync {
    /// Current address list, in registry order
    async fn bootstrap_addresses(&self) -> Result<Vec<String>, RegistryError>;
}

/// Fixed address list
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    addresses: Vec<String>,
}

impl StaticRegistry {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl AddressRegistry for StaticRegistry {
    async fn bootstrap_addresses(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.addresses.clone())
    }
}

/// Stand-in used when no registry has been configured
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredRegistry;

#[async_trait]
impl AddressRegistry for UnconfiguredRegistry {
    async fn bootstrap_addresses(&self) -> Result<Vec<String>, RegistryError> {
        Err(RegistryError::NotConfigured)
    }
}

/// The contract registry when one is configured, otherwise a registry that
/// always reports [`RegistryError::NotConfigured`]
pub fn registry_from_config(
    config: &crate::config::RegistryConfig,
) -> Result<Box<dyn AddressRegistry>, RegistryError> {
    if config.is_configured() {
        Ok(Box::new(ContractRegistry::from_config(config)?))
    } else {
        Ok(Box::new(UnconfiguredRegistry))
    }
}

/// Resolve bootstrap candidates.
///
/// A non-empty `manual` address is returned verbatim without touching the
/// registry.
pub async fn resolve(
    manual: Option<&str>,
    registry: &dyn AddressRegistry,
) -> Result<Vec<String>, ResolveError> {
    if let Some(address) = manual.filter(|a| !a.is_empty()) {
        info!(address, "Using operator-supplied bootstrap address");
        return Ok(vec![address.to_string()]);
    }

    info!("No bootstrap address provided, querying registry");
    let addresses = registry.bootstrap_addresses().await.map_err(|e| {
        warn!(error = %e, "Registry lookup failed");
        ResolveError::NoAddressesAvailable {
            reason: e.to_string(),
        }
    })?;

    if addresses.is_empty() {
        return Err(ResolveError::NoAddressesAvailable {
            reason: "registry returned an empty list".into(),
        });
    }

    info!(count = addresses.len(), "Bootstrap addresses retrieved from registry");
    Ok(addresses)
}
