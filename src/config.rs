// config.rs - Node Configuration

//! Immutable node configuration.
//!
//! Values are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `CMDMESH_*` environment variables (nested keys use
//! `__`, e.g. `CMDMESH_KEYS__SYMMETRIC_KEY`). The result is built once at
//! startup and shared by reference.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::FailurePolicy;

/// Default gossip topic shared by every node
pub const DEFAULT_PUBSUB_TOPIC: &str = "/waku/2/default-waku/proto";

/// Default content topic identifying the command channel
pub const DEFAULT_CONTENT_TOPIC: &str = "/cmdmesh/1/command-control/proto";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CMDMESH";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Hex-encoded key material, never logged
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Shared 32-byte group key (required)
    pub symmetric_key: Option<String>,

    /// Local X25519 secret; generated per run when absent
    pub agreement_secret: Option<String>,

    /// Local Ed25519 secret; generated per run when absent
    pub signing_key: Option<String>,

    /// Controller X25519 public key that agent results are sealed to
    pub controller_agreement_public: Option<String>,

    /// Controller Ed25519 public key an agent accepts commands from
    pub trusted_controller: Option<String>,
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyConfig")
            .field("symmetric_key", &self.symmetric_key.as_ref().map(|_| "<redacted>"))
            .field("agreement_secret", &self.agreement_secret.as_ref().map(|_| "<redacted>"))
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("controller_agreement_public", &self.controller_agreement_public)
            .field("trusted_controller", &self.trusted_controller)
            .finish()
    }
}

/// On-chain registry settings
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: Option<String>,

    /// Registry contract address (0x-prefixed hex)
    pub contract_address: Option<String>,

    /// Account used for `addBootstrapAddress` transactions
    pub from_account: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            from_account: None,
            timeout_secs: 15,
        }
    }
}

impl RegistryConfig {
    pub fn is_configured(&self) -> bool {
        self.rpc_url.is_some() && self.contract_address.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Command execution settings
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum runtime of a single command
    pub timeout_secs: u64,

    /// How execution failures are reported
    pub failure_policy: FailurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            failure_policy: FailurePolicy::Report,
        }
    }
}

/// Complete node configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Human-readable label prefixed to outgoing frames
    pub node_label: Option<String>,

    /// Gossip topic
    pub pubsub_topic: String,

    /// Content topic of the command channel
    pub content_topic: String,

    /// Dial timeout per bootstrap candidate, in seconds
    pub connect_timeout_secs: u64,

    /// Grace period for in-flight dispatches on shutdown, in seconds
    pub shutdown_grace_secs: u64,

    pub keys: KeyConfig,

    pub registry: RegistryConfig,

    pub dispatch: DispatchConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_label: None,
            pubsub_topic: DEFAULT_PUBSUB_TOPIC.into(),
            content_topic: DEFAULT_CONTENT_TOPIC.into(),
            connect_timeout_secs: 10,
            shutdown_grace_secs: 5,
            keys: KeyConfig::default(),
            registry: RegistryConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pubsub_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("pubsub_topic must not be empty".into()));
        }
        if self.content_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("content_topic must not be empty".into()));
        }
        if self.dispatch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("dispatch.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.content_topic, DEFAULT_CONTENT_TOPIC);
        assert_eq!(config.pubsub_topic, DEFAULT_PUBSUB_TOPIC);
        assert_eq!(config.dispatch.failure_policy, FailurePolicy::Report);
        assert!(config.validate().is_ok());
        assert!(!config.registry.is_configured());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
node_label = "node-42"
content_topic = "/test/1/cmd/proto"
shutdown_grace_secs = 2

[keys]
symmetric_key = "{}"

[registry]
rpc_url = "http://localhost:8545"
contract_address = "0xE2bB5cfe996ABeD8eB82bECB7Ede59faa17fe2F0"

[dispatch]
timeout_secs = 3
failure_policy = "silent"
"#,
            "01".repeat(32)
        )
        .unwrap();

        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.node_label.as_deref(), Some("node-42"));
        assert_eq!(config.content_topic, "/test/1/cmd/proto");
        assert_eq!(config.pubsub_topic, DEFAULT_PUBSUB_TOPIC);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(2));
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(3));
        assert_eq!(config.dispatch.failure_policy, FailurePolicy::Silent);
        assert!(config.registry.is_configured());
        assert!(config.keys.symmetric_key.is_some());
    }

    #[test]
    fn test_zero_dispatch_timeout_rejected() {
        let mut config = NodeConfig::default();
        config.dispatch.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_key_config_debug_redacts_secrets() {
        let keys = KeyConfig {
            symmetric_key: Some("deadbeef".into()),
            ..Default::default()
        };
        let rendered = format!("{:?}", keys);
        assert!(!rendered.contains("deadbeef"));
    }
}
