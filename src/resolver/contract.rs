// resolver/contract.rs - On-Chain Bootstrap Registry

//! JSON-RPC binding for the bootstrap address registry contract.
//!
//! Reads go through `eth_call`; `add_bootstrap_address` submits an
//! `eth_sendTransaction` from an account managed by the RPC node; events are
//! fetched with `eth_getLogs`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::abi;
use super::{AddressRegistry, RegistryError};
use crate::config::RegistryConfig;

/// A `BootstrapAddressAdded` log entry.
///
/// The address is an indexed `string`, so only its keccak-256 hash is
/// recoverable from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapAddressAdded {
    pub address_hash: String,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    #[serde(default)]
    topics: Vec<String>,
    block_number: Option<String>,
    transaction_hash: Option<String>,
}

/// Registry contract client
#[derive(Debug)]
pub struct ContractRegistry {
    client: reqwest::Client,
    rpc_url: String,
    contract_address: String,
    from_account: Option<String>,
    next_id: AtomicU64,
}

impl ContractRegistry {
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            from_account: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Build from configuration, failing if the registry is not configured
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let (Some(rpc_url), Some(contract)) = (&config.rpc_url, &config.contract_address) else {
            return Err(RegistryError::NotConfigured);
        };
        let mut registry = Self::new(rpc_url.clone(), contract.clone(), config.timeout())?;
        registry.from_account = config.from_account.clone();
        Ok(registry)
    }

    pub fn with_from_account(mut self, account: impl Into<String>) -> Self {
        self.from_account = Some(account.into());
        self
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RegistryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "Registry RPC request");

        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RegistryError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| RegistryError::InvalidResponse(format!("{} returned no result", method)))
    }

    async fn call(&self, calldata: &[u8]) -> Result<Vec<u8>, RegistryError> {
        let result: String = self
            .rpc(
                "eth_call",
                json!([{ "to": self.contract_address, "data": abi::to_hex(calldata) }, "latest"]),
            )
            .await?;
        Ok(abi::from_hex(&result)?)
    }

    /// `getBootstrapAddresses()`
    pub async fn get_bootstrap_addresses(&self) -> Result<Vec<String>, RegistryError> {
        let data = self.call(&abi::GET_BOOTSTRAP_ADDRESSES).await?;
        let addresses = abi::decode_string_array(&data)?;
        for address in &addresses {
            debug!(%address, "Registry bootstrap address");
        }
        Ok(addresses)
    }

    /// `owner()`
    pub async fn owner(&self) -> Result<String, RegistryError> {
        let data = self.call(&abi::OWNER).await?;
        Ok(abi::decode_address(&data)?)
    }

    /// `addBootstrapAddress(string)`; returns the transaction hash
    pub async fn add_bootstrap_address(&self, address: &str) -> Result<String, RegistryError> {
        let from = self.from_account.as_ref().ok_or_else(|| {
            RegistryError::InvalidResponse("no from_account configured for transactions".into())
        })?;
        let calldata = abi::encode_string_call(abi::ADD_BOOTSTRAP_ADDRESS, address);
        let tx_hash: String = self
            .rpc(
                "eth_sendTransaction",
                json!([{ "from": from, "to": self.contract_address, "data": abi::to_hex(&calldata) }]),
            )
            .await?;
        info!(%address, %tx_hash, "Submitted bootstrap address");
        Ok(tx_hash)
    }

    /// `BootstrapAddressAdded` events from `from_block` onwards
    pub async fn bootstrap_address_added(
        &self,
        from_block: u64,
    ) -> Result<Vec<BootstrapAddressAdded>, RegistryError> {
        let logs: Vec<RawLog> = self
            .rpc(
                "eth_getLogs",
                json!([{
                    "address": self.contract_address,
                    "topics": [abi::BOOTSTRAP_ADDRESS_ADDED_TOPIC],
                    "fromBlock": format!("{:#x}", from_block),
                    "toBlock": "latest",
                }]),
            )
            .await?;

        logs.into_iter()
            .map(|log| {
                let address_hash = log.topics.get(1).cloned().ok_or_else(|| {
                    RegistryError::InvalidResponse("event log missing indexed topic".into())
                })?;
                let block_number = log
                    .block_number
                    .as_deref()
                    .map(|n| u64::from_str_radix(n.trim_start_matches("0x"), 16))
                    .transpose()
                    .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
                Ok(BootstrapAddressAdded {
                    address_hash,
                    block_number,
                    transaction_hash: log.transaction_hash,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AddressRegistry for ContractRegistry {
    async fn bootstrap_addresses(&self) -> Result<Vec<String>, RegistryError> {
        self.get_bootstrap_addresses().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::net::SocketAddr;

    fn word(value: u64) -> String {
        format!("{:064x}", value)
    }

    fn padded_hex(s: &str) -> String {
        let mut h = hex::encode(s);
        while h.len() % 64 != 0 {
            h.push('0');
        }
        h
    }

    async fn handler(Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default();
        let result = match method {
            "eth_call" => {
                let data = request["params"][0]["data"].as_str().unwrap_or_default();
                if data == "0x8155318d" {
                    let addr = "/ip4/127.0.0.1/tcp/60000";
                    json!(format!(
                        "0x{}{}{}{}{}",
                        word(0x20),
                        word(1),
                        word(0x20),
                        word(addr.len() as u64),
                        padded_hex(addr)
                    ))
                } else if data == "0x8da5cb5b" {
                    json!(format!("0x{}{}", "0".repeat(24), "11".repeat(20)))
                } else {
                    return Json(json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": { "code": -32000, "message": "execution reverted" }
                    }));
                }
            }
            "eth_sendTransaction" => json!(format!("0x{}", "aa".repeat(32))),
            "eth_getLogs" => json!([{
                "topics": [abi::BOOTSTRAP_ADDRESS_ADDED_TOPIC, format!("0x{}", "cd".repeat(32))],
                "blockNumber": "0x10",
                "transactionHash": format!("0x{}", "ef".repeat(32)),
            }]),
            _ => Value::Null,
        };
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    async fn spawn_rpc() -> SocketAddr {
        let app = Router::new().route("/", post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn registry(addr: SocketAddr) -> ContractRegistry {
        ContractRegistry::new(
            format!("http://{}/", addr),
            "0xE2bB5cfe996ABeD8eB82bECB7Ede59faa17fe2F0",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_bootstrap_addresses() {
        let registry = registry(spawn_rpc().await);
        assert_eq!(
            registry.bootstrap_addresses().await.unwrap(),
            vec!["/ip4/127.0.0.1/tcp/60000"]
        );
    }

    #[tokio::test]
    async fn test_owner() {
        let registry = registry(spawn_rpc().await);
        assert_eq!(registry.owner().await.unwrap(), format!("0x{}", "11".repeat(20)));
    }

    #[tokio::test]
    async fn test_add_requires_from_account() {
        let addr = spawn_rpc().await;
        assert!(registry(addr).add_bootstrap_address("/ip4/1.2.3.4/tcp/1").await.is_err());

        let tx = registry(addr)
            .with_from_account("0x1111111111111111111111111111111111111111")
            .add_bootstrap_address("/ip4/1.2.3.4/tcp/1")
            .await
            .unwrap();
        assert_eq!(tx, format!("0x{}", "aa".repeat(32)));
    }

    #[tokio::test]
    async fn test_bootstrap_address_added_events() {
        let registry = registry(spawn_rpc().await);
        let events = registry.bootstrap_address_added(0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].address_hash, format!("0x{}", "cd".repeat(32)));
        assert_eq!(events[0].block_number, Some(16));
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        assert!(matches!(
            ContractRegistry::from_config(&RegistryConfig::default()),
            Err(RegistryError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_rpc_is_transport_error() {
        let registry = ContractRegistry::new(
            "http://127.0.0.1:1/",
            "0x0000000000000000000000000000000000000000",
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(matches!(
            registry.bootstrap_addresses().await,
            Err(RegistryError::Transport(_))
        ));
    }
}
