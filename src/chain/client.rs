//! JSON-RPC chain connections
//!
//! A [`ChainClient`] is the connection handle held by each registry endpoint.
//! Constructing one performs no I/O; requests are issued on demand.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::types::{Address, Amount, Chain};

/// Connection capability for one chain endpoint
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Endpoint URL this connection was built from
    fn url(&self) -> &str;

    /// Native balance of an address
    async fn get_balance(&self, address: &Address) -> Result<Amount>;

    /// Next nonce for an address, including pending transactions
    async fn transaction_count(&self, address: &Address) -> Result<u64>;

    /// Current gas price in wei
    async fn gas_price(&self) -> Result<u128>;

    /// Submit a signed raw transaction, returning the transaction hash
    async fn broadcast(&self, raw_tx: &str) -> Result<String>;
}

/// Builds connection handles from endpoint URLs
pub trait Connector: Send + Sync {
    fn connect(&self, chain: Chain, url: &str) -> Result<Arc<dyn ChainClient>>;
}

/// Retry settings for read-only RPC calls
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// Connector producing [`JsonRpcClient`] handles sharing one HTTP client
pub struct JsonRpcConnector {
    http: reqwest::Client,
    settings: RpcSettings,
}

impl JsonRpcConnector {
    pub fn new(settings: RpcSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, settings })
    }
}

impl Connector for JsonRpcConnector {
    fn connect(&self, chain: Chain, url: &str) -> Result<Arc<dyn ChainClient>> {
        debug!("Building {} connection for {}", chain, url);
        Ok(Arc::new(JsonRpcClient {
            url: url.to_string(),
            http: self.http.clone(),
            settings: self.settings.clone(),
            next_id: AtomicU64::new(1),
        }))
    }
}

/// Ethereum-compatible JSON-RPC client over HTTP
pub struct JsonRpcClient {
    url: String,
    http: reqwest::Client,
    settings: RpcSettings,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcClient {
    /// Single request, no retry
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} -> {}", method, self.url);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<T> = response.json().await?;

        if let Some(err) = body.error {
            return Err(Error::RpcResponse(format!("{} (code {})", err.message, err.code)));
        }

        body.result
            .ok_or_else(|| Error::RpcResponse(format!("{} returned no result", method)))
    }

    /// Read-only request with bounded exponential backoff on transport errors
    async fn call_with_retry<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.settings.max_retries + 1;

        let backoff = ExponentialBackoff {
            initial_interval: self.settings.retry_base_delay,
            max_interval: self.settings.retry_base_delay * 4,
            max_elapsed_time: Some(self.settings.timeout),
            ..Default::default()
        };

        let attempts = &attempts;
        let params = &params;
        retry(backoff, || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match self.call(method, params.clone()).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!("Retryable RPC error on {} (attempt {}): {}", method, attempt, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_balance(&self, address: &Address) -> Result<Amount> {
        let quantity: String = self
            .call_with_retry("eth_getBalance", json!([address.to_checksum(), "latest"]))
            .await?;
        Ok(Amount::from_wei(parse_quantity(&quantity)?))
    }

    async fn transaction_count(&self, address: &Address) -> Result<u64> {
        let quantity: String = self
            .call_with_retry(
                "eth_getTransactionCount",
                json!([address.to_checksum(), "pending"]),
            )
            .await?;
        u64::try_from(parse_quantity(&quantity)?)
            .map_err(|_| Error::RpcResponse(format!("Nonce out of range: {}", quantity)))
    }

    async fn gas_price(&self) -> Result<u128> {
        let quantity: String = self.call_with_retry("eth_gasPrice", json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn broadcast(&self, raw_tx: &str) -> Result<String> {
        // Never retried: a resend after an ambiguous failure could double-spend
        self.call("eth_sendRawTransaction", json!([raw_tx]))
            .await
            .map_err(|e| Error::BroadcastFailed(e.to_string()))
    }
}

/// Parse a JSON-RPC hex quantity such as `"0x1bc16d674ec80000"`
pub fn parse_quantity(quantity: &str) -> Result<u128> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| Error::RpcResponse(format!("Invalid quantity: {}", quantity)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| Error::RpcResponse(format!("Invalid quantity: {}", quantity)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x1bc16d674ec80000").unwrap(), 2_000_000_000_000_000_000);
        assert!(parse_quantity("1234").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_rpc_error_object_deserialize() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"insufficient funds for gas * price + value"}}"#;
        let parsed: RpcResponse<String> = serde_json::from_str(body).unwrap();
        assert!(parsed.result.is_none());
        assert_eq!(parsed.error.unwrap().code, -32000);
    }

    #[tokio::test]
    async fn test_connect_does_no_io() {
        let connector = JsonRpcConnector::new(RpcSettings::default()).unwrap();
        let client = connector
            .connect(Chain::Eth, "http://127.0.0.1:1/unreachable")
            .unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:1/unreachable");
    }
}
