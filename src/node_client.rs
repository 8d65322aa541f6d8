//! JSON-RPC client for communicating with a Mica node.
//!
//! The engine is the only consumer; callers never see this surface
//! directly. Transport failures are folded into connectivity events, so
//! the error mapping here distinguishes timeouts and refused
//! connections from protocol-level problems.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::dto::{Currency, ExchangeRate, SystemState};
use crate::errors::{WalletError, WalletResult};
use crate::events::NodeConnectionError;

/// HTTP client for node RPC communication.
pub struct NodeClient {
    client: Client,
    base_url: String,
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: String,
    method: String,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
#[allow(dead_code)] // fields are populated via serde; not all are read by all call sites
struct JsonRpcResponse<T> {
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    id: u64,
}

/// JSON-RPC error structure
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TipResponse {
    height: u64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    currency: i32,
    unit: i32,
    amount: u64,
    updated: i64,
}

impl NodeClient {
    /// Create a new node client targeting the given base URL.
    pub fn new(base_url: &str, connect_timeout: Duration) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                WalletError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(NodeClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the node's current chain tip.
    pub async fn get_tip(&self) -> WalletResult<SystemState> {
        let tip: TipResponse = self.rpc_call("get_tip", serde_json::Value::Null).await?;
        Ok(SystemState {
            height: tip.height,
            hash: tip.hash,
        })
    }

    /// Submit a signed transaction for registration.
    pub async fn broadcast_transaction(&self, tx_data: serde_json::Value) -> WalletResult<String> {
        let params = serde_json::json!({ "transaction": tx_data });
        let response: serde_json::Value = self.rpc_call("broadcast_transaction", params).await?;
        let tx_id = response
            .get("txId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WalletError::NetworkError("Invalid broadcast response".to_string()))?;
        Ok(tx_id.to_string())
    }

    /// Fetch the node's exchange-rate feed.
    pub async fn get_exchange_rates(&self) -> WalletResult<Vec<ExchangeRate>> {
        let entries: Vec<RateEntry> = self
            .rpc_call("get_exchange_rates", serde_json::Value::Null)
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| ExchangeRate {
                currency: Currency::from_code(entry.currency),
                unit: Currency::from_code(entry.unit),
                amount: entry.amount,
                updated: entry.updated,
            })
            .collect())
    }

    /// Make a JSON-RPC call to the node.
    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> WalletResult<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let url = format!("{}/jsonrpc", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WalletError::ConnectionTimeout
                } else {
                    WalletError::NetworkError(format!("HTTP request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let rpc_response: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| WalletError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(WalletError::InvalidResponse(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| WalletError::InvalidResponse("No result in RPC response".to_string()))
    }
}

/// Map a transport-level failure onto the connectivity event taxonomy.
pub fn connection_error_kind(error: &WalletError) -> NodeConnectionError {
    match error {
        WalletError::ConnectionTimeout => NodeConnectionError::Timeout,
        WalletError::NetworkError(msg) if msg.contains("refused") => {
            NodeConnectionError::ConnectionRefused
        }
        WalletError::NetworkError(_) => NodeConnectionError::Unknown,
        WalletError::InvalidResponse(_) => NodeConnectionError::Protocol,
        _ => NodeConnectionError::Unknown,
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires running node RPC at localhost:10005"]
    async fn test_real_tip_call() {
        let client = NodeClient::new("http://127.0.0.1:10005", Duration::from_secs(5)).unwrap();
        let result = client.get_tip().await;
        assert!(result.is_ok(), "Tip call should succeed");
    }

    #[tokio::test]
    #[ignore = "requires running node RPC at localhost:10005"]
    async fn test_real_rates_call() {
        let client = NodeClient::new("http://127.0.0.1:10005", Duration::from_secs(5)).unwrap();
        let result = client.get_exchange_rates().await;
        assert!(result.is_ok(), "Exchange-rate call should succeed");
    }
}
