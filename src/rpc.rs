//! Minimal Ethereum JSON-RPC client
//!
//! Shared by the wallet provider and the contract gateway. Endpoints are
//! tried in order; only transport failures move on to the next one, a
//! JSON-RPC error object is returned as-is.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::DashboardError;
use crate::gateway::abi;

/// EIP-1193 "user rejected request"
pub const USER_REJECTED_CODE: i64 = 4001;
/// Geth/Hardhat execution revert
pub const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    urls: Arc<Vec<String>>,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(urls: Vec<String>) -> Result<Self, DashboardError> {
        if urls.is_empty() {
            return Err(DashboardError::NoProvider(
                "no RPC endpoint configured".to_string(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            urls: Arc::new(urls),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Issue one JSON-RPC call and deserialize its result
    ///
    /// A `null` result deserializes into `Option::None` for optional targets.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, DashboardError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut last_error = String::new();
        for url in self.urls.iter() {
            let response = match self.http.post(url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    last_error = format!("{} returned HTTP {}", url, resp.status());
                    log::warn!("{} failed: {}", method, last_error);
                    continue;
                }
                Err(e) => {
                    last_error = format!("{}: {}", url, e);
                    log::warn!("{} failed: {}", method, last_error);
                    continue;
                }
            };

            let parsed: RpcResponse = response
                .json()
                .await
                .map_err(|e| DashboardError::Decode(format!("{} response: {}", method, e)))?;

            if let Some(error) = parsed.error {
                return Err(map_rpc_error(error));
            }
            let result = parsed.result.unwrap_or(Value::Null);
            return serde_json::from_value(result)
                .map_err(|e| DashboardError::Decode(format!("{} result: {}", method, e)));
        }

        Err(DashboardError::Provider(format!(
            "all RPC endpoints failed for {}: {}",
            method, last_error
        )))
    }
}

/// Classify a JSON-RPC error object
pub fn map_rpc_error(error: RpcErrorObject) -> DashboardError {
    if error.code == USER_REJECTED_CODE {
        return DashboardError::UserRejected(error.message);
    }
    if error.code == EXECUTION_REVERTED_CODE || error.message.to_lowercase().contains("revert") {
        let reason = error
            .data
            .as_ref()
            .and_then(revert_data)
            .and_then(|bytes| abi::decode_revert_reason(&bytes))
            .unwrap_or(error.message);
        return DashboardError::Reverted(reason);
    }
    DashboardError::Provider(format!("{} (code {})", error.message, error.code))
}

/// Revert payload, either a bare hex string or nested under `data`
fn revert_data(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => abi::decode_hex(s).ok(),
        Value::Object(map) => map.get("data").and_then(revert_data),
        _ => None,
    }
}
