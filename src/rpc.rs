// src/rpc.rs
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ExplainError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcResponse<T> {
    // Error first: a missing `result` would otherwise parse as `Success { result: None }`
    Error { error: RpcError },
    Success { result: T },
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Thin Solana JSON-RPC client, built once and shared across requests
#[derive(Clone)]
pub struct RpcClient {
    url: String,
    client: Client,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// POST a JSON-RPC call, retrying transport failures only
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        for attempt in 1..=MAX_ATTEMPTS {
            debug!("📡 Sending {} → {}", method, self.url);

            match self.client.post(&self.url).json(&payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(ExplainError::Rpc(format!("{method}: HTTP {status}")));
                    }
                    let text = resp.text().await?;
                    return match serde_json::from_str::<RpcResponse<T>>(&text)? {
                        RpcResponse::Success { result } => Ok(result),
                        RpcResponse::Error { error } => Err(ExplainError::Rpc(format!(
                            "{method}: {} (code {})",
                            error.message, error.code
                        ))),
                    };
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "⚠️ {} request failed (attempt {}): {}. Retrying...",
                        method, attempt, e
                    );
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ExplainError::Rpc(format!("{method}: retries exhausted")))
    }

    /// Fetch a confirmed transaction in `jsonParsed` form; `None` when the node does not know it
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<Value>> {
        self.call(
            "getTransaction",
            json!([
                signature,
                {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        )
        .await
    }

    /// Fetch an account in `jsonParsed` form; returns the `value` object or `None`
    pub async fn get_account_info(&self, address: &str) -> Result<Option<Value>> {
        let result: Value = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "jsonParsed", "commitment": "confirmed" }]),
            )
            .await?;

        Ok(result.get("value").filter(|v| !v.is_null()).cloned())
    }
}
