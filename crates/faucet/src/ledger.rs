//! Ledger access for the funder account.

use crate::error::LedgerError;
use async_trait::async_trait;
use drip_common::utils::converter::parse_hex_quantity;
use drip_common::{Address, TxHash};
use tracing::debug;

/// Operations the faucet needs from the chain.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Next nonce for `account`, counting pending transactions.
    async fn next_sequence_number(&self, account: &Address) -> Result<u64, LedgerError>;

    /// Broadcast a signed, RLP-encoded transaction.
    async fn submit(&self, raw_tx: &[u8]) -> Result<TxHash, LedgerError>;

    /// Whether the transaction has been included in a block.
    async fn poll_by_identifier(&self, tx_hash: &TxHash) -> Result<bool, LedgerError>;

    /// Latest balance of `account` in wei.
    async fn balance_of(&self, account: &Address) -> Result<u128, LedgerError>;
}

/// Ethereum JSON-RPC client over HTTP.
pub struct JsonRpcLedgerClient {
    rpc_url: String,
    client: reqwest::Client,
}

impl JsonRpcLedgerClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, LedgerError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self.client.post(&self.rpc_url).json(&payload).send().await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("invalid response: {}", e)))?;

        if let Some(error) = json.get("error") {
            return Err(LedgerError::Rpc {
                code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        debug!(method, "JSON-RPC call succeeded");
        Ok(json.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    fn quantity(value: &serde_json::Value) -> Result<u128, LedgerError> {
        let s = value
            .as_str()
            .ok_or_else(|| LedgerError::Decode(format!("expected hex quantity, got {}", value)))?;
        parse_hex_quantity(s).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn next_sequence_number(&self, account: &Address) -> Result<u64, LedgerError> {
        let result = self
            .call("eth_getTransactionCount", serde_json::json!([account.to_string(), "pending"]))
            .await?;
        let nonce = Self::quantity(&result)?;
        u64::try_from(nonce).map_err(|_| LedgerError::Decode(format!("nonce out of range: {}", nonce)))
    }

    async fn submit(&self, raw_tx: &[u8]) -> Result<TxHash, LedgerError> {
        let result = self
            .call(
                "eth_sendRawTransaction",
                serde_json::json!([format!("0x{}", hex::encode(raw_tx))]),
            )
            .await?;
        let hash = result
            .as_str()
            .ok_or_else(|| LedgerError::Decode(format!("expected tx hash, got {}", result)))?;
        let bytes = hex::decode(hash.trim_start_matches("0x")).map_err(|e| LedgerError::Decode(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(LedgerError::Decode(format!("tx hash has {} bytes", bytes.len())));
        }
        Ok(TxHash::from_slice(&bytes))
    }

    async fn poll_by_identifier(&self, tx_hash: &TxHash) -> Result<bool, LedgerError> {
        let result = self
            .call("eth_getTransactionByHash", serde_json::json!([tx_hash.to_string()]))
            .await?;
        // unknown to the node yet, or known but still pending
        Ok(result
            .get("blockNumber")
            .map(|block| !block.is_null())
            .unwrap_or(false))
    }

    async fn balance_of(&self, account: &Address) -> Result<u128, LedgerError> {
        let result = self
            .call("eth_getBalance", serde_json::json!([account.to_string(), "latest"]))
            .await?;
        Self::quantity(&result)
    }
}
