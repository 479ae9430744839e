//! Solana JSON-RPC ledger client.

use super::{
    Address, Checkpoint, Commitment, LedgerError, LedgerRpc, LedgerTransaction, Signature,
    SignatureStatus, SignedTransaction, Transfer,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`JsonRpcLedger`].
#[derive(Debug, Clone)]
pub struct JsonRpcLedgerConfig {
    /// RPC endpoint URL.
    pub url: String,
    /// Commitment used for reads.
    pub commitment: Commitment,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for JsonRpcLedgerConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: Commitment::Confirmed,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Ledger client speaking Solana JSON-RPC 2.0 over HTTP.
pub struct JsonRpcLedger {
    client: reqwest::Client,
    config: JsonRpcLedgerConfig,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusValue {
    #[serde(default)]
    err: Option<Value>,
    confirmation_status: Option<Commitment>,
}

impl JsonRpcLedger {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: JsonRpcLedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// The configured endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Perform a call whose `result` may legitimately be `null`.
    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {method} (id={id})");

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        let envelope: RpcEnvelope<T> = response.json().await.map_err(|e| {
            if status.is_success() {
                LedgerError::InvalidResponse(format!("{method}: {e}"))
            } else {
                LedgerError::Transport(format!("{method}: HTTP {status}"))
            }
        })?;

        if let Some(err) = envelope.error {
            let classified = classify_rpc_error(err.code, &err.message);
            warn!("RPC {method} failed: {classified}");
            return Err(classified);
        }

        Ok(envelope.result)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        self.call_optional(method, params).await?.ok_or_else(|| {
            LedgerError::InvalidResponse(format!("{method} returned neither result nor error"))
        })
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcLedger {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        let params = json!([address.as_str(), { "commitment": self.config.commitment.as_str() }]);
        let balance: WithContext<u64> = self.call("getBalance", params).await?;
        Ok(balance.value)
    }

    async fn latest_checkpoint(&self) -> Result<Checkpoint, LedgerError> {
        let params = json!([{ "commitment": self.config.commitment.as_str() }]);
        let latest: WithContext<BlockhashValue> = self.call("getLatestBlockhash", params).await?;
        Ok(Checkpoint {
            blockhash: latest.value.blockhash,
            last_valid_block_height: latest.value.last_valid_block_height,
        })
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<Signature, LedgerError> {
        let encoded = bs58::encode(&tx.wire).into_string();
        let params = json!([encoded, {
            "encoding": "base58",
            "preflightCommitment": self.config.commitment.as_str(),
        }]);
        let signature: String = self.call("sendTransaction", params).await?;
        signature
            .parse()
            .map_err(|e| LedgerError::InvalidResponse(format!("sendTransaction signature: {e}")))
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureStatus>>, LedgerError> {
        let sigs: Vec<&str> = signatures.iter().map(Signature::as_str).collect();
        let params = json!([sigs, { "searchTransactionHistory": true }]);
        let statuses: WithContext<Vec<Option<StatusValue>>> =
            self.call("getSignatureStatuses", params).await?;

        Ok(statuses
            .value
            .into_iter()
            .map(|status| {
                status.map(|s| SignatureStatus {
                    confirmation: s.confirmation_status.unwrap_or(Commitment::Processed),
                    failed: s.err.is_some_and(|e| !e.is_null()),
                })
            })
            .collect())
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        // getTransaction rejects "processed"
        let commitment = self.config.commitment.max(Commitment::Confirmed);
        let params = json!([signature.as_str(), {
            "encoding": "jsonParsed",
            "commitment": commitment.as_str(),
            "maxSupportedTransactionVersion": 0,
        }]);
        let raw: Option<Value> = self.call_optional("getTransaction", params).await?;
        raw.map(|value| parse_transaction(signature, &value))
            .transpose()
    }
}

/// Map provider error text onto the typed taxonomy.
pub(crate) fn classify_rpc_error(code: i64, message: &str) -> LedgerError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("insufficient lamports")
        || lower.contains("insufficient funds")
        || lower.contains("no record of a prior credit")
    {
        LedgerError::InsufficientFundsForFee
    } else if lower.contains("blockhash not found") || lower.contains("block height exceeded") {
        LedgerError::CheckpointExpired
    } else if code == -32002 || lower.contains("simulation failed") {
        LedgerError::SimulationFailed(message.to_string())
    } else {
        LedgerError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

/// Interpret a `jsonParsed` transaction.
pub(crate) fn parse_transaction(
    signature: &Signature,
    value: &Value,
) -> Result<LedgerTransaction, LedgerError> {
    let meta = value
        .get("meta")
        .filter(|m| !m.is_null())
        .ok_or_else(|| LedgerError::InvalidResponse("transaction has no status metadata".into()))?;
    let success = meta.get("err").map_or(true, Value::is_null);

    let instructions = value
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
        .ok_or_else(|| LedgerError::InvalidResponse("transaction has no instructions".into()))?;

    Ok(LedgerTransaction {
        signature: signature.clone(),
        success,
        transfer: instructions.iter().find_map(parse_system_transfer),
    })
}

fn parse_system_transfer(instruction: &Value) -> Option<Transfer> {
    if instruction.get("program")?.as_str()? != "system" {
        return None;
    }
    let parsed = instruction.get("parsed")?;
    if parsed.get("type")?.as_str()? != "transfer" {
        return None;
    }
    let info = parsed.get("info")?;
    Some(Transfer {
        sender: info.get("source")?.as_str()?.parse().ok()?,
        recipient: info.get("destination")?.as_str()?.parse().ok()?,
        lamports: info.get("lamports")?.as_u64()?,
    })
}
