//! Hub (hyperbridge) reader
//!
//! The hub is a Substrate chain. Block heights come from `chain_getHeader`,
//! the current time from the `Timestamp.Now` storage item, and protocol state
//! from the node's `ismp_*` query namespace.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::ChainReader;
use crate::config::ChainConfig;
use crate::error::{ChainError, TrackerError};
use crate::redact::redact_url;
use crate::types::{Commitment, EventMetadata};

/// Storage key of `Timestamp::Now` (twox128("Timestamp") ++ twox128("Now"))
const TIMESTAMP_NOW_KEY: &str =
    "0xf0c365c3cf59d671eb72da0e7a4113c49f1f0515f462cdcf84e0f1d6045dfcbb";

const QUERY_REQUEST_RECEIPT: &str = "ismp_queryRequestReceipt";
const QUERY_RESPONSE_RECEIPT: &str = "ismp_queryResponseReceipt";
const QUERY_TIMEOUT_RECEIPT: &str = "ismp_queryRequestTimeoutReceipt";
const QUERY_STATE_MACHINE_HEIGHT: &str = "ismp_queryStateMachineLatestHeight";
const QUERY_STATE_COMMITMENT: &str = "ismp_queryStateCommitment";
const QUERY_CHILD_TRIE_PROOF: &str = "ismp_queryChildTrieProof";

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Header {
    number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptRecord {
    block_number: u64,
    #[serde(default)]
    block_hash: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
}

impl From<ReceiptRecord> for EventMetadata {
    fn from(record: ReceiptRecord) -> Self {
        EventMetadata {
            block_number: record.block_number,
            block_hash: record.block_hash,
            transaction_hash: record.transaction_hash,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StateCommitmentRecord {
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct ProofRecord {
    proof: String,
}

/// [`ChainReader`] over a hub node's JSON-RPC endpoint
pub struct HubReader {
    state_machine: String,
    rpc_url: String,
    client: reqwest::Client,
}

impl HubReader {
    pub fn new(chain: &ChainConfig) -> Result<Self, TrackerError> {
        let invalid = |reason: String| {
            TrackerError::InvalidConfig(format!(
                "invalid RPC URL for {}: {}",
                chain.state_machine_id, reason
            ))
        };
        let mut url = url::Url::parse(&chain.rpc_url).map_err(|e| invalid(e.to_string()))?;
        // The node serves HTTP JSON-RPC on the same port as its websocket endpoint
        let http_scheme = match url.scheme() {
            "ws" => Some("http"),
            "wss" => Some("https"),
            _ => None,
        };
        if let Some(scheme) = http_scheme {
            url.set_scheme(scheme)
                .map_err(|_| invalid(format!("cannot switch to {}", scheme)))?;
        }
        let rpc_url = url.to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        info!(
            state_machine = %chain.state_machine_id,
            rpc_url = %redact_url(&rpc_url),
            "Created hub reader"
        );

        Ok(Self {
            state_machine: chain.state_machine_id.clone(),
            rpc_url,
            client,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, ChainError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        debug!(method, "Hub RPC call");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .json::<RpcResponse<T>>()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    async fn require<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ChainError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| ChainError::Decode(format!("{} returned null", method)))
    }

    fn state_machine_id(state_machine: &str, consensus_state_id: &str) -> serde_json::Value {
        serde_json::json!({
            "stateId": state_machine,
            "consensusStateId": consensus_state_id,
        })
    }
}

#[async_trait]
impl ChainReader for HubReader {
    fn state_machine(&self) -> &str {
        &self.state_machine
    }

    async fn latest_height(&self) -> Result<u64, ChainError> {
        let header: Header = self.require("chain_getHeader", serde_json::json!([])).await?;
        parse_hex_u64(&header.number)
    }

    async fn timestamp(&self) -> Result<u64, ChainError> {
        let raw: String = self
            .require("state_getStorage", serde_json::json!([TIMESTAMP_NOW_KEY]))
            .await?;
        decode_timestamp_millis(&raw).map(|millis| millis / 1000)
    }

    async fn request_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        let record: Option<ReceiptRecord> = self
            .call(QUERY_REQUEST_RECEIPT, serde_json::json!([commitment.to_hex()]))
            .await?;
        Ok(record.map(Into::into))
    }

    async fn response_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        let record: Option<ReceiptRecord> = self
            .call(QUERY_RESPONSE_RECEIPT, serde_json::json!([commitment.to_hex()]))
            .await?;
        Ok(record.map(Into::into))
    }

    async fn timeout_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        let record: Option<ReceiptRecord> = self
            .call(QUERY_TIMEOUT_RECEIPT, serde_json::json!([commitment.to_hex()]))
            .await?;
        Ok(record.map(Into::into))
    }

    async fn state_machine_height(
        &self,
        state_machine: &str,
        consensus_state_id: &str,
    ) -> Result<u64, ChainError> {
        self.require(
            QUERY_STATE_MACHINE_HEIGHT,
            serde_json::json!([Self::state_machine_id(state_machine, consensus_state_id)]),
        )
        .await
    }

    async fn state_machine_timestamp(
        &self,
        state_machine: &str,
        consensus_state_id: &str,
        height: u64,
    ) -> Result<u64, ChainError> {
        let record: StateCommitmentRecord = self
            .require(
                QUERY_STATE_COMMITMENT,
                serde_json::json!([{
                    "id": Self::state_machine_id(state_machine, consensus_state_id),
                    "height": height,
                }]),
            )
            .await?;
        Ok(record.timestamp)
    }

    async fn non_membership_proof(
        &self,
        commitments: Vec<Commitment>,
        height: u64,
    ) -> Result<Vec<u8>, ChainError> {
        let keys: Vec<String> = commitments.iter().map(Commitment::to_hex).collect();
        let record: ProofRecord = self
            .require(QUERY_CHILD_TRIE_PROOF, serde_json::json!([height, keys]))
            .await?;
        hex::decode(record.proof.trim_start_matches("0x"))
            .map_err(|e| ChainError::Decode(format!("proof: {}", e)))
    }
}

fn parse_hex_u64(raw: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("hex number {}: {}", raw, e)))
}

/// Decode a SCALE-encoded little-endian u64 storage value
fn decode_timestamp_millis(raw: &str) -> Result<u64, ChainError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ChainError::Decode(format!("timestamp: {}", e)))?;
    let bytes: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ChainError::Decode(format!("timestamp is {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(bytes))
}
