//! EVM host reader
//!
//! Reads message receipts and verified hub heights from an `EvmHost`
//! contract. Receipt existence comes from contract storage; where a receipt
//! was written comes from a bounded, newest-first `eth_getLogs` scan.

use alloy::{
    primitives::{keccak256, Address, FixedBytes, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::Filter,
    sol,
    transports::http::{Client as AlloyHttpClient, Http},
};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, info};

use crate::chain::ChainReader;
use crate::config::ChainConfig;
use crate::error::{ChainError, TrackerError};
use crate::redact::redact_url;
use crate::types::{state_machine_numeric_id, Commitment, EventMetadata};

sol! {
    #[sol(rpc)]
    contract EvmHost {
        struct StateMachineHeight {
            uint256 stateMachineId;
            uint256 height;
        }

        struct StateCommitment {
            uint256 timestamp;
            bytes32 overlayRoot;
            bytes32 stateRoot;
        }

        struct ResponseReceipt {
            bytes32 responseCommitment;
            address relayer;
        }

        function timestamp() external view returns (uint256 hostTimestamp);

        function requestReceipts(bytes32 commitment) external view returns (address relayer);

        function responseReceipts(bytes32 commitment) external view returns (ResponseReceipt memory receipt);

        function latestStateMachineHeight(uint256 id) external view returns (uint256 latestHeight);

        function stateMachineCommitment(StateMachineHeight memory height) external view returns (StateCommitment memory commitment);
    }
}

const POST_REQUEST_HANDLED: &[u8] = b"PostRequestHandled(bytes32,address)";
const POST_RESPONSE_HANDLED: &[u8] = b"PostResponseHandled(bytes32,address)";
const POST_REQUEST_TIMEOUT_HANDLED: &[u8] = b"PostRequestTimeoutHandled(bytes32,string)";

/// EVM reader configuration
#[derive(Debug, Clone)]
pub struct EvmReaderConfig {
    /// Maximum block range per `eth_getLogs` query (to avoid RPC limits)
    pub max_block_range: u64,
    /// How far back from latest to search for receipt events
    pub log_lookback: u64,
}

impl Default for EvmReaderConfig {
    fn default() -> Self {
        Self {
            max_block_range: 10_000,
            log_lookback: 100_000,
        }
    }
}

/// [`ChainReader`] over an EVM chain's `EvmHost` contract
pub struct EvmHostReader {
    state_machine: String,
    host: Address,
    provider: RootProvider<Http<AlloyHttpClient>>,
    config: EvmReaderConfig,
}

impl EvmHostReader {
    /// Create a reader for the chain described by `chain`
    pub fn new(chain: &ChainConfig) -> Result<Self, TrackerError> {
        Self::with_config(chain, EvmReaderConfig::default())
    }

    pub fn with_config(chain: &ChainConfig, config: EvmReaderConfig) -> Result<Self, TrackerError> {
        let url = chain.rpc_url.parse().map_err(|e| {
            TrackerError::InvalidConfig(format!(
                "invalid RPC URL for {}: {}",
                chain.state_machine_id, e
            ))
        })?;
        let host = Address::from_str(&chain.host_contract_address).map_err(|e| {
            TrackerError::InvalidConfig(format!(
                "invalid host address for {}: {}",
                chain.state_machine_id, e
            ))
        })?;
        if config.max_block_range == 0 {
            return Err(TrackerError::InvalidConfig(
                "max_block_range must be positive".to_string(),
            ));
        }

        let provider = ProviderBuilder::new().on_http(url);

        info!(
            state_machine = %chain.state_machine_id,
            rpc_url = %redact_url(&chain.rpc_url),
            host = %host,
            "Created EVM host reader"
        );

        Ok(Self {
            state_machine: chain.state_machine_id.clone(),
            host,
            provider,
            config,
        })
    }

    fn hub_id(state_machine: &str) -> Result<U256, ChainError> {
        state_machine_numeric_id(state_machine)
            .map(U256::from)
            .ok_or_else(|| {
                ChainError::Unsupported(format!(
                    "EVM hosts only track numbered state machines, got {}",
                    state_machine
                ))
            })
    }

    fn to_u64(value: U256, what: &str) -> Result<u64, ChainError> {
        u64::try_from(value).map_err(|_| ChainError::Decode(format!("{} overflows u64", what)))
    }

    /// Find the newest host event for `commitment` within the lookback window
    async fn find_event(
        &self,
        signature: &[u8],
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        let topic = keccak256(signature);
        let latest = self.latest_height().await?;
        let floor = latest.saturating_sub(self.config.log_lookback);
        let mut to_block = latest;

        loop {
            let from_block = to_block
                .saturating_sub(self.config.max_block_range - 1)
                .max(floor);

            let filter = Filter::new()
                .address(self.host)
                .event_signature(topic)
                .topic1(B256::from(commitment.0))
                .from_block(from_block)
                .to_block(to_block);

            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(ChainError::from_client)?;

            if let Some(log) = logs.into_iter().last() {
                debug!(
                    state_machine = %self.state_machine,
                    commitment = %commitment,
                    block = ?log.block_number,
                    "Found host event"
                );
                return Ok(Some(EventMetadata {
                    block_number: log.block_number.unwrap_or(to_block),
                    block_hash: log.block_hash.map(|h| h.to_string()),
                    transaction_hash: log.transaction_hash.map(|h| h.to_string()),
                }));
            }

            if from_block <= floor {
                return Ok(None);
            }
            to_block = from_block - 1;
        }
    }

    /// Locate a receipt known to exist; falls back to the latest height as an upper bound
    async fn locate_receipt(
        &self,
        signature: &[u8],
        commitment: Commitment,
    ) -> Result<EventMetadata, ChainError> {
        match self.find_event(signature, commitment).await? {
            Some(meta) => Ok(meta),
            None => Ok(EventMetadata::at_height(self.latest_height().await?)),
        }
    }
}

#[async_trait]
impl ChainReader for EvmHostReader {
    fn state_machine(&self) -> &str {
        &self.state_machine
    }

    async fn latest_height(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(ChainError::from_client)
    }

    async fn timestamp(&self) -> Result<u64, ChainError> {
        let contract = EvmHost::new(self.host, &self.provider);
        let result = contract
            .timestamp()
            .call()
            .await
            .map_err(ChainError::from_client)?;
        Self::to_u64(result.hostTimestamp, "host timestamp")
    }

    async fn request_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        let contract = EvmHost::new(self.host, &self.provider);
        let result = contract
            .requestReceipts(FixedBytes::from(commitment.0))
            .call()
            .await
            .map_err(ChainError::from_client)?;

        if result.relayer == Address::ZERO {
            return Ok(None);
        }
        self.locate_receipt(POST_REQUEST_HANDLED, commitment)
            .await
            .map(Some)
    }

    async fn response_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        let contract = EvmHost::new(self.host, &self.provider);
        let result = contract
            .responseReceipts(FixedBytes::from(commitment.0))
            .call()
            .await
            .map_err(ChainError::from_client)?;

        if result.receipt.relayer == Address::ZERO {
            return Ok(None);
        }
        self.locate_receipt(POST_RESPONSE_HANDLED, commitment)
            .await
            .map(Some)
    }

    async fn timeout_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        self.find_event(POST_REQUEST_TIMEOUT_HANDLED, commitment)
            .await
    }

    async fn state_machine_height(
        &self,
        state_machine: &str,
        _consensus_state_id: &str,
    ) -> Result<u64, ChainError> {
        let contract = EvmHost::new(self.host, &self.provider);
        let result = contract
            .latestStateMachineHeight(Self::hub_id(state_machine)?)
            .call()
            .await
            .map_err(ChainError::from_client)?;
        Self::to_u64(result.latestHeight, "state machine height")
    }

    async fn state_machine_timestamp(
        &self,
        state_machine: &str,
        _consensus_state_id: &str,
        height: u64,
    ) -> Result<u64, ChainError> {
        let contract = EvmHost::new(self.host, &self.provider);
        let key = EvmHost::StateMachineHeight {
            stateMachineId: Self::hub_id(state_machine)?,
            height: U256::from(height),
        };
        let result = contract
            .stateMachineCommitment(key)
            .call()
            .await
            .map_err(ChainError::from_client)?;
        Self::to_u64(result.commitment.timestamp, "state commitment timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ChainConfig {
        ChainConfig::new(
            "http://localhost:8545",
            "EVM-97",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "BSC0",
        )
    }

    #[test]
    fn test_new_reader() {
        let reader = EvmHostReader::new(&chain()).unwrap();
        assert_eq!(reader.state_machine(), "EVM-97");
    }

    #[test]
    fn test_invalid_host_address_rejected() {
        let mut config = chain();
        config.host_contract_address = "not-an-address".to_string();
        assert!(matches!(
            EvmHostReader::new(&config),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_rpc_url_rejected() {
        let mut config = chain();
        config.rpc_url = "::::".to_string();
        assert!(matches!(
            EvmHostReader::new(&config),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_hub_id_requires_numeric_suffix() {
        assert_eq!(
            EvmHostReader::hub_id("POLKADOT-3367").unwrap(),
            U256::from(3367u64)
        );
        assert!(matches!(
            EvmHostReader::hub_id("BEEFY"),
            Err(ChainError::Unsupported(_))
        ));
    }

    #[test]
    fn test_event_topics() {
        assert_eq!(
            keccak256(POST_REQUEST_HANDLED),
            B256::from_str("0xa73d58a0fd0647075f9f6b1d18358fcb27c8f8f164fd05c4f9d3e9d5c4f3b64d").unwrap()
        );
        assert_eq!(
            keccak256(POST_RESPONSE_HANDLED),
            B256::from_str("0xee00e116b272a1610063bf2a37255152212aeea2d088118e22add5cbe3e9f418").unwrap()
        );
        assert_eq!(
            keccak256(POST_REQUEST_TIMEOUT_HANDLED),
            B256::from_str("0xf49156e1167ecbef0e01d26c68e846616d5617d96f1598a1ec88cf3bb254abca").unwrap()
        );
    }
}
