//! Chain configuration
//!
//! A [`ClientConfig`] is built once before tracking starts and never mutated.
//! It can be deserialized from JSON or read from environment variables
//! (`SOURCE_*`, `DEST_*`, `HYPERBRIDGE_*`).

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::TrackerError;

/// Connection and identity parameters for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// RPC endpoint
    pub rpc_url: String,
    /// State machine identifier, e.g. `EVM-97` or `POLKADOT-3367`
    pub state_machine_id: String,
    /// Host contract address (empty for the hub)
    #[serde(default)]
    pub host_contract_address: String,
    /// Consensus state identifier, e.g. `BSC0` or `PARA`
    #[serde(default)]
    pub consensus_state_id: String,
}

impl ChainConfig {
    pub fn new(
        rpc_url: impl Into<String>,
        state_machine_id: impl Into<String>,
        host_contract_address: impl Into<String>,
        consensus_state_id: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            state_machine_id: state_machine_id.into(),
            host_contract_address: host_contract_address.into(),
            consensus_state_id: consensus_state_id.into(),
        }
    }

    /// Load from `{prefix}_RPC_URL`, `{prefix}_STATE_MACHINE`,
    /// `{prefix}_HOST_ADDRESS` and `{prefix}_CONSENSUS_STATE_ID`
    pub fn from_env(prefix: &str) -> Result<Self, TrackerError> {
        let required = |name: &str| {
            let key = format!("{}_{}", prefix, name);
            env::var(&key).map_err(|_| TrackerError::InvalidConfig(format!("{} required", key)))
        };
        let optional = |name: &str| env::var(format!("{}_{}", prefix, name)).unwrap_or_default();

        Ok(Self {
            rpc_url: required("RPC_URL")?,
            state_machine_id: required("STATE_MACHINE")?,
            host_contract_address: optional("HOST_ADDRESS"),
            consensus_state_id: optional("CONSENSUS_STATE_ID"),
        })
    }

    /// Check the fields every query depends on
    pub fn validate(&self, role: &str) -> Result<(), TrackerError> {
        if self.rpc_url.trim().is_empty() {
            return Err(TrackerError::InvalidConfig(format!(
                "{} rpc_url is empty",
                role
            )));
        }
        if self.state_machine_id.trim().is_empty() {
            return Err(TrackerError::InvalidConfig(format!(
                "{} state_machine_id is empty",
                role
            )));
        }
        Ok(())
    }
}

/// Source, destination and hub chain configuration for a tracking session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub source: ChainConfig,
    pub dest: ChainConfig,
    pub hyperbridge: ChainConfig,
    /// GraphQL endpoint of an indexer, used to shortcut chain polling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexer_url: Option<String>,
}

impl ClientConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, TrackerError> {
        let config = Self {
            source: ChainConfig::from_env("SOURCE")?,
            dest: ChainConfig::from_env("DEST")?,
            hyperbridge: ChainConfig::from_env("HYPERBRIDGE")?,
            indexer_url: env::var("INDEXER_URL").ok().filter(|url| !url.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate all three chains
    pub fn validate(&self) -> Result<(), TrackerError> {
        self.source.validate("source")?;
        self.dest.validate("dest")?;
        self.hyperbridge.validate("hyperbridge")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(sm: &str) -> ChainConfig {
        ChainConfig::new("http://localhost:8545", sm, "0x00", "ETH0")
    }

    fn client_config() -> ClientConfig {
        ClientConfig {
            source: chain("EVM-97"),
            dest: chain("EVM-10200"),
            hyperbridge: ChainConfig::new("ws://localhost:9944", "KUSAMA-4009", "", "PAS0"),
            indexer_url: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(client_config().validate().is_ok());
    }

    #[test]
    fn test_empty_rpc_url_rejected() {
        let mut config = client_config();
        config.dest.rpc_url = String::new();
        match config.validate() {
            Err(TrackerError::InvalidConfig(msg)) => assert!(msg.contains("dest")),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_state_machine_rejected() {
        let mut config = client_config();
        config.hyperbridge.state_machine_id = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = client_config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("stateMachineId"));
        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_hub_host_address_optional() {
        let json = r#"{"rpcUrl":"ws://hub","stateMachineId":"KUSAMA-4009"}"#;
        let chain: ChainConfig = serde_json::from_str(json).unwrap();
        assert!(chain.host_contract_address.is_empty());
    }
}
