//! Chain read interface
//!
//! Every engine reads chain state exclusively through [`ChainReader`]. The
//! crate ships two adapters, [`evm::EvmHostReader`] for EVM hosts and
//! [`hub::HubReader`] for the hyperbridge node, and tests substitute an
//! in-memory reader.
//!
//! Commitments are taken by value so a read can be retried from a closure
//! without borrowing from it.

pub mod evm;
pub mod hub;

use async_trait::async_trait;

use crate::error::ChainError;
use crate::types::{Commitment, EventMetadata};

pub use evm::EvmHostReader;
pub use hub::HubReader;

/// Read-only view of one chain taking part in the protocol
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// State machine identifier of this chain
    fn state_machine(&self) -> &str;

    /// Latest block height
    async fn latest_height(&self) -> Result<u64, ChainError>;

    /// Current chain time in unix seconds
    async fn timestamp(&self) -> Result<u64, ChainError>;

    /// Where a request with this commitment was delivered on this chain, if it was
    async fn request_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError>;

    /// Where a response with this commitment was delivered on this chain, if it was
    async fn response_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError>;

    /// Where this chain processed a timeout for the request commitment, if it did
    async fn timeout_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError>;

    /// Latest height of `state_machine` verified by this chain's light client
    async fn state_machine_height(
        &self,
        state_machine: &str,
        consensus_state_id: &str,
    ) -> Result<u64, ChainError>;

    /// Timestamp (unix seconds) of a verified `state_machine` height
    async fn state_machine_timestamp(
        &self,
        state_machine: &str,
        consensus_state_id: &str,
        height: u64,
    ) -> Result<u64, ChainError>;

    /// Storage proof, at `height`, over the receipts of `commitments`
    async fn non_membership_proof(
        &self,
        commitments: Vec<Commitment>,
        height: u64,
    ) -> Result<Vec<u8>, ChainError> {
        let _ = (commitments, height);
        Err(ChainError::Unsupported(format!(
            "{} does not serve state proofs",
            self.state_machine()
        )))
    }
}
